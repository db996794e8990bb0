//! At-most-once admission of (language, user) keys.
//!
//! Admission discipline: an in-process concurrent set is consulted
//! synchronously on every proposal and is the sole authority, so within one
//! process a key is admitted exactly once no matter how many link-usage
//! records reference it. Every admitted key is also appended to an on-disk
//! log; the log is not consulted during admission — it exists so a resumed
//! run can replay previously admitted keys into the set and skip their
//! enrichment, and so the key space never has to fit in memory twice.
//!
//! `compact` reconciles the log into canonical sorted-unique form, the
//! ordered-log-plus-compaction equivalent of running the raw pair file
//! through `sort | uniq`.

use anyhow::{anyhow, Context, Result};
use dashmap::DashSet;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::DedupKey;

pub struct DedupGate {
    seen: DashSet<DedupKey>,
    log: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl DedupGate {
    /// Opens the gate over `path`. With `resume` set, an existing log is
    /// replayed into the admission set first; otherwise the log starts
    /// empty.
    pub fn open(path: &Path, resume: bool) -> Result<Self> {
        let seen = DashSet::new();

        if resume && path.exists() {
            let replayed = replay_log(path, &seen)?;
            info!(keys = replayed, "Replayed admitted users from log");
        } else if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to clear user log: {path:?}"))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open user log: {path:?}"))?;

        Ok(Self {
            seen,
            log: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Admits `key` if it has never been admitted in this run (or any run
    /// replayed into it). Returns whether the caller now owns the key's
    /// enrichment. Admitted keys hit the log before this returns, so a
    /// crash cannot re-admit them on resume.
    pub fn try_admit(&self, key: &DedupKey) -> Result<bool> {
        if !self.seen.insert(key.clone()) {
            return Ok(false);
        }

        let mut log = self
            .log
            .lock()
            .map_err(|_| anyhow!("user log lock poisoned"))?;
        writeln!(log, "{}\t{}", key.lang, key.user).context("Failed to append to user log")?;
        log.flush().context("Failed to flush user log")?;
        debug!(lang = %key.lang, user = %key.user, "Admitted user");
        Ok(true)
    }

    /// Number of distinct keys known to the gate
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn log_path(&self) -> &Path {
        &self.path
    }
}

fn replay_log(path: &Path, seen: &DashSet<DedupKey>) -> Result<u64> {
    let file =
        File::open(path).with_context(|| format!("Failed to read user log: {path:?}"))?;
    let mut replayed = 0u64;

    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read user log line")?;
        if line.is_empty() {
            continue;
        }
        match line.split_once('\t') {
            Some((lang, user)) => {
                seen.insert(DedupKey {
                    lang: lang.to_string(),
                    user: user.to_string(),
                });
                replayed += 1;
            }
            None => warn!(line = %line, "Skipping malformed user log line"),
        }
    }
    Ok(replayed)
}

/// Summary of one compaction pass
pub struct CompactionSummary {
    pub total_lines: u64,
    pub unique_keys: u64,
}

/// Rewrites the log as a sorted, deduplicated set of keys. Idempotent:
/// compacting a compacted log changes nothing, and a gate opened over the
/// result admits exactly the same key set as one opened over the raw log.
pub fn compact(path: &Path) -> Result<CompactionSummary> {
    let file = File::open(path).with_context(|| format!("Failed to open user log: {path:?}"))?;

    let mut total_lines = 0u64;
    let mut unique = BTreeSet::new();
    for line in BufReader::new(file).lines() {
        let line = line.context("Failed to read user log line")?;
        if line.is_empty() {
            continue;
        }
        total_lines += 1;
        unique.insert(line);
    }

    let tmp_path = path.with_extension("log.tmp");
    let tmp = File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp log: {tmp_path:?}"))?;
    let mut writer = BufWriter::new(tmp);
    for line in &unique {
        writeln!(writer, "{line}").context("Failed to write compacted log")?;
    }
    writer.flush().context("Failed to flush compacted log")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace user log: {path:?}"))?;

    Ok(CompactionSummary {
        total_lines,
        unique_keys: unique.len() as u64,
    })
}

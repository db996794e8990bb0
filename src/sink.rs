//! Append-only CSV sinks for the three output streams.
//!
//! Each sink is opened once, writes its header only when the file is new,
//! and serializes concurrent producers through a write mutex. Every row is
//! written and flushed as a unit, so an interrupted run leaves only complete
//! records behind.

use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::models::{Contribution, LinkUsage, UserInfo};

pub const LINK_USAGE_FILE: &str = "link_usage.csv";
pub const USER_INFO_FILE: &str = "user_info.csv";
pub const CONTRIBUTIONS_FILE: &str = "user_contributions.csv";

const LINK_USAGE_HEADER: &[&str] = &[
    "lang",
    "domain",
    "url",
    "page_title",
    "page_id",
    "introducer",
    "introduced_rev",
    "introduced_at",
    "status",
];

const USER_INFO_HEADER: &[&str] = &[
    "lang",
    "user",
    "edit_count",
    "registration",
    "groups",
    "blocked_by",
    "block_reason",
];

const CONTRIBUTIONS_HEADER: &[&str] = &[
    "lang",
    "user",
    "rev_id",
    "page_id",
    "page_title",
    "timestamp",
    "comment",
    "size_diff",
];

pub struct CsvSink {
    writer: Mutex<csv::Writer<std::fs::File>>,
}

impl CsvSink {
    pub fn open(path: &Path, header: &[&str]) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {path:?}"))?;
        let needs_header = file
            .metadata()
            .with_context(|| format!("Failed to stat output file: {path:?}"))?
            .len()
            == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer
                .write_record(header)
                .with_context(|| format!("Failed to write header: {path:?}"))?;
            writer.flush()?;
        }

        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    /// Appends one complete record and flushes it to disk
    pub fn append<I, T>(&self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("sink lock poisoned"))?;
        writer.write_record(record).context("Failed to write record")?;
        writer.flush().context("Failed to flush record")?;
        Ok(())
    }
}

/// The three output streams of one run
pub struct OutputSinks {
    link_usage: CsvSink,
    user_info: CsvSink,
    contributions: CsvSink,
}

impl OutputSinks {
    pub fn open(output_dir: &Path) -> Result<Self> {
        Ok(Self {
            link_usage: CsvSink::open(&output_dir.join(LINK_USAGE_FILE), LINK_USAGE_HEADER)?,
            user_info: CsvSink::open(&output_dir.join(USER_INFO_FILE), USER_INFO_HEADER)?,
            contributions: CsvSink::open(
                &output_dir.join(CONTRIBUTIONS_FILE),
                CONTRIBUTIONS_HEADER,
            )?,
        })
    }

    pub fn write_usage(&self, usage: &LinkUsage) -> Result<()> {
        self.link_usage.append([
            usage.lang.clone(),
            usage.domain.clone(),
            usage.url.clone(),
            usage.title.clone(),
            usage.page_id.to_string(),
            usage.introducer.clone().unwrap_or_default(),
            usage.rev_id.map(|id| id.to_string()).unwrap_or_default(),
            usage.introduced_at.clone().unwrap_or_default(),
            usage.status.as_str().to_string(),
        ])
    }

    pub fn write_user(&self, info: &UserInfo) -> Result<()> {
        self.user_info.append([
            info.lang.clone(),
            info.user.clone(),
            info.edit_count.map(|c| c.to_string()).unwrap_or_default(),
            info.registration.clone().unwrap_or_default(),
            info.groups.join("|"),
            info.blocked_by.clone().unwrap_or_default(),
            info.block_reason.clone().unwrap_or_default(),
        ])
    }

    pub fn write_contribution(&self, c: &Contribution) -> Result<()> {
        self.contributions.append([
            c.lang.clone(),
            c.user.clone(),
            c.rev_id.to_string(),
            c.page_id.to_string(),
            c.title.clone(),
            c.timestamp.clone(),
            c.comment.clone(),
            c.size_diff.to_string(),
        ])
    }
}

pub fn link_usage_path(output_dir: &Path) -> PathBuf {
    output_dir.join(LINK_USAGE_FILE)
}

pub fn user_info_path(output_dir: &Path) -> PathBuf {
    output_dir.join(USER_INFO_FILE)
}

pub fn contributions_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CONTRIBUTIONS_FILE)
}

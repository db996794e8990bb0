//! Input list loading: language editions and target domains.
//!
//! The language file is a CSV with headers (the `Language Code` column is
//! what matters); the domain file is a single headerless column. Both are
//! deduplicated preserving first-seen order before the cross product is
//! taken.

use anyhow::{bail, Context, Result};
use rustc_hash::FxHashSet;
use std::path::Path;

use crate::models::LinkTask;

const LANGUAGE_COLUMN: &str = "Language Code";

pub fn read_language_codes(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open language file: {path:?}"))?;

    let headers = reader
        .headers()
        .context("Failed to read language file header")?;
    let Some(column) = headers.iter().position(|h| h.trim() == LANGUAGE_COLUMN) else {
        bail!("Language file {path:?} has no '{LANGUAGE_COLUMN}' column");
    };

    let mut seen = FxHashSet::default();
    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read language file record")?;
        let code = record.get(column).unwrap_or("").trim();
        if !code.is_empty() && seen.insert(code.to_string()) {
            codes.push(code.to_string());
        }
    }

    Ok(codes)
}

pub fn read_domains(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open domain file: {path:?}"))?;

    let mut seen = FxHashSet::default();
    let mut domains = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read domain file record")?;
        let domain = record.get(0).unwrap_or("").trim();
        if !domain.is_empty() && seen.insert(domain.to_string()) {
            domains.push(domain.to_string());
        }
    }

    Ok(domains)
}

/// Cross product of languages and domains, one task per combination
pub fn build_tasks(languages: &[String], domains: &[String]) -> Vec<LinkTask> {
    let mut tasks = Vec::with_capacity(languages.len() * domains.len());
    for lang in languages {
        for domain in domains {
            tasks.push(LinkTask {
                lang: lang.clone(),
                domain: domain.clone(),
            });
        }
    }
    tasks
}

//! Locates the revision that introduced a given external link.
//!
//! The walk runs newest-to-oldest over the page's revision history, testing
//! link presence per revision and remembering the oldest revision confirmed
//! to contain it. The first revision found *without* the link ends the walk:
//! the remembered revision is the introducer of the contiguous run that is
//! still live in the current page state. A depth ceiling bounds the cost on
//! pages with very long histories; hitting it reports truncation rather than
//! guessing.
//!
//! Presence testing is a plain substring match of the matched URL against
//! revision wikitext, the same heuristic the usage index itself reflects.
//! Revisions with hidden content cannot be tested and are skipped so they
//! never terminate a run on false evidence.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::client::{ApiClient, FetchError};
use crate::config::REVISION_BATCH;
use crate::models::{PageReference, RevisionRecord};

/// Outcome of one page's backward scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The earliest revision of the contiguous run ending at the current
    /// state. `user` is absent when the introducing revision is userhidden.
    Introduced {
        user: Option<String>,
        rev_id: u64,
        timestamp: String,
    },
    /// Depth ceiling reached with the link present in every tested revision
    Truncated { examined: u32 },
    /// The newest revision no longer contains the link, or the page has no
    /// visible history
    Vanished,
}

#[derive(Deserialize)]
struct RevisionQuery {
    #[serde(default)]
    pages: HashMap<String, RevisionPageBody>,
}

#[derive(Deserialize)]
struct RevisionPageBody {
    #[serde(default)]
    revisions: Vec<ApiRevision>,
}

#[derive(Deserialize)]
struct ApiRevision {
    revid: u64,
    timestamp: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    slots: Option<RevisionSlots>,
}

#[derive(Deserialize)]
struct RevisionSlots {
    #[serde(default)]
    main: Option<MainSlot>,
}

#[derive(Deserialize)]
struct MainSlot {
    #[serde(default, rename = "*")]
    content: Option<String>,
}

/// Walks `page`'s history backward until the introduction of `page.url` is
/// attributed, the history is exhausted, or `scan_depth` revisions have been
/// examined.
pub async fn resolve_introducer(
    client: &ApiClient,
    page: &PageReference,
    scan_depth: u32,
) -> Result<Resolution, FetchError> {
    let params = [
        ("action", "query".to_string()),
        ("prop", "revisions".to_string()),
        ("pageids", page.page_id.to_string()),
        ("rvslots", "main".to_string()),
        ("rvprop", "ids|timestamp|user|content".to_string()),
        ("rvdir", "older".to_string()),
        ("rvlimit", REVISION_BATCH.to_string()),
    ];
    let mut batches = client.paginate(&page.lang, &params);

    let mut last_confirmed: Option<RevisionRecord> = None;
    let mut examined = 0u32;

    while let Some(query) = batches.next_page().await? {
        for rev in parse_revisions(query)? {
            examined += 1;

            match &rev.content {
                // Hidden content cannot be tested either way; skip it so a
                // suppressed revision never ends the run as a false absence.
                None => {}
                Some(content) if content.contains(&page.url) => {
                    last_confirmed = Some(rev);
                }
                Some(_) => {
                    return Ok(conclude(last_confirmed));
                }
            }

            if examined >= scan_depth {
                return Ok(Resolution::Truncated { examined });
            }
        }
    }

    // History exhausted: the page-creating revision carries the link
    Ok(conclude(last_confirmed))
}

fn conclude(last_confirmed: Option<RevisionRecord>) -> Resolution {
    match last_confirmed {
        Some(rev) => Resolution::Introduced {
            user: rev.user,
            rev_id: rev.rev_id,
            timestamp: rev.timestamp,
        },
        None => Resolution::Vanished,
    }
}

fn parse_revisions(query: Value) -> Result<Vec<RevisionRecord>, FetchError> {
    let parsed: RevisionQuery =
        serde_json::from_value(query).map_err(|e| FetchError::Permanent {
            reason: format!("unexpected revisions shape: {e}"),
        })?;

    let mut records = Vec::new();
    for body in parsed.pages.into_values() {
        for rev in body.revisions {
            records.push(RevisionRecord {
                rev_id: rev.revid,
                timestamp: rev.timestamp,
                user: rev.user,
                content: rev.slots.and_then(|s| s.main).and_then(|m| m.content),
            });
        }
    }
    Ok(records)
}

/// One unit of top-level work: scan `{lang}.wikipedia.org` for links to `domain`.
#[derive(Debug, Clone)]
pub struct LinkTask {
    pub lang: String,
    pub domain: String,
}

/// A page known to embed a link to the target domain, as reported by the
/// external-link-usage index. `url` is the concrete matched URL, which the
/// resolver uses for presence testing against revision content.
#[derive(Debug, Clone)]
pub struct PageReference {
    pub lang: String,
    pub domain: String,
    pub title: String,
    pub page_id: u64,
    pub url: String,
}

/// A single revision during one page's backward history scan. Discarded as
/// soon as the scan resolves. `user` is absent for userhidden revisions,
/// `content` for texthidden ones.
#[derive(Debug, Clone)]
pub struct RevisionRecord {
    pub rev_id: u64,
    pub timestamp: String,
    pub user: Option<String>,
    pub content: Option<String>,
}

/// How a page's link attribution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    /// The introducing revision was located within the scan window.
    Resolved,
    /// The depth ceiling was reached with the link still present everywhere.
    ScanTruncated,
    /// The newest revision no longer contains the link (index lag), or the
    /// page had no visible history.
    LinkVanished,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Resolved => "resolved",
            UsageStatus::ScanTruncated => "scan_truncated",
            UsageStatus::LinkVanished => "link_vanished",
        }
    }
}

/// Output record: one row per (page, matched link) pair. Unresolved scans
/// still produce a row, with empty introducer fields and a reason in `status`.
#[derive(Debug, Clone)]
pub struct LinkUsage {
    pub lang: String,
    pub domain: String,
    pub url: String,
    pub title: String,
    pub page_id: u64,
    pub introducer: Option<String>,
    pub rev_id: Option<u64>,
    pub introduced_at: Option<String>,
    pub status: UsageStatus,
}

/// Admission key for the dedup gate: each (lang, user) pair is enriched at
/// most once per run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub lang: String,
    pub user: String,
}

/// Output record: profile metadata for one admitted user. Optional fields
/// stay empty when the profile fetch fails or the account is unregistered.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub lang: String,
    pub user: String,
    pub edit_count: Option<u64>,
    pub registration: Option<String>,
    pub groups: Vec<String>,
    pub blocked_by: Option<String>,
    pub block_reason: Option<String>,
}

impl UserInfo {
    /// A row carrying only the identity columns, used when the profile
    /// fetch fails but the user must still appear in the output.
    pub fn bare(key: &DedupKey) -> Self {
        Self {
            lang: key.lang.clone(),
            user: key.user.clone(),
            ..Self::default()
        }
    }
}

/// Output record: one recent edit by an admitted user, newest first.
#[derive(Debug, Clone)]
pub struct Contribution {
    pub lang: String,
    pub user: String,
    pub rev_id: u64,
    pub page_id: u64,
    pub title: String,
    pub timestamp: String,
    pub comment: String,
    pub size_diff: i64,
}

/// Default concurrency budget shared by all remote-call types
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Default number of recent contributions fetched per discovered user
pub const DEFAULT_CONTRIB_LIMIT: u32 = 10;

/// Default ceiling on revisions examined per page before a scan gives up
pub const DEFAULT_SCAN_DEPTH: u32 = 500;

/// Revisions requested per history batch (API maximum for content queries)
pub const REVISION_BATCH: u32 = 50;

/// Link-usage results requested per API page
pub const EXTURL_BATCH: u32 = 500;

/// Retry attempts per request before a transient failure is surfaced
pub const MAX_FETCH_ATTEMPTS: u32 = 4;

/// First retry delay; doubles per attempt up to BACKOFF_CAP_MS
pub const BACKOFF_BASE_MS: u64 = 500;

/// Upper bound on a single backoff delay
pub const BACKOFF_CAP_MS: u64 = 8_000;

/// Delay between successive pages of one paginated query
pub const COURTESY_DELAY_MS: u64 = 1_000;

/// Outbound request timeout
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// MediaWiki Action API endpoint; `{lang}` is replaced per task
pub const DEFAULT_API_TEMPLATE: &str = "https://{lang}.wikipedia.org/w/api.php";

/// Identifies this tool to the API per the robot policy
pub const DEFAULT_USER_AGENT: &str = concat!("theseus/", env!("CARGO_PKG_VERSION"));

/// File name of the append-only admitted-user log inside the output directory
pub const USER_LOG_FILE: &str = "users_seen.log";

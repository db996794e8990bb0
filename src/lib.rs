//! Theseus: Wikipedia external-link provenance pipeline
//!
//! Given a list of language editions and a list of target domains, this
//! crate finds every page embedding a link to each domain, attributes each
//! link to the editor who introduced it, and profiles every editor so
//! discovered:
//!
//! 1. **Scan** -- Walk the `exturlusage` index per (language, domain) pair,
//!    streaming out page references one API page at a time
//! 2. **Resolve** -- Walk each page's revision history newest-to-oldest to
//!    find the revision where the link first became (and stayed) present
//! 3. **Enrich** -- For each editor seen for the first time, fetch profile
//!    metadata and a bounded window of recent contributions
//!
//! # Architecture
//!
//! The pipeline is streaming end to end and memory-bounded:
//!
//! - **Bounded fan-out** -- A handful of top-level tasks expands into
//!   thousands of page and user fetches, all drained through one worker
//!   pool under a shared concurrency budget
//! - **Rate-limited client** -- A process-wide semaphore caps in-flight
//!   requests; transient failures retry with exponential backoff and are
//!   skipped (never fatal) once the attempt ceiling is hit
//! - **Streaming dedup** -- First-seen (language, user) admission through a
//!   concurrent set, mirrored to an append-only log for resume, so the user
//!   space never has to fit in memory twice
//! - **Incremental output** -- Three append-only CSV sinks receive records
//!   the moment they exist; an interrupted run leaves valid files behind
//!
//! # Key Modules
//!
//! - [`client`] -- Rate-limited MediaWiki API client with retry and
//!   continuation handling
//! - [`scanner`] -- Paginated external-link-usage scan
//! - [`resolver`] -- Backward revision walk locating the introducing edit
//! - [`dedup`] -- At-most-once user admission with a durable log
//! - [`enrich`] -- User profile and contribution fetches
//! - [`pipeline`] -- Worker-pool orchestration wiring the above together
//! - [`sink`] -- Append-only CSV output streams
//! - [`input`] -- Language and domain list loading
//! - [`models`] -- Core data types
//! - [`stats`] -- Thread-safe run counters for the final summary
//! - [`config`] -- Defaults and tunables
//!
//! # Example Usage
//!
//! ```bash
//! # Trace two domains across every listed language edition
//! theseus trace -l sources/wiki_versions.csv -d sources/domains.csv -o results/
//!
//! # Pick up an interrupted run without re-enriching known users
//! theseus trace -l sources/wiki_versions.csv -d sources/domains.csv -o results/ --resume
//!
//! # Canonicalize the admitted-user log
//! theseus compact-users -o results/
//! ```

pub mod client;
pub mod config;
pub mod dedup;
pub mod enrich;
pub mod input;
pub mod models;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod sink;
pub mod stats;

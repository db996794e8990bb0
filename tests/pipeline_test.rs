//! End-to-end tests for the Theseus trace pipeline.
//!
//! Every test drives the real orchestration -- scanner, resolver, dedup
//! gate, enricher, CSV sinks -- against a wiremock stand-in for the
//! MediaWiki Action API. The endpoint template points at the mock server
//! with the usual `{lang}` substitution, so the code under test is exactly
//! the code a production run executes.
//!
//! # Test Strategy
//!
//! - **Fixtures**: one helper per API endpoint builds the JSON bodies;
//!   revision histories are described as (revid, user, has_link) triples,
//!   newest first, matching the rvdir=older response order
//! - **Output validation**: assertions read the CSV files back row by row
//! - **Isolation**: each test gets its own TempDir and MockServer

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use theseus::client::{ApiClient, ClientConfig};
use theseus::dedup::DedupGate;
use theseus::models::LinkTask;
use theseus::pipeline::{run_pipeline, PipelineOptions, Shutdown};
use theseus::sink::{self, OutputSinks};
use theseus::stats::RunStats;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOMAIN: &str = "example.com";
const LINK: &str = "http://example.com/ref";

fn test_client(server: &MockServer, max_workers: usize) -> Arc<ApiClient> {
    Arc::new(
        ApiClient::new(ClientConfig {
            api_template: format!("{}/{{lang}}/api.php", server.uri()),
            max_workers,
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
            backoff_cap: Duration::from_millis(4),
            courtesy_delay: Duration::from_millis(0),
            ..ClientConfig::default()
        })
        .unwrap(),
    )
}

fn options(max_workers: usize, scan_depth: u32) -> PipelineOptions {
    PipelineOptions {
        max_workers,
        contrib_limit: 10,
        scan_depth,
    }
}

fn tasks() -> Vec<LinkTask> {
    vec![LinkTask {
        lang: "en".to_string(),
        domain: DOMAIN.to_string(),
    }]
}

fn exturlusage_body(entries: &[(u64, &str)]) -> serde_json::Value {
    let usage: Vec<_> = entries
        .iter()
        .map(|(pageid, title)| {
            serde_json::json!({"pageid": pageid, "ns": 0, "title": title, "url": LINK})
        })
        .collect();
    serde_json::json!({"query": {"exturlusage": usage}})
}

/// Revision history body; `revs` is (revid, user, has_link), newest first
fn history_body(pageid: u64, revs: &[(u64, &str, bool)]) -> serde_json::Value {
    let revisions: Vec<_> = revs
        .iter()
        .map(|(revid, user, has_link)| {
            let content = if *has_link {
                format!("Cited from {LINK} since forever.")
            } else {
                "No citations here.".to_string()
            };
            serde_json::json!({
                "revid": revid,
                "user": user,
                "timestamp": format!("2024-02-{:02}T00:00:00Z", (revid % 28) + 1),
                "slots": {"main": {"*": content}}
            })
        })
        .collect();
    serde_json::json!({
        "query": {"pages": {(pageid.to_string()): {"pageid": pageid, "revisions": revisions}}}
    })
}

fn profile_body(user: &str) -> serde_json::Value {
    serde_json::json!({"query": {"users": [{
        "userid": 7, "name": user, "editcount": 4321,
        "registration": "2018-01-01T00:00:00Z",
        "groups": ["autoconfirmed"]
    }]}})
}

fn contribs_body(user: &str, revids: &[u64]) -> serde_json::Value {
    let contribs: Vec<_> = revids
        .iter()
        .map(|revid| {
            serde_json::json!({
                "user": user, "revid": revid, "pageid": 900,
                "title": "Elsewhere",
                "timestamp": "2024-03-01T00:00:00Z",
                "comment": "copyedit", "sizediff": 5
            })
        })
        .collect();
    serde_json::json!({"query": {"usercontribs": contribs}})
}

async fn mount(server: &MockServer, mock: Mock) {
    mock.mount(server).await;
}

fn read_rows(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

async fn run(
    client: Arc<ApiClient>,
    dir: &TempDir,
    opts: PipelineOptions,
    resume: bool,
) -> (Arc<RunStats>, Arc<DedupGate>) {
    let sinks = Arc::new(OutputSinks::open(dir.path()).unwrap());
    let gate = Arc::new(DedupGate::open(&dir.path().join("users_seen.log"), resume).unwrap());
    let stats = Arc::new(RunStats::new());
    run_pipeline(
        client,
        tasks(),
        sinks,
        gate.clone(),
        stats.clone(),
        opts,
        Shutdown::new(),
    )
    .await
    .unwrap();
    (stats, gate)
}

// ---------------------------------------------------------------------------
// Full-scenario tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trace_resolves_truncates_and_enriches() {
    let server = MockServer::start().await;

    // Two pages cite the domain; the first resolves to alice at revision
    // 100, the second has a history deeper than the scan ceiling
    mount(
        &server,
        Mock::given(method("GET"))
            .and(path("/en/api.php"))
            .and(query_param("list", "exturlusage"))
            .and(query_param("euquery", DOMAIN))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(exturlusage_body(&[(101, "First"), (202, "Second")])),
            ),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("pageids", "101"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_body(
                101,
                &[(102, "bob", true), (100, "alice", true), (99, "carol", false)],
            ))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("pageids", "202"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_body(
                202,
                &[
                    (304, "dave", true),
                    (303, "dave", true),
                    (302, "dave", true),
                    (301, "dave", true),
                ],
            ))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "users"))
            .and(query_param("ususers", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("alice"))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "usercontribs"))
            .and(query_param("ucuser", "alice"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(contribs_body("alice", &[900, 880])),
            ),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let client = test_client(&server, 4);
    let (stats, _) = run(client, &dir, options(4, 3), false).await;

    assert_eq!(stats.pages(), 2);
    assert_eq!(stats.resolved(), 1);
    assert_eq!(stats.truncated(), 1);
    assert_eq!(stats.admitted(), 1);
    assert_eq!(stats.enriched(), 1);

    let mut usage_rows = read_rows(&sink::link_usage_path(dir.path()));
    usage_rows.sort_by(|a, b| a[3].cmp(&b[3]));
    assert_eq!(usage_rows.len(), 2);

    let first = &usage_rows[0];
    assert_eq!(first[3], "First");
    assert_eq!(first[5], "alice");
    assert_eq!(first[6], "100");
    assert_eq!(first[8], "resolved");

    let second = &usage_rows[1];
    assert_eq!(second[3], "Second");
    assert_eq!(second[5], "");
    assert_eq!(second[6], "");
    assert_eq!(second[8], "scan_truncated");

    let user_rows = read_rows(&sink::user_info_path(dir.path()));
    assert_eq!(user_rows.len(), 1);
    assert_eq!(user_rows[0][0], "en");
    assert_eq!(user_rows[0][1], "alice");
    assert_eq!(user_rows[0][2], "4321");

    let contrib_rows = read_rows(&sink::contributions_path(dir.path()));
    assert_eq!(contrib_rows.len(), 2);
    assert!(contrib_rows.iter().all(|r| r[1] == "alice"));
}

#[tokio::test]
async fn repeated_introducer_is_enriched_once() {
    let server = MockServer::start().await;

    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "exturlusage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(exturlusage_body(&[(101, "First"), (102, "Second")])),
            ),
    )
    .await;
    for pageid in [101u64, 102] {
        mount(
            &server,
            Mock::given(method("GET"))
                .and(query_param("pageids", pageid.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(history_body(
                    pageid,
                    &[(pageid * 10, "alice", true), (pageid * 10 - 1, "bob", false)],
                ))),
        )
        .await;
    }
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("alice")))
            .expect(1),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "usercontribs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(contribs_body("alice", &[900])))
            .expect(1),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let client = test_client(&server, 4);
    let (stats, gate) = run(client, &dir, options(4, 10), false).await;

    assert_eq!(stats.resolved(), 2);
    assert_eq!(stats.admitted(), 1);
    assert_eq!(stats.suppressed(), 1);
    assert_eq!(gate.len(), 1);

    let user_rows = read_rows(&sink::user_info_path(dir.path()));
    assert_eq!(user_rows.len(), 1);
}

#[tokio::test]
async fn resumed_run_skips_known_users() {
    let server = MockServer::start().await;

    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "exturlusage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(exturlusage_body(&[(101, "First")])),
            ),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("pageids", "101"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_body(
                101,
                &[(100, "alice", true), (99, "bob", false)],
            ))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("alice"))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "usercontribs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(contribs_body("alice", &[900]))),
    )
    .await;

    let dir = TempDir::new().unwrap();

    let (stats, _) = run(test_client(&server, 2), &dir, options(2, 10), false).await;
    assert_eq!(stats.enriched(), 1);

    // Same trace again with --resume: the admission log suppresses alice
    let (stats, _) = run(test_client(&server, 2), &dir, options(2, 10), true).await;
    assert_eq!(stats.admitted(), 0);
    assert_eq!(stats.suppressed(), 1);
    assert_eq!(stats.enriched(), 0);

    let user_rows = read_rows(&sink::user_info_path(dir.path()));
    assert_eq!(user_rows.len(), 1);
}

// ---------------------------------------------------------------------------
// Failure-tolerance tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_resolution_does_not_abort_the_run() {
    let server = MockServer::start().await;

    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "exturlusage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(exturlusage_body(&[(101, "Broken"), (102, "Fine")])),
            ),
    )
    .await;
    // Page 101's history endpoint is down hard
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("pageids", "101"))
            .respond_with(ResponseTemplate::new(500)),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("pageids", "102"))
            .respond_with(ResponseTemplate::new(200).set_body_json(history_body(
                102,
                &[(100, "alice", true), (99, "bob", false)],
            ))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_body("alice"))),
    )
    .await;
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "usercontribs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(contribs_body("alice", &[900]))),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let (stats, _) = run(test_client(&server, 2), &dir, options(2, 10), false).await;

    assert_eq!(stats.resolve_failed(), 1);
    assert_eq!(stats.resolved(), 1);
    assert_eq!(stats.enriched(), 1);

    // Only the page that resolved has a row; the failed one was skipped
    let usage_rows = read_rows(&sink::link_usage_path(dir.path()));
    assert_eq!(usage_rows.len(), 1);
    assert_eq!(usage_rows[0][3], "Fine");
}

#[tokio::test]
async fn failed_task_scan_leaves_other_output_valid() {
    let server = MockServer::start().await;

    // The usage index itself rejects the query
    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "exturlusage"))
            .respond_with(ResponseTemplate::new(403)),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let (stats, _) = run(test_client(&server, 2), &dir, options(2, 10), false).await;

    assert_eq!(stats.failed_tasks(), 1);
    assert_eq!(stats.pages(), 0);

    // Sinks exist with headers only; no truncated rows
    let usage_rows = read_rows(&sink::link_usage_path(dir.path()));
    assert!(usage_rows.is_empty());
}

// ---------------------------------------------------------------------------
// Concurrency and cancellation tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn worker_budget_bounds_in_flight_requests() {
    let server = MockServer::start().await;

    let pages: Vec<(u64, String)> = (1..=12).map(|i| (i, format!("Page {i}"))).collect();
    let page_refs: Vec<(u64, &str)> = pages.iter().map(|(i, t)| (*i, t.as_str())).collect();

    mount(
        &server,
        Mock::given(method("GET"))
            .and(query_param("list", "exturlusage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(exturlusage_body(&page_refs)),
            ),
    )
    .await;
    // Every other endpoint answers slowly enough to force overlap
    mount(
        &server,
        Mock::given(method("GET")).respond_with(
            ResponseTemplate::new(200)
                .set_body_json(history_body(1, &[(10, "alice", true), (9, "bob", false)]))
                .set_delay(Duration::from_millis(25)),
        ),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let client = test_client(&server, 3);
    let (stats, _) = run(client.clone(), &dir, options(3, 10), false).await;

    assert_eq!(stats.pages(), 12);
    let peak = client.stats().in_flight_peak();
    assert!(peak <= 3, "in-flight peak {peak} exceeded the worker budget");
}

#[tokio::test]
async fn pre_triggered_shutdown_produces_empty_valid_output() {
    let server = MockServer::start().await;
    // No mocks needed: a triggered shutdown stops scanners before any fetch

    let dir = TempDir::new().unwrap();
    let sinks = Arc::new(OutputSinks::open(dir.path()).unwrap());
    let gate = Arc::new(DedupGate::open(&dir.path().join("users_seen.log"), false).unwrap());
    let stats = Arc::new(RunStats::new());
    let shutdown = Shutdown::new();
    shutdown.trigger();

    run_pipeline(
        test_client(&server, 2),
        tasks(),
        sinks,
        gate,
        stats.clone(),
        options(2, 10),
        shutdown,
    )
    .await
    .unwrap();

    assert_eq!(stats.pages(), 0);
    // Headers are present, files parse, zero data rows
    assert!(read_rows(&sink::link_usage_path(dir.path())).is_empty());
    assert!(read_rows(&sink::user_info_path(dir.path())).is_empty());
    assert!(read_rows(&sink::contributions_path(dir.path())).is_empty());
}

//! Integration tests for the harvesting engine
//!
//! These tests use wiremock to stand in for the rendering query API and run
//! jobs end-to-end through the default HTTP fetcher, HTML extractor,
//! validator and SQLite sink.

use keyword_harvester::config::Config;
use keyword_harvester::jobs::JobStatus;
use keyword_harvester::recovery::DeadLetterQueue;
use keyword_harvester::storage::SqliteResultSink;
use keyword_harvester::Engine;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast-retrying test configuration pointed at the mock server
fn create_test_config(server: &MockServer, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.source.endpoint = format!("{}/v1/queries", server.uri());
    config.retry.max_attempts = 2;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config.recovery.retry_delays_secs = vec![0, 0, 0];
    config.recovery.dead_letter_path = dir
        .path()
        .join("dead_letter_queue.json")
        .to_string_lossy()
        .into_owned();
    config.output.database_path = Some(
        dir.path()
            .join("results.db")
            .to_string_lossy()
            .into_owned(),
    );
    config
}

/// Wraps rendered HTML the way the query API returns it
fn rendered(html: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "results": [{ "content": html }]
    }))
}

fn listing(slug: &str, item: u32, title: &str) -> String {
    format!(
        r#"<a href="/p/{}/-/A-{}"><span>{}</span><div class="price">$12.99</div></a>"#,
        slug, item, title
    )
}

#[tokio::test]
async fn test_full_job_two_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let page_one = format!(
        r#"<html><body>{}{}<a class="next-page" aria-label="Next page" href="?page=2">Next</a></body></html>"#,
        listing("brass-desk-lamp", 81234567, "Brass Desk Lamp"),
        listing("oak-desk-lamp", 81234568, "Oak Desk Lamp"),
    );
    let page_two = format!(
        "<html><body>{}</body></html>",
        listing("led-desk-lamp", 81234569, "LED Desk Lamp"),
    );

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .and(body_partial_json(json!({ "query": "desk lamp", "start_page": 1 })))
        .respond_with(rendered(&page_one))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .and(body_partial_json(json!({ "start_page": 2 })))
        .respond_with(rendered(&page_two))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::from_config(create_test_config(&server, &dir)).unwrap();
    let id = engine.start_job("desk lamp", Some(5)).await.unwrap();
    let mut subscription = engine.subscribe_progress(id).unwrap();

    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        events.push(event);
    }

    let last = events.last().unwrap();
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress, 100);

    let job = engine.wait(id).await.unwrap();
    let results = job.results.unwrap();
    assert_eq!(results.pages_scraped, 2);
    assert_eq!(results.total_found, 3);
    assert_eq!(results.valid_records, 3);
    assert!(results.quality_score > 0.9);

    let locator = results.locator.unwrap();
    assert!(locator.starts_with("sqlite:"));
    assert!(locator.ends_with("#harvest=1"));

    let sink = SqliteResultSink::open(&dir.path().join("results.db")).unwrap();
    let stored = sink.load_records(1).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().any(|r| r.get("item_number") == Some("81234569")));
}

#[tokio::test]
async fn test_repeated_keyword_served_from_cache() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let page = format!(
        "<html><body>{}</body></html>",
        listing("walnut-bookshelf", 70000001, "Walnut Bookshelf"),
    );

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .respond_with(rendered(&page))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::from_config(create_test_config(&server, &dir)).unwrap();

    let first = engine.start_job("bookshelf", Some(2)).await.unwrap();
    assert_eq!(engine.wait(first).await.unwrap().status, JobStatus::Completed);

    let second = engine.start_job("  Bookshelf ", Some(2)).await.unwrap();
    let job = engine.wait(second).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.results.unwrap().from_cache);
}

#[tokio::test]
async fn test_client_error_fails_job() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::from_config(create_test_config(&server, &dir)).unwrap();
    let id = engine.start_job("desk lamp", None).await.unwrap();
    let job = engine.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.message, "HTTP 404: non-retryable");
    assert!(engine.list_dead_letter_jobs().is_empty());
}

#[tokio::test]
async fn test_rate_limited_request_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .respond_with(rendered(&format!(
            "<html><body>{}</body></html>",
            listing("floor-lamp", 60000001, "Floor Lamp")
        )))
        .expect(1)
        .mount(&server)
        .await;

    let engine = Engine::from_config(create_test_config(&server, &dir)).unwrap();
    let id = engine.start_job("floor lamp", Some(1)).await.unwrap();
    let job = engine.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.results.unwrap().valid_records, 1);
}

#[tokio::test]
async fn test_persistent_server_error_is_dead_lettered() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    // Two attempts for the first run, then two for each of three recoveries
    Mock::given(method("POST"))
        .and(path("/v1/queries"))
        .respond_with(ResponseTemplate::new(500))
        .expect(8)
        .mount(&server)
        .await;

    let engine = Engine::from_config(create_test_config(&server, &dir)).unwrap();
    let id = engine.start_job("desk lamp", Some(1)).await.unwrap();
    let job = engine.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::DeadLetter);
    assert!(job.message.starts_with("Failed to scrape 'desk lamp': recovery exhausted"));

    let records = engine.list_dead_letter_jobs();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].job_id, id);
    assert_eq!(records[0].attempt_count, 3);

    // The queue survives a restart
    let reopened = DeadLetterQueue::open(dir.path().join("dead_letter_queue.json")).unwrap();
    assert_eq!(reopened.get_all(), records);
}

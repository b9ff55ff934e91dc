//! Retry behavior of the fetch pipeline against real HTTP failures

use std::sync::Arc;
use std::time::Duration;

use cimis_fetch::downloader::{FetchConfig, FetchExecutor, RetryMode};
use cimis_fetch::fetcher::cimis_http::CimisClient;
use cimis_fetch::fetcher::DateRange;
use cimis_fetch::output::FileChunkStore;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const ONE_RECORD: &str =
    r#"{"Data":{"Providers":[{"Records":[{"Date":"2024-03-01","DayAirTmpAvg":{"Value":"15","Qc":" "}}]}]}}"#;

struct Harness {
    server: MockServer,
    _dir: TempDir,
    store: Arc<FileChunkStore>,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileChunkStore::open(dir.path()).await.unwrap());
        Self {
            server,
            _dir: dir,
            store,
        }
    }

    fn executor(&self, config: FetchConfig) -> FetchExecutor {
        let client =
            CimisClient::new("test-key").with_base_url(format!("{}/api/data", self.server.uri()));
        FetchExecutor::new(Arc::new(client), self.store.clone(), config).unwrap()
    }

    async fn requests(&self) -> usize {
        self.server.received_requests().await.unwrap().len()
    }
}

fn config(max_retries: u32) -> FetchConfig {
    FetchConfig::new(DateRange::for_year(2024).unwrap())
        .with_concurrency(1)
        .with_max_retries(max_retries)
        .with_initial_backoff(Duration::from_millis(1))
        .with_rng_seed(11)
}

#[tokio::test]
async fn test_transient_503_then_success() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ONE_RECORD))
        .mount(&h.server)
        .await;

    let results = h.executor(config(3)).run(&[2]).await;

    assert!(results[0].success);
    assert_eq!(results[0].attempts, 3);
    assert_eq!(results[0].record_count, 1);
    assert_eq!(h.requests().await, 3);
}

#[tokio::test]
async fn test_persistent_503_exhausts_retries() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&h.server)
        .await;

    let results = h.executor(config(2)).run(&[2]).await;

    assert!(!results[0].success);
    assert_eq!(results[0].attempts, 3);
    assert_eq!(h.requests().await, 3);
    assert!(results[0].error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ONE_RECORD))
        .mount(&h.server)
        .await;

    let results = h.executor(config(3)).run(&[2]).await;
    assert!(results[0].success);
    assert_eq!(results[0].attempts, 2);
}

#[tokio::test]
async fn test_bad_request_is_not_retried() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad station"))
        .mount(&h.server)
        .await;

    let results = h.executor(config(3)).run(&[2]).await;

    assert!(!results[0].success);
    assert_eq!(results[0].attempts, 1);
    assert_eq!(h.requests().await, 1);
}

#[tokio::test]
async fn test_retry_all_retries_client_errors() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&h.server)
        .await;

    let results = h
        .executor(config(2).with_retry_mode(RetryMode::Uniform))
        .run(&[2])
        .await;

    assert!(!results[0].success);
    assert_eq!(results[0].attempts, 3);
    assert_eq!(h.requests().await, 3);
}

#[tokio::test]
async fn test_malformed_body_is_retried_until_exhausted() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&h.server)
        .await;

    let results = h.executor(config(3)).run(&[2]).await;
    assert!(!results[0].success);
    assert_eq!(results[0].attempts, 4);
    assert_eq!(h.requests().await, 4);
}

#[tokio::test]
async fn test_zero_retries_means_single_attempt() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let results = h.executor(config(0)).run(&[2]).await;
    assert_eq!(results[0].attempts, 1);
    assert_eq!(h.requests().await, 1);
}

//! Shared HTTP resources for all fetcher instances
//!
//! Every worker issues its requests through one pooled [`reqwest::Client`] so
//! keep-alive connections to the CIMIS host are reused across stations.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::{FetcherError, FetcherResult};

/// HTTP connect timeout (seconds) - time to establish TCP connection
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Idle keep-alive connections kept per host
const HTTP_POOL_MAX_IDLE_PER_HOST: usize = 32;

/// Build a client with the standard timeouts
///
/// `gzip` controls whether `Accept-Encoding: gzip` is sent and responses are
/// transparently decompressed.
pub fn build_http_client(gzip: bool) -> FetcherResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE_PER_HOST)
        .gzip(gzip)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FetcherError::InvalidRequest(format!("failed to build HTTP client: {e}")))
}

/// Global HTTP client shared by all fetcher instances (gzip enabled)
pub static GLOBAL_HTTP_CLIENT: Lazy<Arc<Client>> = Lazy::new(|| {
    Arc::new(build_http_client(true).unwrap_or_else(|e| {
        panic!("FATAL: {e}. Check system TLS configuration.");
    }))
});

/// Get the global HTTP client
///
/// Returns a clone of the Arc, which is cheap (just increments ref count)
pub fn global_http_client() -> Arc<Client> {
    GLOBAL_HTTP_CLIENT.clone()
}

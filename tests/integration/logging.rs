//! Integration tests for logging and tracing

use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Writer that keeps everything the subscriber emits
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn emit_station_events() {
    let span = tracing::info_span!(target: "cimis_fetch::downloader", "station", station_id = 2u16, worker_id = 0usize);
    let _enter = span.enter();
    debug!(target: "cimis_fetch::downloader", attempt = 1, "Fetch attempt");
    info!(target: "cimis_fetch::downloader", records = 365, attempts = 1, "Station fetched");
    warn!(target: "cimis_fetch::downloader", attempt = 2, "Retrying station");
    error!(target: "cimis_fetch::downloader", "Station failed");
}

#[test]
fn test_human_format_carries_structured_fields() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cimis_fetch=info"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, emit_station_events);

    let text = captured.text();
    assert!(text.contains("Station fetched"), "{text}");
    assert!(text.contains("records=365"), "{text}");
    assert!(text.contains("station_id=2"), "{text}");
    assert!(text.contains("Retrying station"), "{text}");
    assert!(text.contains("Station failed"), "{text}");
    // Below the default level
    assert!(!text.contains("Fetch attempt"), "{text}");
}

#[test]
fn test_json_format_one_object_per_event() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("cimis_fetch=info"))
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, emit_station_events);

    let events: Vec<serde_json::Value> = captured
        .text()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["level"], "INFO");
    assert_eq!(events[0]["target"], "cimis_fetch::downloader");
    assert_eq!(events[0]["fields"]["message"], "Station fetched");
    assert_eq!(events[0]["fields"]["records"], 365);
    assert_eq!(events[1]["level"], "WARN");
    assert_eq!(events[2]["level"], "ERROR");
}

#[test]
fn test_filter_directive_raises_threshold() {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("cimis_fetch=warn,reqwest=warn"))
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, emit_station_events);

    let text = captured.text();
    assert!(!text.contains("Station fetched"), "{text}");
    assert!(text.contains("Retrying station"), "{text}");
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn test_env_filter_directives() {
    for directive in ["info", "cimis_fetch=debug", "cimis_fetch=info,reqwest=warn"] {
        assert!(
            directive.parse::<EnvFilter>().is_ok(),
            "directive should parse: {directive}"
        );
    }
}

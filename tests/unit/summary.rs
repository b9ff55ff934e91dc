//! Summary aggregation and rendering

use std::time::Duration;

use cimis_fetch::downloader::StationFetchResult;
use cimis_fetch::fetcher::FetchMetrics;
use cimis_fetch::report::FetchSummary;

fn fetched(station: u16, records: usize, attempts: u32) -> StationFetchResult {
    let metrics = FetchMetrics {
        connection_setup: Duration::from_millis(8),
        time_to_first_byte: Duration::from_millis(120),
        body_read: Duration::from_millis(14),
        json_decode: Duration::from_millis(3),
        total_duration: Duration::from_millis(140),
        records_fetched: records,
        bytes_transferred: 40_000,
    };
    StationFetchResult::fetched(station, 2024, attempts, &metrics)
}

#[test]
fn test_human_and_json_agree() {
    let summary = FetchSummary::from_results(
        vec![
            fetched(80, 366, 1),
            fetched(2, 365, 3),
            StationFetchResult::failed(6, 2024, 1, "non-retryable: 404", Duration::ZERO),
        ],
        Duration::from_secs(2),
    );

    let human = summary.render_human(true);
    assert!(human.contains("Stations:      3"));
    assert!(human.contains("Failed:        1"));
    assert!(human.contains("Total records: 731"));
    assert!(human.contains("Attempts:         3"));

    let json: serde_json::Value = serde_json::from_str(&summary.render_json().unwrap()).unwrap();
    assert_eq!(json["total_stations"], 3);
    assert_eq!(json["successful"], 2);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["total_records"], 731);
    assert_eq!(json["results"][0]["station_id"], 2);
    assert_eq!(json["results"][0]["attempts"], 3);
    assert_eq!(json["results"][0]["timings"]["connect_ms"], 8);
    assert_eq!(json["results"][0]["timings"]["decode_ms"], 3);
    assert_eq!(json["results"][1]["error"], "non-retryable: 404");
    assert!(json["timestamp"].as_str().unwrap().contains('T'));
}

#[test]
fn test_skipped_counts_as_success() {
    let summary = FetchSummary::from_results(
        vec![StationFetchResult::skipped(2, 2024, Duration::ZERO)],
        Duration::ZERO,
    );
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.total_records, 0);
    assert!(!summary.render_human(false).contains("WARNING"));
}

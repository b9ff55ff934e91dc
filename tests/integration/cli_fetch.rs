//! The fetch command end to end: flag parsing through the printed summary

use cimis_fetch::cli::{Cli, CliError, Commands};
use clap::Parser;
use tempfile::TempDir;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &str = r#"{"Data":{"Providers":[{"Records":[
    {"Date":"2023-06-01","DayAsceEto":{"Value":"6.25","Qc":" "}},
    {"Date":"2023-06-02","DayAsceEto":{"Value":"6.5","Qc":" "}}
]}]}}"#;

fn cli(server: &MockServer, dir: &TempDir, extra: &[&str]) -> Cli {
    let base_url = format!("{}/api/data", server.uri());
    let data_dir = dir.path().to_string_lossy().to_string();
    let mut argv = vec![
        "cimis-fetch".to_string(),
        "--output-format".to_string(),
        "json".to_string(),
        "--data-dir".to_string(),
        data_dir,
        "--app-key".to_string(),
        "test-key".to_string(),
        "fetch".to_string(),
        "--base-url".to_string(),
        base_url,
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    Cli::try_parse_from(argv).unwrap()
}

async fn run(cli: &Cli) -> Result<cimis_fetch::report::FetchSummary, CliError> {
    match &cli.command {
        Commands::Fetch(args) => args.execute(cli).await,
    }
}

#[tokio::test]
async fn test_fetch_command_with_explicit_range() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("startDate", "06/01/2023"))
        .and(query_param("endDate", "06/30/2023"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
        .expect(3)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let cli = cli(
        &server,
        &dir,
        &["--stations", "6-7,2", "--start", "06/01/2023", "--end", "06/30/2023", "--concurrency", "2"],
    );
    let summary = run(&cli).await.unwrap();

    assert_eq!(summary.total_stations, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.total_records, 6);
    let ids: Vec<_> = summary.results.iter().map(|r| r.station_id).collect();
    assert_eq!(ids, vec![2, 6, 7]);
    assert!(dir.path().join("stations/002/2023_daily.csv").is_file());
}

#[tokio::test]
async fn test_station_failures_are_reported_not_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let cli = cli(&server, &dir, &["--stations", "2,5", "--year", "2023", "--retries", "0"]);
    let summary = run(&cli).await.unwrap();

    assert_eq!(summary.failed, 2);
    assert!(summary.has_failures());
    let json = summary.render_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["results"].as_array().unwrap().len(), 2);
    assert_eq!(parsed["results"][0]["success"], false);
}

#[tokio::test]
async fn test_station_list_with_only_reversed_range_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let cli = cli(&server, &dir, &["--stations", "9-3", "--year", "2023"]);
    assert!(matches!(
        run(&cli).await,
        Err(CliError::StationListError(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_date_range_is_rejected() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let cli = cli(
        &server,
        &dir,
        &["--stations", "2", "--start", "02/01/2024", "--end", "01/01/2024"],
    );
    assert!(matches!(run(&cli).await, Err(CliError::InvalidArgument(_))));
}

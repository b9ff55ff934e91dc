//! Contract tests for the CIMIS daily data endpoint
//!
//! A wiremock server stands in for et.water.ca.gov and checks the request
//! shape the client sends, while canned bodies check the decode contract.

use cimis_fetch::fetcher::cimis_http::{CimisClient, DAILY_DATA_ITEMS};
use cimis_fetch::fetcher::{DateRange, FetcherError, StationFetcher};
use cimis_fetch::qc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAILY_BODY: &str = r#"{
  "Data": {
    "Providers": [{
      "Name": "cimis",
      "Type": "station",
      "Owner": "water.ca.gov",
      "Records": [
        {
          "Date": "2024-01-01",
          "Julian": "1",
          "Station": "2",
          "Standard": "english",
          "ZipCodes": "93624",
          "Scope": "daily",
          "DayAirTmpAvg": {"Value": "8.5", "Qc": " ", "Unit": "(C)"},
          "DayAsceEto": {"Value": "0.75", "Qc": " ", "Unit": "(mm)"},
          "DayWindSpdAvg": {"Value": "1.5", "Qc": " ", "Unit": "(m/s)"},
          "DayRelHumAvg": {"Value": "88", "Qc": "Y", "Unit": "(%)"},
          "DaySolRadAvg": {"Value": "6.5", "Qc": " ", "Unit": "(MJ/m²)"},
          "DayPrecip": {"Value": "2.25", "Qc": " ", "Unit": "(mm)"}
        },
        {
          "Date": "2024-01-02",
          "DayAirTmpAvg": {"Value": null, "Qc": "M"},
          "DayAsceEto": {"Value": "", "Qc": " "}
        }
      ]
    }]
  }
}"#;

fn client_for(server: &MockServer) -> CimisClient {
    CimisClient::new("test-key").with_base_url(format!("{}/api/data", server.uri()))
}

fn january() -> DateRange {
    DateRange::parse("01/01/2024", "01/31/2024").unwrap()
}

#[tokio::test]
async fn test_request_carries_required_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(query_param("appKey", "test-key"))
        .and(query_param("targets", "2"))
        .and(query_param("startDate", "01/01/2024"))
        .and(query_param("endDate", "01/31/2024"))
        .and(query_param("dataItems", DAILY_DATA_ITEMS))
        .and(query_param("unitOfMeasure", "M"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DAILY_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let (records, metrics) = client_for(&server).fetch_daily(2, &january()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(metrics.records_fetched, 2);
    assert_eq!(metrics.bytes_transferred, DAILY_BODY.len() as u64);
    assert!(metrics.time_to_first_byte >= metrics.connection_setup);
}

#[tokio::test]
async fn test_decoded_values_are_fixed_point() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DAILY_BODY))
        .mount(&server)
        .await;

    let (records, _) = client_for(&server).fetch_daily(2, &january()).await.unwrap();

    let first = &records[0];
    assert_eq!(first.station_id, 2);
    assert_eq!(first.timestamp, 14_244);
    assert_eq!(first.temperature, 85);
    assert_eq!(first.et, 75);
    assert_eq!(first.wind_speed, 15);
    assert_eq!(first.humidity, 88);
    assert_eq!(first.solar_radiation, 65);
    assert_eq!(first.precipitation, 225);
    assert_eq!(first.qc_flags, qc::HUMIDITY);

    let second = &records[1];
    assert_eq!(second.temperature, 0);
    assert_eq!(second.et, 0);
    assert!(second.has_qc(qc::TEMPERATURE));
    assert!(!second.has_qc(qc::ET));
}

#[tokio::test]
async fn test_non_200_is_http_status_error_without_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("<html>Not Found</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_daily(999, &january()).await.unwrap_err();
    match err {
        FetcherError::HttpStatus { status, body } => {
            assert_eq!(status, 404);
            assert!(body.contains("Not Found"));
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"Data": {"Providers": [{"Records": [{"Date": "#))
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_daily(2, &january()).await.unwrap_err();
    assert!(matches!(err, FetcherError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn test_error_document_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"Errors": {"Message": "Invalid app key"}}"#),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).fetch_daily(2, &january()).await.unwrap_err();
    assert!(matches!(err, FetcherError::Decode(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Reserve a port, then close it
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = CimisClient::new("k").with_base_url(format!("http://127.0.0.1:{port}/api/data"));

    let err = client.fetch_daily(2, &january()).await.unwrap_err();
    assert!(matches!(err, FetcherError::Transport(_)), "{err:?}");
}

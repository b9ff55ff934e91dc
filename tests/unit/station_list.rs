//! Station list parsing and ordering

use cimis_fetch::stations::{parse_station_list, resolve_stations, StationListError};

#[test]
fn test_mixed_list_resolves_sorted() {
    assert_eq!(resolve_stations("80, 2, 5-7").unwrap(), vec![2, 5, 6, 7, 80]);
}

#[test]
fn test_duplicates_are_kept() {
    assert_eq!(resolve_stations("5,2,5").unwrap(), vec![2, 5, 5]);
    assert_eq!(resolve_stations("2-3,3").unwrap(), vec![2, 3, 3]);
}

#[test]
fn test_reversed_range_contributes_nothing() {
    assert_eq!(parse_station_list("9-3").unwrap(), Vec::<u16>::new());
    assert_eq!(resolve_stations("9-3,4").unwrap(), vec![4]);
    assert_eq!(resolve_stations("9-3"), Err(StationListError::Empty));
}

#[test]
fn test_malformed_tokens() {
    assert!(matches!(
        parse_station_list("abc"),
        Err(StationListError::InvalidStation(t)) if t == "abc"
    ));
    assert!(matches!(
        parse_station_list("x-5"),
        Err(StationListError::InvalidRangeStart(_))
    ));
    assert!(matches!(
        parse_station_list("5-y"),
        Err(StationListError::InvalidRangeEnd(_))
    ));
    assert!(matches!(
        parse_station_list("1-2-3"),
        Err(StationListError::InvalidRange(_))
    ));
    assert!(parse_station_list("2,,5").is_err());
    assert!(parse_station_list("70000").is_err());
}

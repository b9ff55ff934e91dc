//! Station list parsing and ordering
//!
//! Accepts comma-separated lists of station numbers and inclusive ranges,
//! e.g. `"2,5-7,10"`, and expands them into an ascending list of [`StationId`]s.

use tracing::warn;

use crate::StationId;

/// Station list errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StationListError {
    /// A token is not a valid station number
    #[error("invalid station '{0}'")]
    InvalidStation(String),

    /// A range token does not have exactly two bounds
    #[error("invalid range '{0}': expected LOW-HIGH")]
    InvalidRange(String),

    /// The lower bound of a range failed to parse
    #[error("invalid range start '{0}'")]
    InvalidRangeStart(String),

    /// The upper bound of a range failed to parse
    #[error("invalid range end '{0}'")]
    InvalidRangeEnd(String),

    /// The list expanded to zero stations
    #[error("no stations specified")]
    Empty,
}

/// Parse a station list into identifiers in encounter order
///
/// Each comma-separated token is either a station number or an inclusive
/// `LOW-HIGH` range. Whitespace around tokens and bounds is ignored. A range
/// whose low bound exceeds its high bound expands to nothing.
///
/// # Examples
///
/// ```
/// use cimis_fetch::stations::parse_station_list;
///
/// let ids = parse_station_list("2, 5-7").unwrap();
/// assert_eq!(ids, vec![2, 5, 6, 7]);
/// ```
pub fn parse_station_list(input: &str) -> Result<Vec<StationId>, StationListError> {
    let mut stations = Vec::new();

    for token in input.split(',') {
        let token = token.trim();

        if token.contains('-') {
            let bounds: Vec<&str> = token.split('-').collect();
            if bounds.len() != 2 {
                return Err(StationListError::InvalidRange(token.to_string()));
            }

            let low: StationId = bounds[0]
                .trim()
                .parse()
                .map_err(|_| StationListError::InvalidRangeStart(bounds[0].trim().to_string()))?;
            let high: StationId = bounds[1]
                .trim()
                .parse()
                .map_err(|_| StationListError::InvalidRangeEnd(bounds[1].trim().to_string()))?;

            if low > high {
                warn!(range = %token, "Station range is reversed and expands to no stations");
                continue;
            }
            stations.extend(low..=high);
        } else {
            let id: StationId = token
                .parse()
                .map_err(|_| StationListError::InvalidStation(token.to_string()))?;
            stations.push(id);
        }
    }

    Ok(stations)
}

/// Sort stations ascending in place
///
/// Stable insertion sort; station lists are short and often already ordered.
pub fn sort_stations(stations: &mut [StationId]) {
    for i in 1..stations.len() {
        let mut j = i;
        while j > 0 && stations[j - 1] > stations[j] {
            stations.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Parse, sort and validate a station list for dispatch
///
/// # Errors
///
/// Returns [`StationListError::Empty`] when the list expands to zero stations,
/// or the underlying parse error.
pub fn resolve_stations(input: &str) -> Result<Vec<StationId>, StationListError> {
    let mut stations = parse_station_list(input)?;
    if stations.is_empty() {
        return Err(StationListError::Empty);
    }
    sort_stations(&mut stations);
    Ok(stations)
}

//! CIMIS daily response decoder
//!
//! Walks `Data → Providers[] → Records[]` with a chain of serde visitors and
//! converts each record straight into a [`DailyRecord`], skipping every other
//! key without materializing it. Record fields are borrowed from the input
//! buffer whenever the JSON string has no escapes.

use std::borrow::Cow;
use std::fmt;

use chrono::NaiveDate;
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use tracing::debug;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::{
    days_since_epoch, qc, scale_et, scale_humidity, scale_precipitation, scale_solar_radiation,
    scale_temperature, scale_wind_speed, DailyRecord, StationId, EPOCH_YEAR, MAX_YEAR,
};

/// Days from 1970-01-01 to the given civil date (proleptic Gregorian)
const fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year as i64 - 1 } else { year as i64 };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

const EPOCH_CIVIL_DAYS: i64 = days_from_civil(EPOCH_YEAR, 1, 1);

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
            if leap {
                29
            } else {
                28
            }
        }
    }
}

#[inline]
fn two_digits(b: &[u8]) -> Option<u32> {
    if b[0].is_ascii_digit() && b[1].is_ascii_digit() {
        Some(u32::from(b[0] - b'0') * 10 + u32::from(b[1] - b'0'))
    } else {
        None
    }
}

/// Parse `YYYY-MM-DD` without going through a format-string parser
///
/// Only accepts exactly ten bytes with dashes at offsets 4 and 7, years in
/// 1985..=2100 and a day that exists in the month.
pub fn parse_date_fast(s: &str) -> Option<(i32, u32, u32)> {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return None;
    }

    let year = (two_digits(&b[0..2])? * 100 + two_digits(&b[2..4])?) as i32;
    let month = two_digits(&b[5..7])?;
    let day = two_digits(&b[8..10])?;

    if !(EPOCH_YEAR..=MAX_YEAR).contains(&year) || !(1..=12).contains(&month) {
        return None;
    }
    if day < 1 || day > days_in_month(year, month) {
        return None;
    }
    Some((year, month, day))
}

/// Record timestamp (days since 1985-01-01) for an API date string
///
/// Tries [`parse_date_fast`] first and falls back to chrono. Returns `None`
/// when the date cannot be parsed or does not fall strictly after the epoch.
pub fn parse_record_date(s: &str) -> Option<u32> {
    let days = match parse_date_fast(s) {
        Some((y, m, d)) => days_from_civil(y, m, d) - EPOCH_CIVIL_DAYS,
        None => {
            let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
            days_since_epoch(date)
        }
    };

    if days <= 0 {
        return None;
    }
    u32::try_from(days).ok()
}

/// One measurement as it appears on the wire: `{"Value": ..., "Qc": ...}`
#[derive(Debug, Default, Deserialize)]
pub struct RawMeasurement<'a> {
    /// Numeric value; `None` when missing, null, empty or not a number
    #[serde(rename = "Value", default, deserialize_with = "deserialize_value")]
    pub value: Option<f64>,
    /// Quality-control code; a single blank means no issue
    #[serde(rename = "Qc", default, borrow, deserialize_with = "deserialize_qc")]
    pub qc: Cow<'a, str>,
}

impl RawMeasurement<'_> {
    /// Whether the measurement carries a quality-control code
    pub fn has_qc_flag(&self) -> bool {
        !self.qc.is_empty() && self.qc != " "
    }
}

/// Minimal shape of a daily record; unknown keys are skipped
#[derive(Debug, Default, Deserialize)]
pub struct RawDailyRecord<'a> {
    /// `YYYY-MM-DD`
    #[serde(rename = "Date", default, borrow)]
    pub date: Cow<'a, str>,
    /// Average air temperature (°C)
    #[serde(rename = "DayAirTmpAvg", default, borrow)]
    pub air_temperature: Option<RawMeasurement<'a>>,
    /// ASCE reference ET (mm)
    #[serde(rename = "DayAsceEto", default, borrow)]
    pub asce_eto: Option<RawMeasurement<'a>>,
    /// Average wind speed (m/s)
    #[serde(rename = "DayWindSpdAvg", default, borrow)]
    pub wind_speed: Option<RawMeasurement<'a>>,
    /// Average relative humidity (%)
    #[serde(rename = "DayRelHumAvg", default, borrow)]
    pub relative_humidity: Option<RawMeasurement<'a>>,
    /// Average solar radiation (MJ/m²)
    #[serde(rename = "DaySolRadAvg", default, borrow)]
    pub solar_radiation: Option<RawMeasurement<'a>>,
    /// Precipitation (mm)
    #[serde(rename = "DayPrecip", default, borrow)]
    pub precipitation: Option<RawMeasurement<'a>>,
}

fn deserialize_value<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ValueVisitor;

    impl<'de> Visitor<'de> for ValueVisitor {
        type Value = Option<f64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number, a numeric string or null")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            Ok(v.parse::<f64>().ok().filter(|x| x.is_finite()))
        }

        fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }

    deserializer.deserialize_any(ValueVisitor)
}

fn deserialize_qc<'de, D>(deserializer: D) -> Result<Cow<'de, str>, D::Error>
where
    D: Deserializer<'de>,
{
    struct QcVisitor;

    impl<'de> Visitor<'de> for QcVisitor {
        type Value = Cow<'de, str>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a quality-control code string or null")
        }

        fn visit_borrowed_str<E: de::Error>(self, v: &'de str) -> Result<Self::Value, E> {
            Ok(Cow::Borrowed(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(Cow::Owned(v.to_owned()))
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
            Ok(Cow::Owned(v))
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Cow::Borrowed(""))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Cow::Borrowed(""))
        }
    }

    deserializer.deserialize_any(QcVisitor)
}

fn measurement(m: &Option<RawMeasurement<'_>>, flag: u8, qc_flags: &mut u8) -> f64 {
    match m {
        Some(m) => {
            if m.has_qc_flag() {
                *qc_flags |= flag;
            }
            m.value.unwrap_or(0.0)
        }
        None => 0.0,
    }
}

/// Convert a wire record into a [`DailyRecord`]
///
/// Returns `None` when the date is unusable. Absent measurements scale to 0.
pub fn to_daily_record(raw: &RawDailyRecord<'_>, station: StationId) -> Option<DailyRecord> {
    let timestamp = parse_record_date(&raw.date)?;
    let mut qc_flags = 0u8;

    let temperature = measurement(&raw.air_temperature, qc::TEMPERATURE, &mut qc_flags);
    let et = measurement(&raw.asce_eto, qc::ET, &mut qc_flags);
    let wind = measurement(&raw.wind_speed, qc::WIND_SPEED, &mut qc_flags);
    let humidity = measurement(&raw.relative_humidity, qc::HUMIDITY, &mut qc_flags);
    let solar = measurement(&raw.solar_radiation, qc::SOLAR_RADIATION, &mut qc_flags);
    let precip = measurement(&raw.precipitation, qc::PRECIPITATION, &mut qc_flags);

    Some(DailyRecord {
        timestamp,
        station_id: station,
        temperature: scale_temperature(temperature),
        et: scale_et(et),
        wind_speed: scale_wind_speed(wind),
        humidity: scale_humidity(humidity),
        solar_radiation: scale_solar_radiation(solar),
        precipitation: scale_precipitation(precip),
        qc_flags,
    })
}

#[derive(Deserialize)]
#[serde(field_identifier)]
enum ResponseKey {
    Data,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(field_identifier)]
enum DataKey {
    Providers,
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(field_identifier)]
enum ProviderKey {
    Records,
    #[serde(other)]
    Other,
}

/// Accumulates converted records while the visitors walk the document
struct DecodeState {
    station: StationId,
    records: Vec<DailyRecord>,
    skipped: usize,
}

struct ResponseSeed<'s>(&'s mut DecodeState);

impl<'de> DeserializeSeed<'de> for ResponseSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ResponseSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a CIMIS response object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut found = false;
        while let Some(key) = map.next_key::<ResponseKey>()? {
            match key {
                ResponseKey::Data if !found => {
                    map.next_value_seed(DataSeed(&mut *self.0))?;
                    found = true;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        if !found {
            return Err(de::Error::missing_field("Data"));
        }
        Ok(())
    }
}

struct DataSeed<'s>(&'s mut DecodeState);

impl<'de> DeserializeSeed<'de> for DataSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for DataSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a Data object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut found = false;
        while let Some(key) = map.next_key::<DataKey>()? {
            match key {
                DataKey::Providers if !found => {
                    map.next_value_seed(ProvidersSeed(&mut *self.0))?;
                    found = true;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        if !found {
            return Err(de::Error::missing_field("Providers"));
        }
        Ok(())
    }
}

struct ProvidersSeed<'s>(&'s mut DecodeState);

impl<'de> DeserializeSeed<'de> for ProvidersSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ProvidersSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a Providers array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while seq.next_element_seed(ProviderSeed(&mut *self.0))?.is_some() {}
        Ok(())
    }
}

struct ProviderSeed<'s>(&'s mut DecodeState);

impl<'de> DeserializeSeed<'de> for ProviderSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ProviderSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a provider object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let mut found = false;
        while let Some(key) = map.next_key::<ProviderKey>()? {
            match key {
                ProviderKey::Records if !found => {
                    map.next_value_seed(RecordsSeed(&mut *self.0))?;
                    found = true;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        if !found {
            return Err(de::Error::missing_field("Records"));
        }
        Ok(())
    }
}

struct RecordsSeed<'s>(&'s mut DecodeState);

impl<'de> DeserializeSeed<'de> for RecordsSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for RecordsSeed<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a Records array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        if let Some(hint) = seq.size_hint() {
            self.0.records.reserve(hint);
        }
        while let Some(raw) = seq.next_element::<RawDailyRecord<'de>>()? {
            match to_daily_record(&raw, self.0.station) {
                Some(record) => self.0.records.push(record),
                None => self.0.skipped += 1,
            }
        }
        Ok(())
    }
}

/// Stateless decoder for CIMIS daily data responses
pub struct CimisParser;

impl CimisParser {
    /// Decode a full response body into daily records for `station`
    ///
    /// Records with unusable dates are dropped and counted at debug level.
    ///
    /// # Errors
    /// Returns [`FetcherError::Decode`] for malformed JSON or when `Data`,
    /// `Providers` or a provider's `Records` is missing.
    pub fn decode_daily(body: &[u8], station: StationId) -> FetcherResult<Vec<DailyRecord>> {
        let mut state = DecodeState {
            station,
            records: Vec::new(),
            skipped: 0,
        };

        let mut deserializer = serde_json::Deserializer::from_slice(body);
        ResponseSeed(&mut state)
            .deserialize(&mut deserializer)
            .and_then(|()| deserializer.end())
            .map_err(|e| FetcherError::Decode(e.to_string()))?;

        if state.skipped > 0 {
            debug!(
                station_id = station,
                skipped = state.skipped,
                kept = state.records.len(),
                "Dropped records with unusable dates"
            );
        }

        Ok(state.records)
    }
}

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};

/// Storage format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a timestamp the way it is stored.
pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time on the store's clock (naive UTC).
pub fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Last representable second of a day.
pub fn end_of_day(d: NaiveDate) -> NaiveDateTime {
    d.and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN))
}

/// Parse an ISO date or date-time string.
///
/// Accepts:
/// - `2025-01-15`
/// - `2025-01-15T10:30:00`, with optional fractional seconds
/// - `2025-01-15 10:30:00`
/// - RFC 3339 with offset (`2025-01-15T10:30:00.000Z`), normalized to UTC
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::InvalidDate("empty date string".into()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(NaiveTime::MIN));
    }
    Err(Error::InvalidDate(format!("unrecognized date: {s}")))
}

/// Round to two decimal places.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `part / whole × 100`, rounded to two decimals; 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// Period-over-period change in percent.
///
/// With no prior activity the change is 100 if anything happened now, else 0.
pub fn percent_change(current: u64, previous: u64) -> f64 {
    if previous == 0 {
        return if current > 0 { 100.0 } else { 0.0 };
    }
    (current as f64 - previous as f64) / previous as f64 * 100.0
}

/// Mean of the samples formatted with two decimals, or `"0"` when empty.
pub fn format_mean(samples: &[f64]) -> String {
    if samples.is_empty() {
        return "0".to_string();
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    format!("{mean:.2}")
}

/// Serde adapter for timestamps in exported records.
///
/// Reads anything [`parse_timestamp`] accepts and writes the storage format.
pub mod ts_serde {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_ts(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<NaiveDateTime>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => s.serialize_str(&super::super::format_ts(*ts)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.trim().is_empty() => super::super::parse_timestamp(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }

    pub mod vec {
        use chrono::NaiveDateTime;
        use serde::ser::SerializeSeq;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(ts: &[NaiveDateTime], s: S) -> Result<S::Ok, S::Error> {
            let mut seq = s.serialize_seq(Some(ts.len()))?;
            for t in ts {
                seq.serialize_element(&super::super::format_ts(*t))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Vec<NaiveDateTime>, D::Error> {
            Vec::<String>::deserialize(d)?
                .iter()
                .map(|raw| super::super::parse_timestamp(raw).map_err(serde::de::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    #[test]
    fn test_parse_timestamp_date_only() {
        assert_eq!(
            parse_timestamp("2025-01-15").unwrap(),
            ts("2025-01-15T00:00:00")
        );
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert_eq!(
            parse_timestamp("2025-01-15T10:30:00").unwrap(),
            ts("2025-01-15T10:30:00")
        );
        assert_eq!(
            parse_timestamp("2025-01-15 10:30:00").unwrap(),
            ts("2025-01-15T10:30:00")
        );
        assert_eq!(
            parse_timestamp("2025-01-15T10:30:00.250").unwrap().date(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
        // Offsets are folded into UTC
        assert_eq!(
            parse_timestamp("2025-01-15T10:30:00+02:00").unwrap(),
            ts("2025-01-15T08:30:00")
        );
        assert_eq!(
            parse_timestamp("2025-01-15T10:30:00.000Z").unwrap(),
            ts("2025-01-15T10:30:00")
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(parse_timestamp(""), Err(Error::InvalidDate(_))));
        assert!(matches!(parse_timestamp("not a date"), Err(Error::InvalidDate(_))));
        assert!(matches!(parse_timestamp("2025-13-01"), Err(Error::InvalidDate(_))));
    }

    #[test]
    fn test_end_of_day() {
        let d = NaiveDate::from_ymd_opt(2025, 2, 28).unwrap();
        assert_eq!(format_ts(end_of_day(d)), "2025-02-28T23:59:59");
    }

    #[test]
    fn test_percentage_zero_whole() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn test_percentage_rounds() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(4, 4), 100.0);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(10, 4), 150.0);
        assert_eq!(percent_change(3, 0), 100.0);
        assert_eq!(percent_change(0, 0), 0.0);
        assert_eq!(percent_change(2, 4), -50.0);
    }

    #[test]
    fn test_format_mean() {
        assert_eq!(format_mean(&[]), "0");
        assert_eq!(format_mean(&[1.0, 2.0]), "1.50");
        assert_eq!(format_mean(&[0.5, 0.25, 0.25]), "0.33");
    }
}

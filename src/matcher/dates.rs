//! Date parsing and proximity checks for filename matching
//!
//! Release names carry dates in a handful of shapes: full ISO-ish dates
//! with assorted separators, US month-first dates, and bare `DD MM` pairs
//! that need a reference year from elsewhere in the filename.

use std::collections::HashMap;

use chrono::NaiveDate;

/// Maximum days apart for two dates to count as the same event.
pub const DATE_PROXIMITY_DAYS: i64 = 2;

/// Whether two dates are within the proximity tolerance.
///
/// Both absent counts as "within" (nothing to contradict); exactly one
/// absent counts as "not within" (proximity cannot be verified).
pub fn dates_within_proximity(a: Option<NaiveDate>, b: Option<NaiveDate>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).num_days().abs() <= DATE_PROXIMITY_DAYS,
        _ => false,
    }
}

/// Extract a date from regex capture groups named `day`/`month` and
/// `date_year` (or `year`).
pub fn parse_date_from_groups(groups: &HashMap<String, String>) -> Option<NaiveDate> {
    let day: u32 = groups.get("day")?.parse().ok()?;
    let month: u32 = groups.get("month")?.parse().ok()?;
    let year: i32 = groups
        .get("date_year")
        .or_else(|| groups.get("year"))?
        .parse()
        .ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

const FULL_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%Y %m %d",
    "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%Y", "%d %m %Y",
    "%m-%d-%Y",
];

const PARTIAL_FORMATS: &[&str] = &["%d %m", "%d-%m", "%d.%m", "%d/%m", "%d_%m"];

/// Parse a date string, trying full formats first and falling back to
/// partial `DD MM` formats when a reference year is supplied.
pub fn parse_date_string(value: &str, reference_year: Option<i32>) -> Option<NaiveDate> {
    let stripped = value.trim();
    if stripped.is_empty() {
        return None;
    }

    for format in FULL_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(stripped, format) {
            return Some(date);
        }
    }

    let reference_year = reference_year?;
    for format in PARTIAL_FORMATS {
        // chrono needs a complete date, so pin the reference year first.
        let candidate = format!("{stripped} {reference_year}");
        let full_format = format!("{format} %Y");
        if let Ok(date) = NaiveDate::parse_from_str(&candidate, &full_format) {
            return Some(date);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn proximity_tolerance_is_two_days() {
        assert!(dates_within_proximity(Some(date(2025, 12, 22)), Some(date(2025, 12, 24))));
        assert!(!dates_within_proximity(Some(date(2025, 12, 22)), Some(date(2025, 12, 25))));
        assert!(dates_within_proximity(None, None));
        assert!(!dates_within_proximity(Some(date(2025, 12, 22)), None));
    }

    #[test]
    fn parses_full_date_formats() {
        assert_eq!(parse_date_string("2025-11-22", None), Some(date(2025, 11, 22)));
        assert_eq!(parse_date_string("2025.11.22", None), Some(date(2025, 11, 22)));
        assert_eq!(parse_date_string("22 11 2025", None), Some(date(2025, 11, 22)));
        // US month-first, unambiguous because day > 12.
        assert_eq!(parse_date_string("11-22-2025", None), Some(date(2025, 11, 22)));
    }

    #[test]
    fn parses_partial_date_with_reference_year() {
        assert_eq!(parse_date_string("16 11", Some(2025)), Some(date(2025, 11, 16)));
        assert_eq!(parse_date_string("16-11", Some(2025)), Some(date(2025, 11, 16)));
        assert_eq!(parse_date_string("16 11", None), None);
    }

    #[test]
    fn parses_date_from_groups() {
        let mut groups = HashMap::new();
        groups.insert("day".to_string(), "22".to_string());
        groups.insert("month".to_string(), "12".to_string());
        groups.insert("year".to_string(), "2025".to_string());
        assert_eq!(parse_date_from_groups(&groups), Some(date(2025, 12, 22)));

        groups.insert("date_year".to_string(), "2024".to_string());
        // date_year takes precedence over year.
        assert_eq!(parse_date_from_groups(&groups), Some(date(2024, 12, 22)));
    }
}

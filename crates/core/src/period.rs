use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Excel serial 25569 is 1970-01-01. Anchoring on the Unix epoch keeps every
/// serial after the phantom 1900-02-29 consistent with Excel's own display.
pub const EXCEL_UNIX_EPOCH_SERIAL: i64 = 25569;

/// Largest serial Excel accepts (9999-12-31).
pub const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// Convert an Excel serial day number to a calendar date. The fractional
/// time-of-day part is discarded. Serials below 1 are not dates.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    let days = serial.floor() as i64 - EXCEL_UNIX_EPOCH_SERIAL;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if days >= 0 {
        epoch.checked_add_days(Days::new(days as u64))
    } else {
        epoch.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// A calendar month, the reporting period for monthly roll-ups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(YearMonth { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    /// Accepts `2025-01`, `2025/01` and `1/2025`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = s.split(['-', '/']).collect();
        let parsed: Option<(i32, u32)> = match parts.as_slice() {
            [a, b] if a.len() == 4 => a.parse().ok().zip(b.parse().ok()),
            [a, b] if b.len() == 4 => b.parse().ok().zip(a.parse().ok()),
            _ => None,
        };
        parsed
            .and_then(|(year, month)| YearMonth::new(year, month))
            .ok_or_else(|| format!("Invalid period: '{s}'"))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn serial_for_unix_epoch() {
        assert_eq!(excel_serial_to_date(25569.0), Some(date(1970, 1, 1)));
    }

    #[test]
    fn serial_for_recent_dates() {
        assert_eq!(excel_serial_to_date(45658.0), Some(date(2025, 1, 1)));
        assert_eq!(excel_serial_to_date(45672.75), Some(date(2025, 1, 15)));
    }

    #[test]
    fn serial_after_phantom_leap_day() {
        // Excel shows serial 61 as 1900-03-01.
        assert_eq!(excel_serial_to_date(61.0), Some(date(1900, 3, 1)));
    }

    #[test]
    fn serial_out_of_range() {
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(-5.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
        assert_eq!(excel_serial_to_date(3_000_000.0), None);
    }

    #[test]
    fn year_month_display_and_parse() {
        let ym = YearMonth::of(date(2025, 1, 31));
        assert_eq!(ym.to_string(), "2025-01");
        assert_eq!("2025-01".parse::<YearMonth>().unwrap(), ym);
        assert_eq!("1/2025".parse::<YearMonth>().unwrap(), ym);
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("January".parse::<YearMonth>().is_err());
    }

    #[test]
    fn year_month_orders_chronologically() {
        let mut months = vec![
            YearMonth::new(2025, 2).unwrap(),
            YearMonth::new(2024, 12).unwrap(),
            YearMonth::new(2025, 1).unwrap(),
        ];
        months.sort();
        assert_eq!(months[0].to_string(), "2024-12");
        assert_eq!(months[2].to_string(), "2025-02");
    }

    #[test]
    fn year_month_serde_as_string() {
        let ym = YearMonth::new(2025, 3).unwrap();
        assert_eq!(serde_json::to_string(&ym).unwrap(), "\"2025-03\"");
    }
}

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;

/// `M-D-YY.xlsx`, `MM.DD.YYYY.xlsx`, optionally `M-D-YY.<shift>.xlsx`.
pub const DEFAULT_FILENAME_PATTERN: &str =
    r"^(?P<month>\d{1,2})[-.](?P<day>\d{1,2})[-.](?P<year>\d{4}|\d{2})(?:\.(?P<shift>\d{1,2}))?\.[A-Za-z]+$";

#[derive(Debug, Error)]
pub enum FilenamePatternError {
    #[error("Invalid filename pattern: {0}")]
    Regex(#[from] regex::Error),
    #[error("Filename pattern is missing the named group '{0}'")]
    MissingGroup(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameMeta {
    pub date: NaiveDate,
    pub shift: Option<u8>,
}

/// Reads the date (and shift) encoded in a daily workbook's file name.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    regex: Regex,
}

impl Default for FilenamePattern {
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_FILENAME_PATTERN).expect("default filename pattern compiles"),
        }
    }
}

impl FilenamePattern {
    pub fn new(pattern: &str) -> Result<Self, FilenamePatternError> {
        let regex = Regex::new(pattern)?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for group in ["month", "day", "year"] {
            if !names.contains(&group) {
                return Err(FilenamePatternError::MissingGroup(group));
            }
        }
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// `None` when the name does not match or names an impossible date.
    pub fn parse(&self, file_name: &str) -> Option<FilenameMeta> {
        let caps = self.regex.captures(file_name.trim())?;
        let month: u32 = caps.name("month")?.as_str().parse().ok()?;
        let day: u32 = caps.name("day")?.as_str().parse().ok()?;
        let year_text = caps.name("year")?.as_str();
        let mut year: i32 = year_text.parse().ok()?;
        if year_text.len() == 2 {
            year += 2000;
        }
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let shift = caps
            .name("shift")
            .and_then(|s| s.as_str().parse::<u8>().ok());
        Some(FilenameMeta { date, shift })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_short_and_long_years() {
        let p = FilenamePattern::default();
        assert_eq!(p.parse("1-15-25.xlsx").unwrap().date, ymd(2025, 1, 15));
        assert_eq!(p.parse("12.03.2024.xls").unwrap().date, ymd(2024, 12, 3));
        assert_eq!(p.parse("01-02-25.csv").unwrap().shift, None);
    }

    #[test]
    fn parses_shift_suffix() {
        let meta = FilenamePattern::default().parse("3-7-25.2.xlsx").unwrap();
        assert_eq!(meta.date, ymd(2025, 3, 7));
        assert_eq!(meta.shift, Some(2));
    }

    #[test]
    fn rejects_non_matching_and_impossible_dates() {
        let p = FilenamePattern::default();
        assert!(p.parse("January scrap.xlsx").is_none());
        assert!(p.parse("2-30-25.xlsx").is_none());
        assert!(p.parse("13-01-25.xlsx").is_none());
    }

    #[test]
    fn custom_pattern_requires_groups() {
        assert!(matches!(
            FilenamePattern::new(r"^(?P<month>\d+)-(?P<day>\d+)"),
            Err(FilenamePatternError::MissingGroup("year"))
        ));
        let p = FilenamePattern::new(r"^scrap_(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})\.xlsx$")
            .unwrap();
        assert_eq!(p.parse("scrap_20250115.xlsx").unwrap().date, ymd(2025, 1, 15));
    }
}

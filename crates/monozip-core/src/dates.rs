//! Date parsing and the fixed-width suffixes appended to derived passwords.

use chrono::{Local, NaiveDate};

use crate::clients::ClientRuleError;

/// Input format accepted by [`parse_date`].
pub const INPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date, defaulting to today's local date when the input
/// is absent or blank.
pub fn parse_date(value: Option<&str>) -> Result<NaiveDate, ClientRuleError> {
    parse_date_or(value, Local::now().date_naive())
}

/// Same as [`parse_date`] but with an explicit fallback for absent input.
pub fn parse_date_or(value: Option<&str>, today: NaiveDate) -> Result<NaiveDate, ClientRuleError> {
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(today),
        Some(raw) => raw,
    };
    // chrono's %Y also takes signed and short years.
    if !has_iso_date_shape(raw) {
        return Err(malformed_date());
    }
    NaiveDate::parse_from_str(raw, INPUT_DATE_FORMAT).map_err(|_| malformed_date())
}

/// Exactly `DDDD-DD-DD` in ASCII digits.
fn has_iso_date_shape(raw: &str) -> bool {
    raw.len() == 10
        && raw.bytes().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => byte == b'-',
            _ => byte.is_ascii_digit(),
        })
}

fn malformed_date() -> ClientRuleError {
    ClientRuleError::InvalidInput("Dates must use the YYYY-MM-DD format.".to_string())
}

/// Month and day, zero padded, no separators: `0305`.
pub fn format_mmdd(date: NaiveDate) -> String {
    date.format("%m%d").to_string()
}

/// Full date, zero padded, no separators: `20240305`.
pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_iso_dates() {
        let parsed = parse_date(Some("2024-03-05")).expect("parse");
        assert_eq!(parsed, date(2024, 3, 5));

        let padded = parse_date(Some("  2024-12-31 ")).expect("parse trimmed");
        assert_eq!(padded, date(2024, 12, 31));
    }

    #[test]
    fn missing_or_blank_input_defaults_to_today() {
        let today = date(2025, 1, 9);
        assert_eq!(parse_date_or(None, today).expect("none"), today);
        assert_eq!(parse_date_or(Some(""), today).expect("empty"), today);
        assert_eq!(parse_date_or(Some("   "), today).expect("blank"), today);
    }

    #[test]
    fn malformed_input_names_expected_format() {
        for raw in [
            "03/05/2024",
            "2024-13-01",
            "2024-02-30",
            "yesterday",
            "-0001-03-05",
            "+2024-03-05",
            "24-03-05",
            "2024-3-5",
            "12024-03-05",
            "２０２４-03-05",
        ] {
            let err = parse_date(Some(raw)).expect_err("should reject");
            match err {
                ClientRuleError::InvalidInput(message) => {
                    assert!(message.contains("YYYY-MM-DD"), "message was {message}")
                }
                other => panic!("unexpected error for {raw}: {other}"),
            }
        }
    }

    #[test]
    fn accepted_dates_always_yield_eight_digit_suffix() {
        for raw in ["0001-01-01", "2024-02-29", "9999-12-31"] {
            let parsed = parse_date(Some(raw)).expect("parse");
            assert_eq!(format_yyyymmdd(parsed).len(), 8, "suffix for {raw}");
        }
    }

    #[test]
    fn suffix_formats_are_zero_padded() {
        assert_eq!(format_mmdd(date(2024, 3, 5)), "0305");
        assert_eq!(format_mmdd(date(1999, 12, 31)), "1231");
        assert_eq!(format_yyyymmdd(date(2024, 3, 5)), "20240305");
        assert_eq!(format_yyyymmdd(date(987, 1, 2)), "09870102");
    }

    #[test]
    fn full_suffix_parses_back_to_same_date() {
        let original = date(2031, 7, 4);
        let suffix = format_yyyymmdd(original);
        let reparsed = NaiveDate::parse_from_str(&suffix, "%Y%m%d").expect("reparse");
        assert_eq!(reparsed, original);
    }
}

//! Delivery dates as reported by the carrier, and the parsers for their two encodings.

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::ParseError;

/// Norwegian month names, January first. Matched case-sensitively.
pub static MONTHS: [&str; 12] = [
    "januar",
    "februar",
    "mars",
    "april",
    "mai",
    "juni",
    "juli",
    "august",
    "september",
    "oktober",
    "november",
    "desember",
];

static ISO_FORMAT: &str = "%Y-%m-%d";

/// Ordered delivery dates without duplicates, in upstream order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateSequence(Vec<NaiveDate>);

impl DateSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a date unless it is already present. Returns whether it was added.
    pub fn push(&mut self, date: NaiveDate) -> bool {
        if self.0.contains(&date) {
            return false;
        }
        self.0.push(date);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NaiveDate> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[NaiveDate] {
        &self.0
    }
}

impl FromIterator<NaiveDate> for DateSequence {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        let mut sequence = DateSequence::new();
        for date in iter {
            sequence.push(date);
        }
        sequence
    }
}

impl<'a> IntoIterator for &'a DateSequence {
    type Item = &'a NaiveDate;
    type IntoIter = std::slice::Iter<'a, NaiveDate>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Parser for one upstream date encoding.
#[derive(Debug, Clone)]
pub enum DateParser {
    /// Strict `YYYY-MM-DD`.
    Iso,
    /// Free text ending in `<day>. <month name>`, e.g. `"torsdag 4. september"`.
    Localized { pattern: Regex },
}

impl DateParser {
    pub fn iso() -> Self {
        DateParser::Iso
    }

    pub fn localized() -> Result<Self, regex::Error> {
        let pattern = Regex::new(
            r"(?x)
                (?P<day>\d+) # the day of the month
                \.\s+
                (?P<month>\w+) # the month name
                $
            ",
        )?;
        Ok(DateParser::Localized { pattern })
    }

    /// Parse a single date.
    ///
    /// Localized dates carry no year: they are placed in the year of `today`, or in the next year
    /// if that day has already passed.
    pub fn parse(&self, raw: &str, today: NaiveDate) -> Result<NaiveDate, ParseError> {
        match self {
            DateParser::Iso => parse_iso(raw),
            DateParser::Localized { pattern } => parse_localized(pattern, raw, today),
        }
    }

    /// Parse every date, failing on the first one that cannot be parsed.
    pub fn parse_all<I, S>(&self, raws: I, today: NaiveDate) -> Result<DateSequence, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sequence = DateSequence::new();
        for raw in raws {
            sequence.push(self.parse(raw.as_ref(), today)?);
        }
        Ok(sequence)
    }
}

fn parse_iso(raw: &str) -> Result<NaiveDate, ParseError> {
    let bad_format = || ParseError::BadFormat {
        raw: raw.to_string(),
    };
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return Err(bad_format());
    }
    NaiveDate::parse_from_str(raw, ISO_FORMAT).map_err(|_| bad_format())
}

fn parse_localized(pattern: &Regex, raw: &str, today: NaiveDate) -> Result<NaiveDate, ParseError> {
    let captures = pattern
        .captures(raw)
        .ok_or_else(|| ParseError::BadFormat {
            raw: raw.to_string(),
        })?;
    let month_name = &captures["month"];
    let month = MONTHS
        .iter()
        .position(|name| *name == month_name)
        .ok_or_else(|| ParseError::UnknownMonth {
            raw: raw.to_string(),
            month: month_name.to_string(),
        })?;
    let day: u32 = captures["day"]
        .parse()
        .map_err(|_| ParseError::BadFormat {
            raw: raw.to_string(),
        })?;
    let month = month as u32 + 1;
    NaiveDate::from_ymd_opt(today.year(), month, day)
        .filter(|date| *date >= today)
        .or_else(|| NaiveDate::from_ymd_opt(today.year() + 1, month, day))
        .ok_or_else(|| ParseError::InvalidDate {
            raw: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_localized_later_this_year() {
        let parser = DateParser::localized().unwrap();
        let parsed = parser.parse("4. september", date(2025, 1, 10)).unwrap();
        assert_eq!(parsed, date(2025, 9, 4));
    }

    #[test]
    fn test_localized_rolls_into_next_year() {
        let parser = DateParser::localized().unwrap();
        let parsed = parser.parse("4. september", date(2025, 10, 1)).unwrap();
        assert_eq!(parsed, date(2026, 9, 4));
    }

    #[test]
    fn test_localized_today_is_not_rolled() {
        let parser = DateParser::localized().unwrap();
        let parsed = parser.parse("mandag 1. desember", date(2025, 12, 1)).unwrap();
        assert_eq!(parsed, date(2025, 12, 1));
    }

    #[test]
    fn test_localized_year_boundary() {
        let parser = DateParser::localized().unwrap();
        let today = date(2025, 12, 30);
        let sequence = parser
            .parse_all(["tirsdag 30. desember", "fredag 2. januar"], today)
            .unwrap();
        assert_eq!(sequence.as_slice(), &[date(2025, 12, 30), date(2026, 1, 2)]);
    }

    #[test]
    fn test_localized_leap_day() {
        let parser = DateParser::localized().unwrap();
        let parsed = parser.parse("29. februar", date(2027, 1, 10)).unwrap();
        assert_eq!(parsed, date(2028, 2, 29));
    }

    #[test]
    fn test_localized_errors() {
        let parser = DateParser::localized().unwrap();
        let today = date(2025, 1, 10);
        assert_eq!(
            parser.parse("i morgen", today),
            Err(ParseError::BadFormat {
                raw: "i morgen".to_string()
            })
        );
        assert_eq!(
            parser.parse("4. September", today),
            Err(ParseError::UnknownMonth {
                raw: "4. September".to_string(),
                month: "September".to_string()
            })
        );
        assert_eq!(
            parser.parse("31. juni", today),
            Err(ParseError::InvalidDate {
                raw: "31. juni".to_string()
            })
        );
        assert_eq!(
            parser.parse("4. september ", today),
            Err(ParseError::BadFormat {
                raw: "4. september ".to_string()
            })
        );
    }

    #[test]
    fn test_iso() {
        let parser = DateParser::iso();
        let today = date(2025, 1, 10);
        assert_eq!(parser.parse("2025-09-04", today), Ok(date(2025, 9, 4)));
        // ISO dates are taken as they are, even in the past.
        assert_eq!(parser.parse("2024-12-24", today), Ok(date(2024, 12, 24)));
        for raw in ["2025-9-4", "2025-02-30", "04.09.2025", "2025-09-04T00:00:00", ""] {
            assert_eq!(
                parser.parse(raw, today),
                Err(ParseError::BadFormat {
                    raw: raw.to_string()
                })
            );
        }
    }

    #[test]
    fn test_parse_all_fails_whole() {
        let parser = DateParser::iso();
        let result = parser.parse_all(["2025-09-04", "soon", "2025-09-05"], date(2025, 1, 10));
        assert_eq!(
            result,
            Err(ParseError::BadFormat {
                raw: "soon".to_string()
            })
        );
    }

    #[test]
    fn test_sequence_deduplicates_in_order() {
        let sequence: DateSequence = [
            date(2025, 9, 4),
            date(2025, 9, 2),
            date(2025, 9, 4),
            date(2025, 9, 8),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            sequence.as_slice(),
            &[date(2025, 9, 4), date(2025, 9, 2), date(2025, 9, 8)]
        );
        assert_eq!(sequence.len(), 3);
        assert!(DateSequence::new().is_empty());
    }
}

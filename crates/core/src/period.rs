//! Calendar period arithmetic used to derive partition boundaries and names.
//!
//! Everything here is pure: the same date, period and cast always render the
//! same partition name and SQL literal.

use crate::error::PartitionError;
use chrono::{Datelike, Duration, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity that partitions are bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    /// One partition per calendar day
    Day,
    /// One partition per calendar month
    Month,
}

impl Period {
    /// All recognised periods, in the order they are matched against legacy
    /// routing function bodies.
    pub const ALL: [Period; 2] = [Period::Day, Period::Month];

    /// Keyword used in metadata comments and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Month => "month",
        }
    }

    /// `strftime` pattern of the partition name suffix.
    pub fn name_format(&self) -> &'static str {
        match self {
            Period::Day => "%Y%m%d",
            Period::Month => "%Y%m",
        }
    }

    /// The same suffix pattern spelled the way Postgres `to_char` spells it.
    ///
    /// Legacy routing functions embed this literal, which is how the period is
    /// recovered from a function body.
    pub fn sql_format(&self) -> &'static str {
        match self {
            Period::Day => "YYYYMMDD",
            Period::Month => "YYYYMM",
        }
    }

    /// Truncate a date down to the start of its period.
    pub fn round(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Day => date,
            Period::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Move a date by `n` periods (negative moves backwards).
    ///
    /// Month arithmetic clamps to the last valid day of the target month.
    /// Returns `None` when the result falls outside the supported calendar.
    pub fn advance(&self, date: NaiveDate, n: i64) -> Option<NaiveDate> {
        match self {
            Period::Day => date.checked_add_signed(Duration::try_days(n)?),
            Period::Month => {
                let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
                if n >= 0 {
                    date.checked_add_months(months)
                } else {
                    date.checked_sub_months(months)
                }
            }
        }
    }

    /// Render the partition name suffix for a period start.
    pub fn name_suffix(&self, date: NaiveDate) -> String {
        date.format(self.name_format()).to_string()
    }

    /// Parse a partition name suffix back into its period start date.
    pub fn parse_suffix(&self, suffix: &str) -> Option<NaiveDate> {
        let day = match self {
            Period::Day if suffix.len() == 8 => suffix.to_string(),
            Period::Month if suffix.len() == 6 => format!("{}01", suffix),
            _ => return None,
        };
        if !day.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDate::parse_from_str(&day, "%Y%m%d").ok()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "month" => Ok(Period::Month),
            other => Err(PartitionError::InvalidPeriod(other.to_string())),
        }
    }
}

/// SQL type the partitioning column's boundary literals are cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cast {
    /// `date` (also the fallback for installations that predate casts)
    #[default]
    Date,
    /// `timestamp without time zone`
    Timestamp,
    /// `timestamp with time zone`
    Timestamptz,
}

impl Cast {
    /// Keyword used in metadata comments and in `::cast` suffixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cast::Date => "date",
            Cast::Timestamp => "timestamp",
            Cast::Timestamptz => "timestamptz",
        }
    }

    /// Infer the cast from an `information_schema.columns.data_type` value.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type {
            "timestamp with time zone" => Cast::Timestamptz,
            "timestamp without time zone" => Cast::Timestamp,
            _ => Cast::Date,
        }
    }

    /// Render a date as a quoted SQL literal, optionally with an explicit cast.
    ///
    /// `timestamptz` literals carry midnight UTC so the boundary does not
    /// depend on the session time zone.
    pub fn literal(&self, date: NaiveDate, with_cast: bool) -> String {
        let body = match self {
            Cast::Timestamptz => format!("{} 00:00:00 UTC", date.format("%Y-%m-%d")),
            Cast::Date | Cast::Timestamp => date.format("%Y-%m-%d").to_string(),
        };
        if with_cast {
            format!("'{}'::{}", body, self.as_str())
        } else {
            format!("'{}'", body)
        }
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cast {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(Cast::Date),
            "timestamp" => Ok(Cast::Timestamp),
            "timestamptz" => Ok(Cast::Timestamptz),
            other => Err(PartitionError::InvalidCast(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_round_month_truncates_to_first() {
        assert_eq!(Period::Month.round(date(2024, 3, 15)), date(2024, 3, 1));
        assert_eq!(Period::Day.round(date(2024, 3, 15)), date(2024, 3, 15));
    }

    #[test]
    fn test_next_month_after_rounding_every_day_of_year() {
        let mut day = date(2023, 1, 1);
        while day.year() == 2023 {
            let next = Period::Month.advance(Period::Month.round(day), 1).unwrap();
            assert_eq!(next.day(), 1);
            if day.month() == 12 {
                assert_eq!(next, date(2024, 1, 1));
            } else {
                assert_eq!(next.month(), day.month() + 1);
            }
            day = day.succ_opt().unwrap();
        }
    }

    #[test]
    fn test_advance_backwards() {
        assert_eq!(Period::Month.advance(date(2024, 1, 1), -2), Some(date(2023, 11, 1)));
        assert_eq!(Period::Day.advance(date(2024, 3, 1), -1), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_month_advance_clamps_short_months() {
        assert_eq!(Period::Month.advance(date(2024, 1, 31), 1), Some(date(2024, 2, 29)));
    }

    #[test]
    fn test_advance_out_of_range() {
        assert_eq!(Period::Day.advance(date(2024, 3, 1), -200_000_000), None);
        assert_eq!(Period::Day.advance(date(2024, 3, 1), i64::MAX), None);
        assert_eq!(Period::Month.advance(date(2024, 3, 1), 4_000_000_000), None);
        assert_eq!(Period::Month.advance(date(2024, 3, 1), -4_000_000_000), None);
    }

    #[test]
    fn test_name_suffix_and_parse() {
        assert_eq!(Period::Day.name_suffix(date(2024, 3, 5)), "20240305");
        assert_eq!(Period::Month.name_suffix(date(2024, 3, 5)), "202403");
        assert_eq!(Period::Month.parse_suffix("202403"), Some(date(2024, 3, 1)));
        assert_eq!(Period::Day.parse_suffix("20240305"), Some(date(2024, 3, 5)));
        assert_eq!(Period::Day.parse_suffix("202403"), None);
        assert_eq!(Period::Month.parse_suffix("intermediate"), None);
        assert_eq!(Period::Month.parse_suffix("202413"), None);
        assert_eq!(Period::Day.parse_suffix("20230229"), None);
        assert_eq!(Period::Day.parse_suffix("+2024030"), None);
    }

    #[test]
    fn test_literals() {
        let d = date(2024, 3, 1);
        assert_eq!(Cast::Date.literal(d, true), "'2024-03-01'::date");
        assert_eq!(Cast::Timestamp.literal(d, false), "'2024-03-01'");
        assert_eq!(
            Cast::Timestamptz.literal(d, true),
            "'2024-03-01 00:00:00 UTC'::timestamptz"
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!("month".parse::<Period>().unwrap(), Period::Month);
        assert!(matches!(
            "week".parse::<Period>(),
            Err(PartitionError::InvalidPeriod(_))
        ));
        assert_eq!(Cast::from_data_type("timestamp with time zone"), Cast::Timestamptz);
        assert_eq!(Cast::from_data_type("date"), Cast::Date);
        assert_eq!(Cast::from_data_type("bigint"), Cast::Date);
    }
}

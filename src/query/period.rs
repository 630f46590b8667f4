use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::{
    day_key, days_inclusive, each_day, last_day_of_month, parse_day, years_before, MAX_YEAR,
    MIN_YEAR,
};
use crate::error::{Error, Result};

static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_ROLLING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,4})[dD]$").unwrap());

/// How the baseline period is derived from the requested one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonMode {
    #[default]
    #[serde(rename = "previous")]
    PreviousPeriod,
    #[serde(rename = "same_last_year")]
    SameRangeLastYear,
}

impl ComparisonMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "previous" => Ok(ComparisonMode::PreviousPeriod),
            "same_last_year" => Ok(ComparisonMode::SameRangeLastYear),
            other => Err(Error::InvalidMode(format!(
                "unrecognized comparison mode '{other}' (expected 'previous' or 'same_last_year')"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonMode::PreviousPeriod => "previous",
            ComparisonMode::SameRangeLastYear => "same_last_year",
        }
    }
}

impl FromStr for ComparisonMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive range of whole calendar days.
///
/// `start` sits at 00:00:00.000 of its day and `end` at 23:59:59.999 of
/// its day; `start <= end` holds for every constructed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Reject days outside the years day keys can represent and still sort.
fn check_supported(d: NaiveDate) -> Result<()> {
    if (MIN_YEAR..=MAX_YEAR).contains(&d.year()) {
        Ok(())
    } else {
        Err(Error::InvalidRange(format!(
            "{d} is outside the supported years {MIN_YEAR}-{MAX_YEAR}"
        )))
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        check_supported(start)?;
        check_supported(end)?;
        if end < start {
            return Err(Error::InvalidRange(format!(
                "end {} is before start {}",
                day_key(end),
                day_key(start)
            )));
        }
        let end = end
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| Error::InvalidRange(format!("cannot normalize end {end}")))?;
        Ok(Self {
            start: start.and_time(NaiveTime::MIN),
            end,
        })
    }

    /// A single-day range.
    pub fn day(d: NaiveDate) -> Result<Self> {
        Self::new(d, d)
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn day_count(&self) -> i64 {
        days_inclusive(self.start_date(), self.end_date())
    }

    pub fn contains(&self, d: NaiveDate) -> bool {
        d >= self.start_date() && d <= self.end_date()
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        each_day(self.start_date(), self.end_date())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            day_key(self.start_date()),
            day_key(self.end_date())
        )
    }
}

/// The period a caller asked for, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedRange {
    Explicit { start: NaiveDate, end: NaiveDate },
    Month { year: i32, month: u32 },
}

impl RequestedRange {
    pub fn month(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::InvalidRange(format!(
                "month must be between 1 and 12, got {month}"
            )));
        }
        Ok(RequestedRange::Month { year, month })
    }

    pub fn explicit(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        check_supported(start)?;
        check_supported(end)?;
        if end < start {
            return Err(Error::InvalidRange(format!(
                "end {} is before start {}",
                day_key(end),
                day_key(start)
            )));
        }
        Ok(RequestedRange::Explicit { start, end })
    }

    /// Parse a period shorthand relative to `today`.
    ///
    /// Supported formats:
    /// - `2025-01`: calendar month
    /// - `2025-01-01..2025-01-15`: explicit days
    /// - `30d`: the last N days, ending today
    /// - `mtd`: month to date
    /// - `ytd`: year to date
    pub fn parse(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        match s.to_ascii_lowercase().as_str() {
            "mtd" => {
                let start = today.with_day(1).unwrap_or(today);
                return Self::explicit(start, today);
            }
            "ytd" => {
                let start = today.with_ordinal(1).unwrap_or(today);
                return Self::explicit(start, today);
            }
            _ => {}
        }

        if let Some(caps) = RE_ROLLING.captures(s) {
            let n: i64 = caps[1]
                .parse()
                .map_err(|_| Error::InvalidRange(format!("invalid day count: {s}")))?;
            if n == 0 {
                return Err(Error::InvalidRange("rolling period needs at least 1 day".into()));
            }
            let start = today
                .checked_sub_signed(Duration::days(n - 1))
                .ok_or_else(|| Error::InvalidRange(format!("{s} reaches before {today}")))?;
            return Self::explicit(start, today);
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1]
                .parse()
                .map_err(|_| Error::InvalidRange(format!("invalid year: {s}")))?;
            let month: u32 = caps[2]
                .parse()
                .map_err(|_| Error::InvalidRange(format!("invalid month: {s}")))?;
            return Self::month(year, month);
        }

        if let Some((start, end)) = s.split_once("..") {
            let start = parse_day(start)
                .ok_or_else(|| Error::InvalidRange(format!("invalid start date: {start}")))?;
            let end = parse_day(end)
                .ok_or_else(|| Error::InvalidRange(format!("invalid end date: {end}")))?;
            return Self::explicit(start, end);
        }

        Err(Error::InvalidRange(format!("unrecognized period: {s}")))
    }

    /// The normalized range this request covers.
    pub fn to_range(&self) -> Result<DateRange> {
        match *self {
            RequestedRange::Explicit { start, end } => DateRange::new(start, end),
            RequestedRange::Month { year, month } => {
                let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                    Error::InvalidRange(format!("invalid month: {year}-{month:02}"))
                })?;
                let last = last_day_of_month(year, month).ok_or_else(|| {
                    Error::InvalidRange(format!("invalid month: {year}-{month:02}"))
                })?;
                DateRange::new(first, last)
            }
        }
    }
}

impl fmt::Display for RequestedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedRange::Explicit { start, end } => {
                write!(f, "{}..{}", day_key(*start), day_key(*end))
            }
            RequestedRange::Month { year, month } => write!(f, "{year}-{month:02}"),
        }
    }
}

/// The requested window and the baseline it is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPeriod {
    pub current: DateRange,
    pub previous: DateRange,
}

/// Derive the current and comparison ranges for a request.
pub fn resolve(requested: &RequestedRange, mode: ComparisonMode) -> Result<ResolvedPeriod> {
    let current = requested.to_range()?;

    let previous = match (requested, mode) {
        (RequestedRange::Month { year, month }, ComparisonMode::PreviousPeriod) => {
            let prior = if *month == 1 {
                RequestedRange::Month { year: year - 1, month: 12 }
            } else {
                RequestedRange::Month { year: *year, month: month - 1 }
            };
            prior.to_range()?
        }
        (RequestedRange::Month { year, month }, ComparisonMode::SameRangeLastYear) => {
            RequestedRange::Month { year: year - 1, month: *month }.to_range()?
        }
        (RequestedRange::Explicit { .. }, ComparisonMode::PreviousPeriod) => {
            let end = current.start_date().pred_opt().ok_or_else(|| {
                Error::InvalidRange(format!("no day precedes {}", current.start_date()))
            })?;
            let start = end
                .checked_sub_signed(Duration::days(current.day_count() - 1))
                .ok_or_else(|| {
                    Error::InvalidRange(format!("no baseline fits before {}", current.start_date()))
                })?;
            DateRange::new(start, end)?
        }
        (RequestedRange::Explicit { .. }, ComparisonMode::SameRangeLastYear) => {
            let shift = |d: NaiveDate| {
                years_before(d, 1)
                    .ok_or_else(|| Error::InvalidRange(format!("cannot shift {d} back a year")))
            };
            DateRange::new(shift(current.start_date())?, shift(current.end_date())?)?
        }
    };

    log::debug!("Resolved {requested} ({mode}): current={current}, previous={previous}");
    Ok(ResolvedPeriod { current, previous })
}

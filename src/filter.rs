use std::fmt;

use chrono::NaiveDate;
use error_stack::{Report, ResultExt};

use crate::spotify::track::{ReleaseDate, Track};

#[derive(Debug)]
pub struct FilterError;

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter error")
    }
}

impl std::error::Error for FilterError {}

pub type FilterResult<T> = error_stack::Result<T, FilterError>;

/// Inclusive range of calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> FilterResult<Self> {
        if from > to {
            return Err(Report::new(FilterError)
                .attach_printable(format!("Range starts ({}) after it ends ({})", from, to)));
        }
        Ok(Self { from, to })
    }

    /// Parses user supplied bounds. Each bound may be `YYYY`, `YYYY-MM` or
    /// `YYYY-MM-DD`; a coarse lower bound expands to the first day of its
    /// period and a coarse upper bound to the last one, so `2001..2003` keeps
    /// everything released in 2001, 2002 and 2003.
    pub fn parse(from: &str, to: &str) -> FilterResult<Self> {
        let from = Self::parse_bound(from)?
            .first_day()
            .ok_or(Report::new(FilterError))?;
        let to = Self::parse_bound(to)?
            .last_day()
            .ok_or(Report::new(FilterError))?;
        Self::new(from, to)
    }

    fn parse_bound(value: &str) -> FilterResult<ReleaseDate> {
        ReleaseDate::parse(value)
            .ok_or(Report::new(FilterError))
            .attach_printable_lazy(|| {
                format!("Invalid date '{}', expected YYYY, YYYY-MM or YYYY-MM-DD", value)
            })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d")
        )
    }
}

/// Predicate a branch is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterCriteria {
    /// Album release date inside the range, bounds included. Coarse release
    /// dates compare as the first day of their period, tracks without one
    /// never match.
    ReleaseDate(DateRange),
}

impl FilterCriteria {
    pub fn matches(&self, track: &Track) -> bool {
        match self {
            FilterCriteria::ReleaseDate(range) => track
                .release_date
                .and_then(|date| date.first_day())
                .is_some_and(|day| range.contains(day)),
        }
    }
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterCriteria::ReleaseDate(range) => write!(f, "released {}", range),
        }
    }
}

/// Keeps the tracks matching `criteria`, in their original order.
pub fn filter(tracks: &[Track], criteria: &FilterCriteria) -> Vec<Track> {
    tracks
        .iter()
        .filter(|track| criteria.matches(track))
        .cloned()
        .collect()
}

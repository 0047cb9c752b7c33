//! Inclusive calendar date windows and the early-stop predicate.

use crate::error::AcquireError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar date window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting start > end.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AcquireError> {
        if start > end {
            return Err(AcquireError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Inclusive membership test: start ≤ date ≤ end.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True when `date` precedes the window entirely.
    ///
    /// On a listing sorted most-recent-first, a batch whose oldest date
    /// satisfies this proves every later page is also out of range, so
    /// the walker can stop early.
    pub fn is_before_range(&self, date: NaiveDate) -> bool {
        date < self.start
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

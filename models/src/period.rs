// models/src/period.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// Months are counted from January of this year; index 1 is January 2000.
pub const EPOCH_YEAR: i32 = 2000;

/// A calendar month expressed as a monotonic index since the epoch year.
///
/// The index is the comparable watermark the last-bill markers store: two
/// periods are the same iff their `month_index` is equal, and later months
/// always compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    month_index: i32,
}

impl BillingPeriod {
    /// Builds a period from a calendar year and a 1-based month.
    pub fn from_year_month(year: i32, month: u32) -> Self {
        BillingPeriod {
            month_index: (year - EPOCH_YEAR) * 12 + month as i32,
        }
    }

    pub fn from_month_index(month_index: i32) -> Self {
        BillingPeriod { month_index }
    }

    pub fn month_index(&self) -> i32 {
        self.month_index
    }

    pub fn year(&self) -> i32 {
        EPOCH_YEAR + (self.month_index - 1).div_euclid(12)
    }

    /// 1-based calendar month.
    pub fn month(&self) -> u32 {
        ((self.month_index - 1).rem_euclid(12) + 1) as u32
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

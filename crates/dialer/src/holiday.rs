//! Holiday lookup capability.
//!
//! Holiday computation is an external concern; the gate only needs a
//! boolean answer keyed by local civil date.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Answers "is this local date a holiday?" for the gate.
pub trait HolidayCalendar {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// A fixed table of holiday dates, loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct HolidayTable {
    dates: HashSet<NaiveDate>,
}

impl HolidayTable {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Parse a comma-separated list of `YYYY-MM-DD` dates, skipping
    /// malformed entries with a warning.
    pub fn from_csv(csv: &str) -> Self {
        let dates = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse::<NaiveDate>() {
                Ok(d) => Some(d),
                Err(_) => {
                    tracing::warn!("ignoring malformed holiday date: {s}");
                    None
                }
            })
            .collect();
        Self { dates }
    }
}

impl HolidayCalendar for HolidayTable {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csv_skips_malformed() {
        let table = HolidayTable::from_csv("2026-03-20, 2026-03-21, not-a-date,");
        assert!(table.is_holiday(NaiveDate::from_ymd_opt(2026, 3, 20).unwrap()));
        assert!(table.is_holiday(NaiveDate::from_ymd_opt(2026, 3, 21).unwrap()));
        assert!(!table.is_holiday(NaiveDate::from_ymd_opt(2026, 3, 22).unwrap()));
    }
}

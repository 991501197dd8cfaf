//! Which rows belong to the freshest snapshot.
//!
//! A row is *latest* when its own scrape date parses and equals the maximum
//! parsed date over the row set. Rows whose date fails the strict parse are
//! never candidates. Ties are all latest.

use chrono::NaiveDate;

use crate::date::parse_scraped_date;
use crate::record::Record;
use crate::schema::SCRAPED_DATE;

/// Precomputed maximum scrape date over a row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestSelector {
    field: &'static str,
    max: Option<NaiveDate>,
}

impl LatestSelector {
    /// Selector over the `scraped_date` column.
    pub fn new<'a>(rows: impl IntoIterator<Item = &'a Record>) -> Self {
        Self::for_field(rows, SCRAPED_DATE)
    }

    /// Selector over an arbitrary date column.
    pub fn for_field<'a>(rows: impl IntoIterator<Item = &'a Record>, field: &'static str) -> Self {
        let max = rows
            .into_iter()
            .filter_map(|r| r.get(field).and_then(parse_scraped_date))
            .max();
        Self { field, max }
    }

    /// Most recent valid date, if any row had one.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.max
    }

    pub fn is_latest(&self, row: &Record) -> bool {
        match (self.max, row.get(self.field).and_then(parse_scraped_date)) {
            (Some(max), Some(date)) => date == max,
            _ => false,
        }
    }
}

/// One flag per row, in order.
pub fn latest_flags(rows: &[Record]) -> Vec<bool> {
    let selector = LatestSelector::new(rows);
    rows.iter().map(|r| selector.is_latest(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dated(date: &str) -> Record {
        Record::new().with(SCRAPED_DATE, date)
    }

    #[test]
    fn ties_at_maximum_are_all_latest() {
        let rows = vec![
            dated("01/02/2024"),
            dated("15/03/2024"),
            dated("15/03/2024"),
            dated("bad-date"),
        ];
        assert_eq!(latest_flags(&rows), vec![false, true, true, false]);
    }

    #[test]
    fn no_valid_dates_means_nothing_is_latest() {
        let rows = vec![dated("bad-date"), Record::new(), dated("")];
        let selector = LatestSelector::new(&rows);
        assert_eq!(selector.max_date(), None);
        assert!(rows.iter().all(|r| !selector.is_latest(r)));
    }

    #[test]
    fn empty_set() {
        assert!(latest_flags(&[]).is_empty());
    }

    #[test]
    fn separators_compare_as_the_same_date() {
        let rows = vec![dated("15-03-2024"), dated("15/03/2024"), dated("14/03/2024")];
        assert_eq!(latest_flags(&rows), vec![true, true, false]);
    }

    #[test]
    fn day_first_ordering_drives_the_maximum() {
        // Month-first reading would make 12/01 (Dec 1) the newest.
        let rows = vec![dated("12/01/2024"), dated("02/03/2024")];
        let selector = LatestSelector::new(&rows);
        assert_eq!(selector.max_date(), NaiveDate::from_ymd_opt(2024, 3, 2));
        assert_eq!(latest_flags(&rows), vec![false, true]);
    }

    #[test]
    fn year_dominates() {
        let rows = vec![dated("31/12/2023"), dated("01/01/2024")];
        assert_eq!(latest_flags(&rows), vec![false, true]);
    }

    #[test]
    fn custom_field() {
        let rows = vec![
            Record::new().with("seen", "01/01/2024"),
            Record::new().with("seen", "02/01/2024"),
        ];
        let selector = LatestSelector::for_field(&rows, "seen");
        assert!(selector.is_latest(&rows[1]));
        assert!(!selector.is_latest(&rows[0]));
    }
}

//! Scrape-date parsing.
//!
//! The register publishes dates day-first. Every comparison of `scraped_date`
//! values goes through [`parse_scraped_date`] so that a value is either a real
//! calendar date or "no date", never something in between.
//!
//! # Accepted form
//!
//! - `DD/MM/YYYY` or `DD-MM-YYYY`
//! - each separator is `/` or `-` independently (`15/03-2024` is accepted)
//! - ASCII digits only, no surrounding whitespace
//! - day/month/year order, never month/day/year
//! - the triple must name a real date (`31/02/2024` is rejected)

use chrono::NaiveDate;

const LEN: usize = 10;

/// Parse a scrape date. Returns `None` for anything outside the strict form.
///
/// ```
/// use leadbook_core::parse_scraped_date;
/// use chrono::NaiveDate;
///
/// assert_eq!(
///     parse_scraped_date("15/03/2024"),
///     NaiveDate::from_ymd_opt(2024, 3, 15)
/// );
/// assert_eq!(parse_scraped_date("2024-03-15"), None);
/// ```
pub fn parse_scraped_date(raw: &str) -> Option<NaiveDate> {
    let b = raw.as_bytes();
    if b.len() != LEN || !is_sep(b[2]) || !is_sep(b[5]) {
        return None;
    }
    let day = digits(&b[0..2])?;
    let month = digits(&b[3..5])?;
    let year = digits(&b[6..10])?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

fn is_sep(b: u8) -> bool {
    b == b'/' || b == b'-'
}

fn digits(bytes: &[u8]) -> Option<u32> {
    bytes.iter().try_fold(0u32, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
    })
}

//! Date range splitting
//!
//! The service bounds how many days a single request may cover, so a long
//! period is cut into consecutive windows before anything is submitted.

use chrono::{Datelike, Days, NaiveDate};

use crate::types::DateRange;

/// Default window length, in days
pub const DEFAULT_MAX_DAYS: u32 = 7;

/// Split `range` into consecutive windows of at most `max_days` days
///
/// The windows are ascending, contiguous and non-overlapping, and together
/// cover `range` exactly. The last window is clamped to `range.end()`.
/// A `max_days` of zero is treated as one.
///
/// # Examples
///
/// ```
/// use cfdi_dl::period::split;
/// use cfdi_dl::types::DateRange;
/// use chrono::NaiveDate;
///
/// let jan = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
/// let windows = split(DateRange::new(jan(1), jan(20)).unwrap(), 7);
///
/// assert_eq!(windows.len(), 3);
/// assert_eq!(windows[2].start(), jan(15));
/// assert_eq!(windows[2].end(), jan(20));
/// ```
pub fn split(range: DateRange, max_days: u32) -> Vec<DateRange> {
    let step = u64::from(max_days.max(1));
    let mut windows = Vec::new();
    let mut current = range.start();

    loop {
        let window_end = current
            .checked_add_days(Days::new(step - 1))
            .map_or(range.end(), |end| end.min(range.end()));

        windows.push(DateRange::normalized(current, window_end));

        match window_end.succ_opt() {
            Some(next) if next <= range.end() => current = next,
            _ => break,
        }
    }

    windows
}

/// Period offered when the caller does not pick one: the first day of the
/// previous month through `today`
pub fn default_period(today: NaiveDate) -> DateRange {
    let first_of_this_month = today.with_day(1).unwrap_or(today);
    let start = first_of_this_month
        .pred_opt()
        .and_then(|last_month| last_month.with_day(1))
        .unwrap_or(first_of_this_month);
    DateRange::normalized(start, today)
}

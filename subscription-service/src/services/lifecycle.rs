//! Subscription lifecycle date math.
//!
//! Pure functions; the database service applies the results inside its
//! transactions.

use chrono::{Days, NaiveDate};

/// Period for an admin plan assignment: absolute start plus the plan
/// duration.
pub fn assignment_period(start: NaiveDate, duration_days: i32) -> (NaiveDate, NaiveDate) {
    (start, add_days(start, duration_days))
}

/// Start date for a renewal: the day after the current period for live
/// subscriptions, today for lapsed ones.
pub fn renewal_start(current_end: NaiveDate, today: NaiveDate) -> NaiveDate {
    if current_end < today {
        today
    } else {
        current_end.succ_opt().unwrap_or(current_end)
    }
}

/// Extension of an existing period by a renewal payment: additive on the
/// current end date regardless of how far in the past it lies.
pub fn extended_end(current_end: NaiveDate, duration_days: i32) -> NaiveDate {
    add_days(current_end, duration_days)
}

fn add_days(date: NaiveDate, days: i32) -> NaiveDate {
    if days >= 0 {
        date.checked_add_days(Days::new(days as u64)).unwrap_or(date)
    } else {
        date.checked_sub_days(Days::new((-days) as u64))
            .unwrap_or(date)
    }
}

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// The upcoming Friday; `today` itself when it is a Friday.
pub fn next_friday(today: NaiveDate) -> NaiveDate {
    let weekday = today.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    today + Duration::days((friday - weekday).rem_euclid(7))
}

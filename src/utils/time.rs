use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use now::DateTimeNow;

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).with_time(NaiveTime::MIN).unwrap()
}

/// Bounds of the local calendar day containing `moment`, expressed in UTC.
/// Queries and summaries treat "a day" as the user's wall-clock day.
pub fn local_day_bounds(moment: DateTime<Local>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = moment.beginning_of_day();
    let end = next_day_start(moment);
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

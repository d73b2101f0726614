use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;

/// Start of the Japan-time calendar day containing `now`, in UTC.
///
/// Daily caps reset at JST midnight, not UTC midnight.
pub fn jst_day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Tokyo).date_naive();
    local
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Tokyo.from_local_datetime(&midnight).single())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now - Duration::hours(24))
}

/// Whole days elapsed since `then`, floored, never negative.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - then).num_days().max(0)
}

pub fn hours_ago(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    now - Duration::hours(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jst_midnight_is_fifteen_utc() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 16, 30, 0).unwrap();
        assert_eq!(jst_day_start(now), Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap());

        let early = Utc.with_ymd_and_hms(2025, 3, 1, 14, 59, 0).unwrap();
        assert_eq!(jst_day_start(early), Utc.with_ymd_and_hms(2025, 2, 28, 15, 0, 0).unwrap());
    }

    #[test]
    fn days_since_floors() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(days_since(now - Duration::hours(49), now), 2);
        assert_eq!(days_since(now + Duration::hours(5), now), 0);
    }
}

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// A user's local calendar day and the instant it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayKey {
    pub day: NaiveDate,
    pub tz_name: String,
    pub reset_at: DateTime<Utc>,
}

impl DayKey {
    pub fn key(&self) -> String {
        self.day.format("%Y-%m-%d").to_string()
    }
}

/// Unknown or empty zone names resolve to UTC.
pub fn resolve_tz(name: Option<&str>) -> Tz {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|n| n.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC)
}

pub fn day_key(tz_name: Option<&str>, now: DateTime<Utc>) -> DayKey {
    let tz = resolve_tz(tz_name);
    let day = now.with_timezone(&tz).date_naive();
    DayKey {
        day,
        tz_name: tz.name().to_string(),
        reset_at: next_local_midnight(tz, day),
    }
}

/// Local date of `at` in the zone, for refunding against the day a swipe was made.
pub fn local_day(tz_name: Option<&str>, at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&resolve_tz(tz_name)).date_naive()
}

fn next_local_midnight(tz: Tz, day: NaiveDate) -> DateTime<Utc> {
    let next_day = day.succ_opt().unwrap_or(day);
    let midnight = next_day.and_hms_opt(0, 0, 0).unwrap_or_default();

    let local = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // Midnight skipped by a DST jump: the day starts at the first valid instant.
        LocalResult::None => match tz.from_local_datetime(&(midnight + Duration::hours(1))) {
            LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t,
            LocalResult::None => return Utc.from_utc_datetime(&midnight),
        },
    };
    local.with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minsk_evening_rolls_into_next_local_day() {
        let now = Utc.with_ymd_and_hms(2026, 2, 8, 21, 30, 0).unwrap();
        let day = day_key(Some("Europe/Minsk"), now);

        assert_eq!(day.key(), "2026-02-09");
        assert_eq!(day.reset_at, Utc.with_ymd_and_hms(2026, 2, 9, 21, 0, 0).unwrap());
        assert_eq!(day.tz_name, "Europe/Minsk");
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        let now = Utc.with_ymd_and_hms(2026, 2, 8, 21, 30, 0).unwrap();
        for tz in [None, Some(""), Some("Mars/Olympus")] {
            let day = day_key(tz, now);
            assert_eq!(day.key(), "2026-02-08");
            assert_eq!(day.tz_name, "UTC");
            assert_eq!(day.reset_at, Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap());
        }
    }

    #[test]
    fn reset_is_always_after_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 29, 0, 30, 0).unwrap();
        for tz in ["America/Sao_Paulo", "Europe/Berlin", "Asia/Kolkata", "Pacific/Apia"] {
            let day = day_key(Some(tz), now);
            assert!(day.reset_at > now, "{tz}");
        }
    }

    #[test]
    fn local_day_of_past_swipe() {
        let at = Utc.with_ymd_and_hms(2026, 2, 8, 22, 0, 0).unwrap();
        assert_eq!(local_day(Some("Europe/Minsk"), at), NaiveDate::from_ymd_opt(2026, 2, 9).unwrap());
        assert_eq!(local_day(None, at), NaiveDate::from_ymd_opt(2026, 2, 8).unwrap());
    }
}

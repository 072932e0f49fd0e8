use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const SLOT_MINUTES: u32 = 30;

/// Slot start times for `date` between `start` and `end`.
///
/// `start` is rounded up to the next half hour; a boundary is kept only if
/// the whole 30 minutes fit before `end`. When `date` is today, times that
/// are not after `now` are dropped.
pub fn generate_slot_times(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    let mut start_minutes = start.hour() * 60 + start.minute();
    if start.second() > 0 || start.nanosecond() > 0 {
        start_minutes += 1;
    }
    let first = start_minutes.div_ceil(SLOT_MINUTES) * SLOT_MINUTES;
    let end_minutes = end.hour() * 60 + end.minute();

    let mut times = Vec::new();
    let mut minutes = first;
    while minutes + SLOT_MINUTES <= end_minutes {
        if let Some(time) = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0) {
            if date != now.date() || date.and_time(time) > now {
                times.push(time);
            }
        }
        minutes += SLOT_MINUTES;
    }

    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, d).unwrap()
    }

    fn morning_of(d: u32) -> NaiveDateTime {
        day(d).and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_enumerates_half_hours() {
        let times = generate_slot_times(day(10), t(9, 0), t(11, 0), morning_of(1));
        assert_eq!(times, vec![t(9, 0), t(9, 30), t(10, 0), t(10, 30)]);
    }

    #[test]
    fn test_partial_last_slot_is_dropped() {
        let times = generate_slot_times(day(10), t(9, 0), t(10, 15), morning_of(1));
        assert_eq!(times, vec![t(9, 0), t(9, 30)]);
    }

    #[test]
    fn test_unaligned_start_rounds_up() {
        let times = generate_slot_times(day(10), t(9, 10), t(10, 30), morning_of(1));
        assert_eq!(times, vec![t(9, 30), t(10, 0)]);

        let with_seconds = NaiveTime::from_hms_opt(9, 30, 5).unwrap();
        let times = generate_slot_times(day(10), with_seconds, t(10, 30), morning_of(1));
        assert_eq!(times, vec![t(10, 0)]);
    }

    #[test]
    fn test_window_shorter_than_a_slot_is_empty() {
        assert!(generate_slot_times(day(10), t(9, 0), t(9, 20), morning_of(1)).is_empty());
        assert!(generate_slot_times(day(10), t(11, 0), t(9, 0), morning_of(1)).is_empty());
    }

    #[test]
    fn test_today_skips_elapsed_times() {
        let now = day(10).and_hms_opt(10, 0, 0).unwrap();
        let times = generate_slot_times(day(10), t(9, 0), t(12, 0), now);
        assert_eq!(times, vec![t(10, 30), t(11, 0), t(11, 30)]);
    }

    #[test]
    fn test_runs_to_end_of_day() {
        let times = generate_slot_times(day(10), t(23, 0), NaiveTime::from_hms_opt(23, 59, 59).unwrap(), morning_of(1));
        assert_eq!(times, vec![t(23, 0)]);
    }
}

use chrono::{Datelike, Days, NaiveDate};

use crate::models::{ScheduleDescriptor, Weekday};

pub const UNDEFINED_DATE_LABEL: &str = "Data não definida";

/// Every date in `[start_date, end_date]` falling on `weekday`, ascending in
/// 7-day steps. Any missing input, or a start after the end, gives an empty list.
pub fn generate_occurrences(
    weekday: Option<Weekday>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Vec<NaiveDate> {
    let (Some(weekday), Some(start), Some(end)) = (weekday, start_date, end_date) else {
        return Vec::new();
    };
    if start > end {
        return Vec::new();
    }

    let offset = (weekday.index() + 7 - start.weekday().num_days_from_sunday()) % 7;
    let Some(first) = start.checked_add_days(Days::new(u64::from(offset))) else {
        return Vec::new();
    };

    std::iter::successors(Some(first), |date| date.checked_add_days(Days::new(7)))
        .take_while(|date| *date <= end)
        .collect()
}

pub fn occurrences_for(schedule: &ScheduleDescriptor) -> Vec<NaiveDate> {
    generate_occurrences(schedule.weekday, schedule.start_date, schedule.end_date)
}

/// Reads the calendar part of a stored date string. A trailing time of day
/// (`2024-01-04T12:00:00`, `2024-01-04T00:00:00-03:00`, `2024-01-04 08:00`)
/// is ignored rather than interpreted.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = match raw.get(..10) {
        Some(head) if raw.len() == 10 => head,
        Some(head) if raw[10..].starts_with(['T', ' ']) => head,
        _ => raw,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// 1-based week number of `date` within an occurrence list.
pub fn week_index_of(date: NaiveDate, occurrences: &[NaiveDate]) -> Option<u32> {
    occurrences
        .binary_search(&date)
        .ok()
        .and_then(|idx| u32::try_from(idx + 1).ok())
}

pub fn format_date_br(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%d/%m/%Y").to_string(),
        None => UNDEFINED_DATE_LABEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn thursdays_in_january() {
        let dates = generate_occurrences(
            Some(Weekday::Thursday),
            Some(date(2024, 1, 1)),
            Some(date(2024, 1, 25)),
        );
        assert_eq!(
            dates,
            vec![
                date(2024, 1, 4),
                date(2024, 1, 11),
                date(2024, 1, 18),
                date(2024, 1, 25),
            ]
        );
    }

    #[test]
    fn start_on_target_weekday_is_included() {
        let dates = generate_occurrences(
            Some(Weekday::Monday),
            Some(date(2024, 1, 1)),
            Some(date(2024, 1, 15)),
        );
        let expected = vec![date(2024, 1, 1), date(2024, 1, 8), date(2024, 1, 15)];
        assert_eq!(dates, expected);
    }

    #[test]
    fn single_day_range() {
        let monday = date(2024, 1, 1);
        let day = Some(monday);
        let dates = generate_occurrences(Some(Weekday::Monday), day, day);
        assert_eq!(dates, vec![monday]);

        let tuesday = Some(Weekday::Tuesday);
        assert!(generate_occurrences(tuesday, day, day).is_empty());
    }

    #[test]
    fn every_date_matches_weekday_and_steps_by_seven() {
        let start = date(2023, 2, 13);
        let end = date(2024, 6, 30);
        for weekday in Weekday::ALL {
            let dates = generate_occurrences(Some(weekday), Some(start), Some(end));
            assert!(!dates.is_empty());
            let first = dates[0];
            assert!(first >= start);
            assert!((first - start).num_days() < 7);
            assert!(*dates.last().expect("non-empty") <= end);
            for d in &dates {
                assert_eq!(Weekday::from(d.weekday()), weekday);
            }
            for pair in dates.windows(2) {
                assert_eq!((pair[1] - pair[0]).num_days(), 7);
            }
        }
    }

    #[test]
    fn crosses_leap_day_and_year_end() {
        let dates = generate_occurrences(
            Some(Weekday::Thursday),
            Some(date(2024, 2, 20)),
            Some(date(2024, 3, 10)),
        );
        let expected = vec![date(2024, 2, 22), date(2024, 2, 29), date(2024, 3, 7)];
        assert_eq!(dates, expected);

        let dates = generate_occurrences(
            Some(Weekday::Friday),
            Some(date(2024, 12, 25)),
            Some(date(2025, 1, 10)),
        );
        let expected = vec![date(2024, 12, 27), date(2025, 1, 3), date(2025, 1, 10)];
        assert_eq!(dates, expected);
    }

    #[test]
    fn inverted_or_missing_inputs_are_empty() {
        let monday = Some(Weekday::Monday);
        let start = Some(date(2024, 2, 1));
        let end = Some(date(2024, 1, 1));
        assert!(generate_occurrences(monday, start, end).is_empty());
        assert!(generate_occurrences(None, end, start).is_empty());
        assert!(generate_occurrences(monday, None, start).is_empty());
        assert!(generate_occurrences(monday, end, None).is_empty());
    }

    #[test]
    fn range_without_matching_day_is_empty() {
        let dates = generate_occurrences(
            Some(Weekday::Sunday),
            Some(date(2024, 1, 1)),
            Some(date(2024, 1, 6)),
        );
        assert!(dates.is_empty());
    }

    #[test]
    fn generation_is_repeatable() {
        let schedule = ScheduleDescriptor::parse(
            Some("Quarta-feira"),
            Some("2024-03-01"),
            Some("2024-06-30"),
        );
        assert_eq!(occurrences_for(&schedule), occurrences_for(&schedule));
        assert_eq!(occurrences_for(&schedule).len(), 17);
    }

    #[test]
    fn schedule_from_raw_strings() {
        let start = Some("2024-01-01");
        let end = Some("2024-01-25");
        let schedule = ScheduleDescriptor::parse(Some("Quinta-feira"), start, end);
        assert_eq!(occurrences_for(&schedule).len(), 4);

        let unscheduled = ScheduleDescriptor::parse(Some("Quinta-feira"), start, None);
        assert!(occurrences_for(&unscheduled).is_empty());

        let garbled = ScheduleDescriptor::parse(Some("Someday"), start, end);
        assert!(occurrences_for(&garbled).is_empty());
    }

    #[test]
    fn calendar_date_ignores_time_of_day() {
        let expected = Some(date(2024, 1, 4));
        assert_eq!(parse_calendar_date("2024-01-04"), expected);
        assert_eq!(parse_calendar_date("2024-01-04T12:00:00"), expected);
        assert_eq!(parse_calendar_date("2024-01-04T00:00:00-03:00"), expected);
        assert_eq!(parse_calendar_date(" 2024-01-04 23:59 "), expected);
    }

    #[test]
    fn calendar_date_rejects_garbage() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("04/01/2024"), None);
        assert_eq!(parse_calendar_date("2024-02-30"), None);
        assert_eq!(parse_calendar_date("2024-01-04X"), None);
        assert_eq!(parse_calendar_date("não definida"), None);
    }

    #[test]
    fn week_index_is_one_based() {
        let dates = generate_occurrences(
            Some(Weekday::Thursday),
            Some(date(2024, 1, 1)),
            Some(date(2024, 1, 25)),
        );
        assert_eq!(week_index_of(date(2024, 1, 4), &dates), Some(1));
        assert_eq!(week_index_of(date(2024, 1, 25), &dates), Some(4));
        assert_eq!(week_index_of(date(2024, 1, 5), &dates), None);
    }

    #[test]
    fn brazilian_display_format() {
        assert_eq!(format_date_br(Some(date(2024, 1, 4))), "04/01/2024");
        assert_eq!(format_date_br(None), "Data não definida");
    }
}

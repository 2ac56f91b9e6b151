use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::models::{
    AttendanceRecord, AttendanceStatus, ClassRecord, ClassSummary, RosterEntry,
    StudentAttendance, WeeklyRecords,
};
use crate::recurrence::{self, parse_calendar_date};

pub const DEFAULT_MIN_PERCENT: u32 = 75;

/// Resolves a raw record onto the occurrence calendar. Keys that do not
/// parse or fall outside `occurrences` are skipped. When two keys land on
/// the same date, `Present` wins.
fn marks_on_calendar(
    record: &AttendanceRecord,
    occurrences: &BTreeSet<NaiveDate>,
) -> BTreeMap<NaiveDate, AttendanceStatus> {
    let mut marks = BTreeMap::new();
    for (key, status) in record {
        let Some(date) = parse_calendar_date(key) else {
            tracing::debug!(key = %key, "skipping malformed attendance key");
            continue;
        };
        if !occurrences.contains(&date) {
            tracing::debug!(%date, "skipping attendance outside the class calendar");
            continue;
        }
        marks
            .entry(date)
            .and_modify(|current| {
                if *status == AttendanceStatus::Present {
                    *current = AttendanceStatus::Present;
                }
            })
            .or_insert(*status);
    }
    marks
}

fn present_count(record: &AttendanceRecord, occurrences: &[NaiveDate]) -> usize {
    let calendar: BTreeSet<NaiveDate> = occurrences.iter().copied().collect();
    marks_on_calendar(record, &calendar)
        .values()
        .filter(|status| **status == AttendanceStatus::Present)
        .count()
}

fn rounded_percent(present: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (present as f64 / total as f64 * 100.0).round() as u32
}

/// Share of the class calendar a student attended, rounded to a whole
/// percent. A class without occurrences reports 0.
pub fn compute_student_attendance(record: &AttendanceRecord, occurrences: &[NaiveDate]) -> u32 {
    rounded_percent(present_count(record, occurrences), occurrences.len())
}

/// Attendance over the occurrences up to and including `as_of`.
pub fn rolling_student_attendance(
    record: &AttendanceRecord,
    occurrences: &[NaiveDate],
    as_of: NaiveDate,
) -> u32 {
    let elapsed: Vec<NaiveDate> = occurrences
        .iter()
        .copied()
        .filter(|date| *date <= as_of)
        .collect();
    compute_student_attendance(record, &elapsed)
}

/// Average presence across the weeks that were actually entered. Weeks
/// without an entry are left out of both sides of the ratio; an entered zero
/// counts. The result is not rounded.
pub fn compute_class_weekly_average(weekly: &WeeklyRecords, enrolled: usize) -> f64 {
    if enrolled == 0 {
        return 0.0;
    }

    let mut valid_weeks = 0u64;
    let mut present_total = 0u64;
    for (week, count) in weekly {
        if *week == 0 {
            tracing::debug!("skipping week index 0");
            continue;
        }
        let Some(count) = count else { continue };
        valid_weeks += 1;
        present_total += u64::from(*count);
    }

    if valid_weeks == 0 {
        return 0.0;
    }
    present_total as f64 / (valid_weeks * enrolled as u64) as f64 * 100.0
}

/// Presence of a single entered week, as shown in weekly listings. Capped
/// at 100 for weeks entered before the roster shrank.
pub fn week_percent(present: u32, enrolled: usize) -> f64 {
    if enrolled == 0 {
        return 0.0;
    }
    f64::from(present).min(enrolled as f64) / enrolled as f64 * 100.0
}

/// Collapses per-student marks into class-level weekly counts. A week is
/// entered as soon as any student has a mark for its date.
pub fn weekly_counts_from_roster(
    roster: &[RosterEntry],
    occurrences: &[NaiveDate],
) -> WeeklyRecords {
    let calendar: BTreeSet<NaiveDate> = occurrences.iter().copied().collect();
    let resolved: Vec<BTreeMap<NaiveDate, AttendanceStatus>> = roster
        .iter()
        .map(|entry| marks_on_calendar(&entry.record, &calendar))
        .collect();

    let mut weekly = WeeklyRecords::new();
    for date in occurrences {
        let Some(week) = recurrence::week_index_of(*date, occurrences) else {
            continue;
        };
        let mut entered = false;
        let mut present = 0u32;
        for marks in &resolved {
            if let Some(status) = marks.get(date) {
                entered = true;
                if *status == AttendanceStatus::Present {
                    present += 1;
                }
            }
        }
        weekly.insert(week, entered.then_some(present));
    }
    weekly
}

/// Stored weekly counts when any were entered by hand, otherwise counts
/// derived from the per-student marks.
pub fn effective_weekly_records(
    stored: &WeeklyRecords,
    roster: &[RosterEntry],
    occurrences: &[NaiveDate],
) -> WeeklyRecords {
    if stored.values().any(Option::is_some) {
        stored.clone()
    } else {
        weekly_counts_from_roster(roster, occurrences)
    }
}

/// Per-student and class-level figures for one class. With `as_of`, each
/// student also gets attendance over the classes held up to that date.
pub fn summarize_class(
    class: &ClassRecord,
    roster: &[RosterEntry],
    stored_weekly: &WeeklyRecords,
    min_percent: u32,
    as_of: Option<NaiveDate>,
) -> ClassSummary {
    let occurrences = recurrence::occurrences_for(&class.schedule);
    let total = occurrences.len();

    let mut students: Vec<StudentAttendance> = roster
        .iter()
        .map(|entry| {
            let record = &entry.record;
            let present = present_count(record, &occurrences);
            let percent = rounded_percent(present, total);
            let rolling = |day| rolling_student_attendance(record, &occurrences, day);
            StudentAttendance {
                full_name: entry.full_name.clone(),
                email: entry.email.clone(),
                present,
                total,
                percent,
                below_threshold: total > 0 && percent < min_percent,
                to_date_percent: as_of.map(rolling),
            }
        })
        .collect();
    students.sort_by(|a, b| {
        a.percent
            .cmp(&b.percent)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });

    let average_percent = if students.is_empty() {
        0.0
    } else {
        students.iter().map(|s| f64::from(s.percent)).sum::<f64>() / students.len() as f64
    };

    let weekly = effective_weekly_records(stored_weekly, roster, &occurrences);
    let weekly_average = compute_class_weekly_average(&weekly, roster.len());

    ClassSummary {
        class_code: class.code.clone(),
        class_name: class.name.clone(),
        schedule: class.schedule,
        occurrences,
        enrolled: roster.len(),
        average_percent,
        weekly,
        weekly_average,
        students,
    }
}

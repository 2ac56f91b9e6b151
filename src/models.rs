use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseStatusError, ParseWeekdayError};
use crate::recurrence;

/// Day a class meets on, numbered Sunday=0 through Saturday=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            Weekday::Sunday => "Domingo",
            Weekday::Monday => "Segunda-feira",
            Weekday::Tuesday => "Terça-feira",
            Weekday::Wednesday => "Quarta-feira",
            Weekday::Thursday => "Quinta-feira",
            Weekday::Friday => "Sexta-feira",
            Weekday::Saturday => "Sábado",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Sun => Weekday::Sunday,
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Weekday {
    type Err = ParseWeekdayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                'á' | 'à' | 'â' | 'ã' => 'a',
                'é' | 'ê' => 'e',
                'ç' => 'c',
                _ => c,
            })
            .collect();
        let stem = folded
            .strip_suffix("-feira")
            .or_else(|| folded.strip_suffix(" feira"))
            .unwrap_or(&folded);

        match stem {
            "domingo" => Ok(Weekday::Sunday),
            "segunda" => Ok(Weekday::Monday),
            "terca" => Ok(Weekday::Tuesday),
            "quarta" => Ok(Weekday::Wednesday),
            "quinta" => Ok(Weekday::Thursday),
            "sexta" => Ok(Weekday::Friday),
            "sabado" => Ok(Weekday::Saturday),
            _ => Err(ParseWeekdayError(s.to_string())),
        }
    }
}

/// When a weekly class meets. Any part may be missing while the class is
/// still being set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScheduleDescriptor {
    pub weekday: Option<Weekday>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ScheduleDescriptor {
    /// Builds a descriptor from stored strings. Unparseable parts become `None`.
    pub fn parse(
        weekday: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Self {
        Self {
            weekday: weekday.and_then(|w| w.parse().ok()),
            start_date: start_date.and_then(recurrence::parse_calendar_date),
            end_date: end_date.and_then(recurrence::parse_calendar_date),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "presente" | "p" => Ok(AttendanceStatus::Present),
            "absent" | "ausente" | "f" => Ok(AttendanceStatus::Absent),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// Sparse per-student marks keyed by the date string exactly as stored.
/// Keys are not guaranteed to be well formed.
pub type AttendanceRecord = BTreeMap<String, AttendanceStatus>;

/// Class-level present counts per 1-based week. `Some(0)` is an entered
/// zero; `None` and a missing key both mean the week was never entered.
pub type WeeklyRecords = BTreeMap<u32, Option<u32>>;

#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub schedule: ScheduleDescriptor,
}

#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub full_name: String,
    pub email: String,
    pub record: AttendanceRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentAttendance {
    pub full_name: String,
    pub email: String,
    pub present: usize,
    pub total: usize,
    pub percent: u32,
    pub below_threshold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_date_percent: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub class_code: String,
    pub class_name: String,
    pub schedule: ScheduleDescriptor,
    pub occurrences: Vec<NaiveDate>,
    pub enrolled: usize,
    pub average_percent: f64,
    pub weekly: WeeklyRecords,
    pub weekly_average: f64,
    pub students: Vec<StudentAttendance>,
}

#[cfg(test)]
mod tests {
    use super::AttendanceStatus::{Absent, Present};
    use super::*;

    #[test]
    fn weekday_accepts_portuguese_spellings() {
        assert_eq!("Quinta-feira".parse::<Weekday>(), Ok(Weekday::Thursday));
        assert_eq!("quinta".parse::<Weekday>(), Ok(Weekday::Thursday));
        assert_eq!("TERÇA-FEIRA".parse::<Weekday>(), Ok(Weekday::Tuesday));
        assert_eq!("Terca feira".parse::<Weekday>(), Ok(Weekday::Tuesday));
        assert_eq!("Sábado".parse::<Weekday>(), Ok(Weekday::Saturday));
        assert_eq!("sabado".parse::<Weekday>(), Ok(Weekday::Saturday));
        assert_eq!(" Domingo ".parse::<Weekday>(), Ok(Weekday::Sunday));
    }

    #[test]
    fn weekday_rejects_unknown_names() {
        assert!("Thursday".parse::<Weekday>().is_err());
        assert!("".parse::<Weekday>().is_err());
        assert!("feira".parse::<Weekday>().is_err());
    }

    #[test]
    fn weekday_indexes_from_sunday() {
        assert_eq!(Weekday::Sunday.index(), 0);
        assert_eq!(Weekday::Saturday.index(), 6);
        assert_eq!(Weekday::ALL[4], Weekday::Thursday);
        assert_eq!(Weekday::from(chrono::Weekday::Wed), Weekday::Wednesday);
    }

    #[test]
    fn status_parses_markers() {
        assert_eq!("present".parse::<AttendanceStatus>(), Ok(Present));
        assert_eq!("Ausente".parse::<AttendanceStatus>(), Ok(Absent));
        assert_eq!("F".parse::<AttendanceStatus>(), Ok(Absent));
        assert!("late".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn schedule_parse_drops_unparseable_parts() {
        let schedule = ScheduleDescriptor::parse(
            Some("Quinta-feira"),
            Some("2024-01-01"),
            Some("soon"),
        );
        assert_eq!(schedule.weekday, Some(Weekday::Thursday));
        assert_eq!(schedule.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(schedule.end_date, None);

        let empty = ScheduleDescriptor::parse(None, None, None);
        assert_eq!(empty, ScheduleDescriptor::default());
    }
}

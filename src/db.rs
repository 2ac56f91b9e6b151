use std::collections::HashMap;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AttendanceRecord, AttendanceStatus, ClassRecord, RosterEntry, ScheduleDescriptor, Weekday,
    WeeklyRecords,
};
use crate::recurrence::parse_calendar_date;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let lab = upsert_class(
        pool,
        "LAB-QUI-2024",
        "Laboratório de Química",
        &ScheduleDescriptor {
            weekday: Some(Weekday::Thursday),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 25),
        },
    )
    .await?;
    upsert_class(
        pool,
        "ROB-SAB-2024",
        "Robótica aos Sábados",
        &ScheduleDescriptor {
            weekday: Some(Weekday::Saturday),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            end_date: None,
        },
    )
    .await?;

    let students = vec![
        ("Ana Souza", "ana.souza@escola.example"),
        ("Bruno Lima", "bruno.lima@escola.example"),
        ("Carla Mendes", "carla.mendes@escola.example"),
    ];
    for (name, email) in &students {
        upsert_student(pool, lab, name, email).await?;
    }

    let marks = vec![
        ("ana.souza", "2024-01-04", AttendanceStatus::Present),
        ("ana.souza", "2024-01-11", AttendanceStatus::Present),
        ("ana.souza", "2024-01-18", AttendanceStatus::Absent),
        ("bruno.lima", "2024-01-04", AttendanceStatus::Present),
        ("bruno.lima", "2024-01-11", AttendanceStatus::Absent),
        ("carla.mendes", "2024-01-04", AttendanceStatus::Present),
        ("carla.mendes", "2024-01-11", AttendanceStatus::Present),
        ("carla.mendes", "2024-01-18", AttendanceStatus::Present),
    ];
    for (user, key, status) in marks {
        let date = parse_calendar_date(key).context("invalid seed date")?;
        let email = format!("{user}@escola.example");
        set_mark(pool, lab, &email, date, status).await?;
    }

    Ok(())
}

/// Creates the class or reschedules it in place.
pub async fn upsert_class(
    pool: &PgPool,
    code: &str,
    name: &str,
    schedule: &ScheduleDescriptor,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO class_attendance.classes (id, code, name, weekday, start_date, end_date)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (code) DO UPDATE
        SET name = EXCLUDED.name,
            weekday = EXCLUDED.weekday,
            start_date = EXCLUDED.start_date,
            end_date = EXCLUDED.end_date,
            updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(code)
    .bind(name)
    .bind(schedule.weekday.map(Weekday::label))
    .bind(schedule.start_date)
    .bind(schedule.end_date)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn upsert_student(
    pool: &PgPool,
    class_id: Uuid,
    full_name: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO class_attendance.students (id, class_id, full_name, email)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (class_id, email) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(class_id)
    .bind(full_name)
    .bind(email)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn fetch_class(pool: &PgPool, code: &str) -> anyhow::Result<ClassRecord> {
    let row = sqlx::query(
        "SELECT id, code, name, weekday, start_date, end_date \
         FROM class_attendance.classes WHERE code = $1",
    )
    .bind(code)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("class {code} not found"))?;

    let weekday: Option<String> = row.get("weekday");
    let schedule = schedule_from_columns(
        weekday.as_deref(),
        row.get("start_date"),
        row.get("end_date"),
    );
    if weekday.is_some() && schedule.weekday.is_none() {
        tracing::warn!(class = code, weekday = ?weekday, "stored weekday not recognised");
    }

    Ok(ClassRecord {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        schedule,
    })
}

/// Builds a schedule from the `classes` columns. The weekday is stored as its
/// label; an unrecognised label leaves the weekday undefined.
fn schedule_from_columns(
    weekday: Option<&str>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> ScheduleDescriptor {
    ScheduleDescriptor {
        weekday: weekday.and_then(|w| w.parse().ok()),
        start_date,
        end_date,
    }
}

/// Students of a class with every stored mark. Marks whose status cannot be
/// read are dropped; their date keys are passed through untouched.
pub async fn fetch_roster(pool: &PgPool, class_id: Uuid) -> anyhow::Result<Vec<RosterEntry>> {
    let rows = sqlx::query(
        "SELECT s.id, s.full_name, s.email, m.class_date, m.status \
         FROM class_attendance.students s \
         LEFT JOIN class_attendance.attendance_marks m ON m.student_id = s.id \
         WHERE s.class_id = $1 \
         ORDER BY s.full_name, s.id",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    let mut roster: Vec<RosterEntry> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for row in rows {
        let student_id: Uuid = row.get("id");
        let idx = *positions.entry(student_id).or_insert_with(|| {
            roster.push(RosterEntry {
                full_name: row.get("full_name"),
                email: row.get("email"),
                record: AttendanceRecord::new(),
            });
            roster.len() - 1
        });

        let class_date: Option<String> = row.get("class_date");
        let status: Option<String> = row.get("status");
        let (Some(class_date), Some(status)) = (class_date, status) else {
            continue;
        };
        match status.parse::<AttendanceStatus>() {
            Ok(status) => {
                roster[idx].record.insert(class_date, status);
            }
            Err(err) => {
                tracing::warn!(%student_id, %class_date, error = %err, "dropping stored mark");
            }
        }
    }

    Ok(roster)
}

pub async fn fetch_weekly_records(pool: &PgPool, class_id: Uuid) -> anyhow::Result<WeeklyRecords> {
    let rows = sqlx::query(
        "SELECT week_index, present_count FROM class_attendance.weekly_presence \
         WHERE class_id = $1 ORDER BY week_index",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    let mut weekly = WeeklyRecords::new();
    for row in rows {
        let week_index: i32 = row.get("week_index");
        let present_count: Option<i32> = row.get("present_count");
        let Ok(week) = u32::try_from(week_index) else {
            tracing::warn!(week_index, "dropping stored week with negative index");
            continue;
        };
        let count = match present_count.map(u32::try_from) {
            None => None,
            Some(Ok(count)) => Some(count),
            Some(Err(_)) => {
                tracing::warn!(week, ?present_count, "dropping negative weekly count");
                continue;
            }
        };
        weekly.insert(week, count);
    }

    Ok(weekly)
}

pub async fn set_mark(
    pool: &PgPool,
    class_id: Uuid,
    email: &str,
    date: NaiveDate,
    status: AttendanceStatus,
) -> anyhow::Result<()> {
    let student_id: Uuid = sqlx::query(
        "SELECT id FROM class_attendance.students WHERE class_id = $1 AND email = $2",
    )
    .bind(class_id)
    .bind(email)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("student {email} is not on this roster"))?
    .get("id");

    sqlx::query(
        r#"
        INSERT INTO class_attendance.attendance_marks (student_id, class_date, status)
        VALUES ($1, $2, $3)
        ON CONFLICT (student_id, class_date) DO UPDATE
        SET status = EXCLUDED.status, updated_at = now()
        "#,
    )
    .bind(student_id)
    .bind(date.to_string())
    .bind(status.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Stores the present count for a week. `None` clears the week back to
/// "not entered".
pub async fn set_weekly_count(
    pool: &PgPool,
    class_id: Uuid,
    week: u32,
    present: Option<u32>,
) -> anyhow::Result<()> {
    if week == 0 {
        bail!("week index starts at 1");
    }
    let week = i32::try_from(week).context("week index out of range")?;
    let present = present
        .map(i32::try_from)
        .transpose()
        .context("present count out of range")?;

    sqlx::query(
        r#"
        INSERT INTO class_attendance.weekly_presence (class_id, week_index, present_count)
        VALUES ($1, $2, $3)
        ON CONFLICT (class_id, week_index) DO UPDATE
        SET present_count = EXCLUDED.present_count, updated_at = now()
        "#,
    )
    .bind(class_id)
    .bind(week)
    .bind(present)
    .execute(pool)
    .await?;

    Ok(())
}

/// Imports per-student marks. Students are added to the class roster as
/// they appear; the class itself must already exist.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        class_code: String,
        full_name: String,
        email: String,
        class_date: String,
        status: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut classes: HashMap<String, Uuid> = HashMap::new();
    let mut imported = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let row_no = line + 2;
        let date = parse_calendar_date(&row.class_date)
            .with_context(|| format!("row {row_no}: bad date {:?}", row.class_date))?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .with_context(|| format!("row {row_no}: invalid status"))?;

        let class_id = match classes.get(&row.class_code) {
            Some(id) => *id,
            None => {
                let id = fetch_class(pool, &row.class_code).await?.id;
                classes.insert(row.class_code.clone(), id);
                id
            }
        };

        upsert_student(pool, class_id, &row.full_name, &row.email).await?;
        set_mark(pool, class_id, &row.email, date, status).await?;
        imported += 1;
    }

    tracing::info!(imported, path = %csv_path.display(), "csv import finished");
    Ok(imported)
}

use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod attendance;
mod config;
mod db;
mod error;
mod models;
mod recurrence;
mod report;

use config::Config;
use models::{AttendanceStatus, ScheduleDescriptor, Weekday};

#[derive(Parser)]
#[command(name = "class-attendance")]
#[command(about = "Weekly class calendars and attendance percentages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample classes, students and marks
    Seed,
    /// Import per-student marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Create a class or change its schedule
    Class {
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        /// Portuguese day name, e.g. "Quinta-feira"
        #[arg(long)]
        weekday: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List the dates a weekly class meets on (no database needed)
    Schedule {
        #[arg(long)]
        weekday: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Attendance percentages for a class roster
    Frequency {
        #[arg(long)]
        class: String,
        #[arg(long)]
        threshold: Option<u32>,
        /// Also show attendance over the classes held up to this date
        #[arg(long)]
        as_of: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Record one student's status for a class date
    Mark {
        #[arg(long)]
        class: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        status: String,
    },
    /// Record the present count for a week; omit --present to clear it
    Week {
        #[arg(long)]
        class: String,
        #[arg(long)]
        week: u32,
        #[arg(long)]
        present: Option<u32>,
    },
    /// Generate a markdown frequency report
    Report {
        #[arg(long)]
        class: String,
        #[arg(long)]
        threshold: Option<u32>,
        #[arg(long, default_value = "frequencia.md")]
        out: PathBuf,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "class_attendance=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")?;
    tracing::debug!("database pool ready");
    Ok(pool)
}

fn parse_date_arg(flag: &str, raw: &str) -> anyhow::Result<NaiveDate> {
    recurrence::parse_calendar_date(raw)
        .with_context(|| format!("--{flag} must be YYYY-MM-DD, got {raw:?}"))
}

fn parse_optional_date(flag: &str, raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
    raw.map(|s| parse_date_arg(flag, s)).transpose()
}

fn threshold_or_default(threshold: Option<u32>, config: &Config) -> anyhow::Result<u32> {
    let value = threshold.unwrap_or(config.min_percent);
    anyhow::ensure!(value <= 100, "--threshold must be between 0 and 100");
    Ok(value)
}

async fn load_summary(
    pool: &PgPool,
    code: &str,
    min_percent: u32,
    as_of: Option<NaiveDate>,
) -> anyhow::Result<models::ClassSummary> {
    let class = db::fetch_class(pool, code).await?;
    let roster = db::fetch_roster(pool, class.id).await?;
    let weekly = db::fetch_weekly_records(pool, class.id).await?;
    tracing::info!(class = code, students = roster.len(), "loaded roster");
    let summary = attendance::summarize_class(&class, &roster, &weekly, min_percent, as_of);
    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect(&config).await?;
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} marks from {}.", csv.display());
        }
        Commands::Class {
            code,
            name,
            weekday,
            start,
            end,
        } => {
            let weekday: Weekday = weekday.parse().with_context(|| {
                let names: Vec<&str> = Weekday::ALL.iter().map(|w| w.label()).collect();
                format!("expected one of: {}", names.join(", "))
            })?;
            let schedule = ScheduleDescriptor {
                weekday: Some(weekday),
                start_date: parse_optional_date("start", start.as_deref())?,
                end_date: parse_optional_date("end", end.as_deref())?,
            };
            let pool = connect(&config).await?;
            db::upsert_class(&pool, &code, &name, &schedule).await?;
            let count = recurrence::occurrences_for(&schedule).len();
            println!("Class {code} saved with {count} scheduled dates.");
        }
        Commands::Schedule {
            weekday,
            start,
            end,
            json,
        } => {
            let schedule =
                ScheduleDescriptor::parse(weekday.as_deref(), start.as_deref(), end.as_deref());
            if weekday.is_some() && schedule.weekday.is_none() {
                tracing::warn!(weekday = ?weekday, "weekday not recognised");
            }
            let dates = recurrence::occurrences_for(&schedule);

            if json {
                println!("{}", serde_json::to_string_pretty(&dates)?);
            } else if dates.is_empty() {
                println!(
                    "No class dates (end: {}).",
                    recurrence::format_date_br(schedule.end_date)
                );
            } else {
                for (idx, date) in dates.iter().enumerate() {
                    println!("{:>3}. {}", idx + 1, date);
                }
            }
        }
        Commands::Frequency {
            class,
            threshold,
            as_of,
            json,
        } => {
            let min_percent = threshold_or_default(threshold, &config)?;
            let as_of = parse_optional_date("as-of", as_of.as_deref())?;
            let pool = connect(&config).await?;
            let summary = load_summary(&pool, &class, min_percent, as_of).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            println!(
                "{} ({}): {} dates, {} students, average {:.1}%, weekly {:.1}%",
                summary.class_name,
                summary.class_code,
                summary.occurrences.len(),
                summary.enrolled,
                summary.average_percent,
                summary.weekly_average
            );

            for student in &summary.students {
                let flag = if student.below_threshold { " !" } else { "" };
                match student.to_date_percent {
                    Some(to_date) => println!(
                        "- {} ({}) {}/{} = {}% (to date {}%){}",
                        student.full_name,
                        student.email,
                        student.present,
                        student.total,
                        student.percent,
                        to_date,
                        flag
                    ),
                    None => println!(
                        "- {} ({}) {}/{} = {}%{}",
                        student.full_name,
                        student.email,
                        student.present,
                        student.total,
                        student.percent,
                        flag
                    ),
                }
            }
        }
        Commands::Mark {
            class,
            email,
            date,
            status,
        } => {
            let date = parse_date_arg("date", &date)?;
            let status: AttendanceStatus = status.parse()?;
            let pool = connect(&config).await?;
            let class_record = db::fetch_class(&pool, &class).await?;
            let occurrences = recurrence::occurrences_for(&class_record.schedule);
            if recurrence::week_index_of(date, &occurrences).is_none() {
                tracing::warn!(
                    class = %class,
                    %date,
                    "date is not on the class calendar and will not count"
                );
            }
            db::set_mark(&pool, class_record.id, &email, date, status).await?;
            println!("Marked {email} {} on {date}.", status.as_str());
        }
        Commands::Week {
            class,
            week,
            present,
        } => {
            let pool = connect(&config).await?;
            let class_record = db::fetch_class(&pool, &class).await?;
            db::set_weekly_count(&pool, class_record.id, week, present).await?;
            match present {
                Some(count) => println!("Week {week}: {count} present."),
                None => println!("Week {week} cleared."),
            }
        }
        Commands::Report {
            class,
            threshold,
            out,
        } => {
            let min_percent = threshold_or_default(threshold, &config)?;
            let pool = connect(&config).await?;
            let summary = load_summary(&pool, &class, min_percent, None).await?;
            let report = report::build_report(&summary, min_percent);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

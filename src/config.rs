use anyhow::{bail, Context};

use crate::attendance::DEFAULT_MIN_PERCENT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub min_percent: u32,
}

impl Config {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let min_percent = match lookup("ATTENDANCE_MIN_PERCENT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid ATTENDANCE_MIN_PERCENT {raw:?}"))?,
            None => DEFAULT_MIN_PERCENT,
        };
        if min_percent > 100 {
            bail!("ATTENDANCE_MIN_PERCENT above 100: {min_percent}");
        }

        Ok(Self {
            database_url,
            min_percent,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use cron::Schedule;

use crate::error::EngineError;
use crate::history::HISTORY_TIME_FORMAT;

/// Timezone used for schedule evaluation and history timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleZone {
    Named(Tz),
    Local,
}

impl ScheduleZone {
    pub fn parse(name: Option<&str>) -> Result<Self, EngineError> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(Self::Local),
            Some(raw) => raw
                .parse::<Tz>()
                .map(Self::Named)
                .map_err(|_| EngineError::Timezone(raw.to_string())),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Named(tz) => tz.name().to_string(),
            Self::Local => "local".to_string(),
        }
    }

    pub fn history_timestamp(&self) -> String {
        match self {
            Self::Named(tz) => Utc::now().with_timezone(tz).format(HISTORY_TIME_FORMAT).to_string(),
            Self::Local => Local::now().format(HISTORY_TIME_FORMAT).to_string(),
        }
    }

    pub fn next_fire(&self, schedule: &Schedule) -> Option<DateTime<Utc>> {
        match self {
            Self::Named(tz) => schedule.upcoming(*tz).next().map(|t| t.with_timezone(&Utc)),
            Self::Local => schedule.upcoming(Local).next().map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Parses a cron expression. Five-field expressions get a leading seconds
/// field; "@daily" style descriptors pass through.
pub fn parse_schedule(expr: &str) -> Result<Schedule, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty schedule".to_string());
    }
    let normalized = if !expr.starts_with('@') && expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| e.to_string())
}

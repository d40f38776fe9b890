use crate::calendar::Recurrence;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Calendar {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub calendar_id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub title: String,
    pub details: String,
    pub color: String,
    pub is_all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_value: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn recurrence(&self) -> Option<Recurrence> {
        let kind = self.repetition_type.as_deref()?;
        Recurrence::from_parts(
            kind,
            self.repetition_subtype.as_deref(),
            self.repetition_value?,
        )
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence().is_some()
    }

    /// Placement date; for recurring tasks this is the first day the rule applies.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// Editable fields of a task, as submitted by the task form.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub date: NaiveDate,
    pub title: String,
    pub details: String,
    pub color: String,
    pub is_all_day: bool,
    pub due_time: Option<String>,
    pub recurrence: Option<Recurrence>,
}

impl NewTask {
    pub fn new(date: NaiveDate, title: &str) -> Self {
        Self {
            date,
            title: title.to_string(),
            details: String::new(),
            color: DEFAULT_TASK_COLOR.to_string(),
            is_all_day: true,
            due_time: None,
            recurrence: None,
        }
    }
}

pub const DEFAULT_TASK_COLOR: &str = "#000000";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub default_calendar: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

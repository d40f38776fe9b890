use crate::calendar::Recurrence;
use crate::db::models::{NewTask, DEFAULT_TASK_COLOR};
use crate::error::CalendarError;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// API error response
#[derive(Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Status code for a domain error
pub fn status_for(err: &CalendarError) -> StatusCode {
    match err {
        CalendarError::TaskNotFound(_) | CalendarError::CalendarNotFound(_) => StatusCode::NOT_FOUND,
        CalendarError::InvalidInput(_) | CalendarError::ActionNotAllowed(_) => StatusCode::BAD_REQUEST,
        CalendarError::Unauthorized => StatusCode::UNAUTHORIZED,
        CalendarError::Forbidden(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error for the DELETE/PUT endpoints
pub fn json_error(err: &CalendarError) -> Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        crate::log_error!(err, "json request");
    }
    (
        status,
        Json(ApiError {
            code: err.to_error_code().to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// HTML error page for the form and view endpoints
pub fn html_error(err: &CalendarError) -> Response {
    let status = status_for(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        crate::log_error!(err, "html request");
    }
    (status, Html(super::views::error_page(status, &err.to_string()))).into_response()
}

/// Query parameters for the login page
#[derive(Deserialize, Default)]
pub struct LoginQuery {
    #[serde(default)]
    pub error: Option<String>,
}

/// Login form
#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Query parameters for the month view
#[derive(Deserialize, Default)]
pub struct MonthQuery {
    pub y: Option<i32>,
    pub m: Option<u32>,
    pub view_past_tasks: Option<String>,
}

/// Query parameters for the new-task form
#[derive(Deserialize, Default)]
pub struct NewTaskQuery {
    pub day: Option<u32>,
}

/// Query parameters for the user edit page
#[derive(Deserialize, Default)]
pub struct UserEditQuery {
    pub updated: Option<String>,
}

/// User edit form
#[derive(Deserialize)]
pub struct UserEditForm {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirmation: String,
}

/// JSON body for moving a task
#[derive(Deserialize)]
pub struct MoveTaskRequest {
    #[serde(rename = "newDay", alias = "new_day")]
    pub new_day: u32,
}

/// Task create/update form
#[derive(Deserialize, Default, Debug)]
pub struct TaskForm {
    pub date: Option<String>,
    pub title: Option<String>,
    pub details: Option<String>,
    pub color: Option<String>,
    pub is_all_day: Option<String>,
    pub due_time: Option<String>,
    pub repeats: Option<String>,
    pub repetition_type: Option<String>,
    pub repetition_subtype: Option<String>,
    pub repetition_value: Option<String>,
}

impl TaskForm {
    pub fn into_new_task(self) -> Result<NewTask, CalendarError> {
        let raw_date = self
            .date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| CalendarError::InvalidInput("date is required".to_string()))?;
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|_| CalendarError::InvalidInput(format!("invalid date '{}'", raw_date)))?;

        let recurrence = if is_checked(self.repeats.as_deref()) {
            Some(self.recurrence()?)
        } else {
            None
        };

        Ok(NewTask {
            date,
            title: self.title.unwrap_or_default(),
            details: self.details.unwrap_or_default(),
            color: self
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TASK_COLOR.to_string()),
            is_all_day: is_checked(self.is_all_day.as_deref()),
            due_time: self.due_time,
            recurrence,
        })
    }

    fn recurrence(&self) -> Result<Recurrence, CalendarError> {
        let kind = self.repetition_type.as_deref().unwrap_or_default();
        let value: i64 = self
            .repetition_value
            .as_deref()
            .unwrap_or_default()
            .trim()
            .parse()
            .map_err(|_| CalendarError::InvalidInput("repetition value must be a number".to_string()))?;

        Recurrence::from_parts(kind, self.repetition_subtype.as_deref(), value).ok_or_else(|| {
            CalendarError::InvalidInput(format!(
                "invalid repetition: type '{}', subtype '{}', value {}",
                kind,
                self.repetition_subtype.as_deref().unwrap_or_default(),
                value
            ))
        })
    }
}

/// HTML checkbox and hidden-flag values
pub fn is_checked(value: Option<&str>) -> bool {
    matches!(
        value.map(str::trim),
        Some("1") | Some("on") | Some("true") | Some("yes")
    )
}

/// Body of a move request: `{"newDay": 5}`, `newDay=5` or a bare `5`.
pub fn parse_new_day(body: &[u8]) -> Option<u32> {
    if let Ok(request) = serde_json::from_slice::<MoveTaskRequest>(body) {
        return Some(request.new_day);
    }

    let text = std::str::from_utf8(body).ok()?.trim();
    let value = text
        .strip_prefix("newDay=")
        .or_else(|| text.strip_prefix("new_day="))
        .unwrap_or(text);
    value.trim().trim_matches('"').parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn form(date: &str, title: &str) -> TaskForm {
        TaskForm {
            date: Some(date.to_string()),
            title: Some(title.to_string()),
            ..TaskForm::default()
        }
    }

    #[test]
    fn test_form_into_new_task_defaults() {
        let mut f = form("2026-10-16", "Dentist");
        f.is_all_day = Some("1".into());

        let task = f.into_new_task().unwrap();
        assert_eq!(task.date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(task.color, DEFAULT_TASK_COLOR);
        assert!(task.is_all_day);
        assert!(task.recurrence.is_none());
    }

    #[test]
    fn test_form_requires_valid_date() {
        assert!(form("", "x").into_new_task().is_err());
        assert!(form("2026-02-30", "x").into_new_task().is_err());
    }

    #[test]
    fn test_form_with_repetition() {
        let mut f = form("2026-10-16", "Standup");
        f.repeats = Some("1".into());
        f.repetition_type = Some("w".into());
        f.repetition_subtype = Some("w".into());
        f.repetition_value = Some("4".into());

        let task = f.into_new_task().unwrap();
        assert_eq!(
            task.recurrence,
            Some(Recurrence::Weekly {
                weekday: Weekday::Fri
            })
        );
    }

    #[test]
    fn test_form_with_bad_repetition() {
        let mut f = form("2026-10-16", "Standup");
        f.repeats = Some("on".into());
        f.repetition_type = Some("m".into());
        f.repetition_subtype = Some("m".into());
        f.repetition_value = Some("40".into());
        assert!(f.into_new_task().is_err());
    }

    #[test]
    fn test_parse_new_day() {
        assert_eq!(parse_new_day(br#"{"newDay": 12}"#), Some(12));
        assert_eq!(parse_new_day(b"newDay=7"), Some(7));
        assert_eq!(parse_new_day(b" 3 "), Some(3));
        assert_eq!(parse_new_day(b"\"9\""), Some(9));
        assert_eq!(parse_new_day(b"soon"), None);
    }

    #[test]
    fn test_status_for() {
        assert_eq!(status_for(&CalendarError::TaskNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&CalendarError::ActionNotAllowed("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CalendarError::Forbidden("x".into())),
            StatusCode::FORBIDDEN
        );
    }
}

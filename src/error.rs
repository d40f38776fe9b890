use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Login required")]
    Unauthorized,

    #[error("Access to calendar '{0}' denied")]
    Forbidden(String),

    #[error("Action not allowed: {0}")]
    ActionNotAllowed(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl CalendarError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            CalendarError::TaskNotFound(_) => "TASK_NOT_FOUND",
            CalendarError::CalendarNotFound(_) => "CALENDAR_NOT_FOUND",
            CalendarError::DatabaseError(_) => "DATABASE_ERROR",
            CalendarError::InvalidInput(_) => "INVALID_INPUT",
            CalendarError::Unauthorized => "UNAUTHORIZED",
            CalendarError::Forbidden(_) => "FORBIDDEN",
            CalendarError::ActionNotAllowed(_) => "ACTION_NOT_ALLOWED",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CalendarError>;

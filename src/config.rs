use crate::error::{CalendarError, Result};
use chrono::{Locale, Weekday};
use std::path::PathBuf;
use std::str::FromStr;

const ENV_PREFIX: &str = "TASKCAL_";
const DB_FILE: &str = "taskcal.db";
const CHAT_FILE: &str = "chat.json";

/// Application configuration.
///
/// Every field has a default and can be overridden by a `TASKCAL_*`
/// environment variable (see [`AppConfig::from_env`]).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub static_dir: PathBuf,
    pub locale: Option<String>,
    pub min_year: i32,
    pub max_year: i32,
    /// 0 = Monday .. 6 = Sunday
    pub week_starting_day: u8,
    pub hide_past_tasks: bool,
    /// PBKDF2 rounds for newly stored passwords
    pub password_iterations: u32,
    pub cookie_https_only: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            data_dir: PathBuf::from("data"),
            static_dir: PathBuf::from("static"),
            locale: None,
            min_year: 2000,
            max_year: 2100,
            week_starting_day: 0,
            hide_past_tasks: false,
            password_iterations: crate::users::DEFAULT_PBKDF2_ITERATIONS,
            cookie_https_only: false,
        }
    }
}

impl AppConfig {
    /// Build configuration from defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(host) = env_var("HOST") {
            config.host = host;
        }
        if let Some(port) = parse_env("PORT")? {
            config.port = port;
        }
        if let Some(dir) = env_var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("STATIC_DIR") {
            config.static_dir = PathBuf::from(dir);
        }
        config.locale = env_var("LOCALE");
        if let Some(year) = parse_env("MIN_YEAR")? {
            config.min_year = year;
        }
        if let Some(year) = parse_env("MAX_YEAR")? {
            config.max_year = year;
        }
        if let Some(day) = parse_env::<u8>("WEEK_STARTING_DAY")? {
            if day > 6 {
                return Err(CalendarError::InvalidInput(format!(
                    "{}WEEK_STARTING_DAY must be between 0 and 6, got {}",
                    ENV_PREFIX, day
                )));
            }
            config.week_starting_day = day;
        }
        if let Some(hide) = parse_env("HIDE_PAST_TASKS")? {
            config.hide_past_tasks = hide;
        }
        if let Some(iterations) = parse_env::<u32>("PASSWORD_ITERATIONS")? {
            if iterations == 0 {
                return Err(CalendarError::InvalidInput(format!(
                    "{}PASSWORD_ITERATIONS must be at least 1",
                    ENV_PREFIX
                )));
            }
            config.password_iterations = iterations;
        }
        if let Some(https_only) = parse_env("COOKIE_HTTPS_ONLY")? {
            config.cookie_https_only = https_only;
        }

        if config.min_year > config.max_year {
            return Err(CalendarError::InvalidInput(format!(
                "min_year ({}) is greater than max_year ({})",
                config.min_year, config.max_year
            )));
        }

        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE)
    }

    pub fn chat_path(&self) -> PathBuf {
        self.data_dir.join(CHAT_FILE)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn week_start(&self) -> Weekday {
        crate::calendar::weekday_from_index(self.week_starting_day)
    }

    /// Resolve the configured locale for month and weekday names.
    ///
    /// An unknown locale is not fatal: a warning is logged and `en_US` is used.
    pub fn resolve_locale(&self) -> Locale {
        let Some(name) = self.locale.as_deref() else {
            return Locale::en_US;
        };

        // Accept both "es_ES" and "es_ES.UTF-8"
        let base = name.split('.').next().unwrap_or(name);
        match Locale::try_from(base) {
            Ok(locale) => locale,
            Err(_) => {
                tracing::warn!("Unsupported locale setting ({})", name);
                Locale::en_US
            },
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    let Some(raw) = env_var(name) else {
        return Ok(None);
    };

    raw.trim().parse::<T>().map(Some).map_err(|_| {
        CalendarError::InvalidInput(format!(
            "Invalid value for {}{}: '{}'",
            ENV_PREFIX, name, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "HOST",
            "PORT",
            "DATA_DIR",
            "STATIC_DIR",
            "LOCALE",
            "MIN_YEAR",
            "MAX_YEAR",
            "WEEK_STARTING_DAY",
            "HIDE_PAST_TASKS",
            "PASSWORD_ITERATIONS",
            "COOKIE_HTTPS_ONLY",
        ] {
            std::env::remove_var(format!("{}{}", ENV_PREFIX, name));
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.chat_path(), PathBuf::from("data").join("chat.json"));
        assert_eq!(config.week_start(), Weekday::Mon);
        assert!(!config.hide_past_tasks);
        assert_eq!(config.password_iterations, crate::users::DEFAULT_PBKDF2_ITERATIONS);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("TASKCAL_PORT", "8080");
        std::env::set_var("TASKCAL_DATA_DIR", "/tmp/cal");
        std::env::set_var("TASKCAL_WEEK_STARTING_DAY", "6");
        std::env::set_var("TASKCAL_HIDE_PAST_TASKS", "true");

        let config = AppConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path(), PathBuf::from("/tmp/cal").join("taskcal.db"));
        assert_eq!(config.week_start(), Weekday::Sun);
        assert!(config.hide_past_tasks);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_port() {
        clear_env();
        std::env::set_var("TASKCAL_PORT", "not-a-port");
        let result = AppConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("TASKCAL_PORT"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_zero_password_iterations() {
        clear_env();
        std::env::set_var("TASKCAL_PASSWORD_ITERATIONS", "0");
        let result = AppConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(err.to_string().contains("TASKCAL_PASSWORD_ITERATIONS"));
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_inverted_year_range() {
        clear_env();
        std::env::set_var("TASKCAL_MIN_YEAR", "2050");
        std::env::set_var("TASKCAL_MAX_YEAR", "2010");
        let result = AppConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(CalendarError::InvalidInput(_))));
    }

    #[test]
    fn test_resolve_locale() {
        let mut config = AppConfig::default();
        assert_eq!(config.resolve_locale(), Locale::en_US);

        config.locale = Some("es_ES.UTF-8".to_string());
        assert_eq!(config.resolve_locale(), Locale::es_ES);

        config.locale = Some("xx_NOPE".to_string());
        assert_eq!(config.resolve_locale(), Locale::en_US);
    }
}

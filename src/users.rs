//! Users, calendar membership and login sessions.

use crate::db::models::{Calendar, Session, User};
use crate::error::{CalendarError, Result};
use chrono::Utc;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use sqlx::SqlitePool;

const USER_COLUMNS: &str = "id, username, password_hash, default_calendar, is_admin";
const MIN_PASSWORD_LEN: usize = 4;
const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 200_000;

/// First path segments taken by fixed routes
pub const RESERVED_CALENDAR_IDS: &[&str] =
    &["chat", "main", "user", "login", "do_login", "socket", "static"];

pub struct UserManager<'a> {
    pool: &'a SqlitePool,
    iterations: u32,
}

impl<'a> UserManager<'a> {
    /// `iterations` applies to passwords stored from now on; existing hashes
    /// carry their own count.
    pub fn new(pool: &'a SqlitePool, iterations: u32) -> Self {
        Self {
            pool,
            iterations: iterations.max(1),
        }
    }

    /// Create a user. The default calendar is created when missing and the
    /// user becomes one of its members.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        default_calendar: &str,
        is_admin: bool,
    ) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(CalendarError::InvalidInput("username is required".to_string()));
        }
        validate_password(password)?;
        validate_calendar_id(default_calendar)?;

        if self.find_user(username).await?.is_some() {
            return Err(CalendarError::InvalidInput(format!(
                "user '{}' already exists",
                username
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO calendars (id, name) VALUES (?, ?)")
            .bind(default_calendar)
            .bind(default_calendar)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, default_calendar, is_admin) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(hash_password(password, self.iterations))
        .bind(default_calendar)
        .bind(is_admin)
        .execute(&mut *tx)
        .await?;
        let user_id = result.last_insert_rowid();

        sqlx::query("INSERT OR IGNORE INTO calendar_members (calendar_id, user_id) VALUES (?, ?)")
            .bind(default_calendar)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(username = username, calendar = default_calendar, "User created");
        self.get_user(user_id).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| CalendarError::InvalidInput(format!("user {} does not exist", id)))
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = ?",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY username",
            USER_COLUMNS
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// Check credentials. Unknown users and wrong passwords both yield `None`.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.find_user(username.trim()).await? else {
            return Ok(None);
        };

        if verify_password(password, &user.password_hash) {
            Ok(Some(user))
        } else {
            tracing::debug!(username = username, "Rejected login attempt");
            Ok(None)
        }
    }

    pub async fn update_password(&self, user_id: i64, new_password: &str) -> Result<()> {
        validate_password(new_password)?;

        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(hash_password(new_password, self.iterations))
            .bind(user_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CalendarError::InvalidInput(format!(
                "user {} does not exist",
                user_id
            )));
        }

        tracing::info!(user_id = user_id, "Password updated");
        Ok(())
    }

    /// Whether a user may read and change a calendar
    pub async fn can_access(&self, user: &User, calendar_id: &str) -> Result<bool> {
        if user.default_calendar == calendar_id {
            return Ok(true);
        }

        let member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM calendar_members WHERE calendar_id = ? AND user_id = ?)",
        )
        .bind(calendar_id)
        .bind(user.id)
        .fetch_one(self.pool)
        .await?;

        Ok(member)
    }

    pub async fn calendars_for(&self, user: &User) -> Result<Vec<Calendar>> {
        let calendars = sqlx::query_as::<_, Calendar>(
            r#"
            SELECT c.id, c.name
            FROM calendars c
            JOIN calendar_members m ON m.calendar_id = c.id
            WHERE m.user_id = ?
            ORDER BY c.id
            "#,
        )
        .bind(user.id)
        .fetch_all(self.pool)
        .await?;

        Ok(calendars)
    }

    pub async fn create_session(&self, user_id: i64) -> Result<Session> {
        let session = Session {
            id: new_session_id(),
            user_id,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO sessions (id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.created_at)
            .execute(self.pool)
            .await?;

        Ok(session)
    }

    pub async fn session_user(&self, session_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.password_hash, u.default_calendar, u.is_admin
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }
}

/// Hash a password with a fresh random salt.
///
/// Stored as `pbkdf2-sha256$<iterations>$<salt>$<key>`, salt and key in hex.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = to_hex(&rand::random::<[u8; SALT_LEN]>());
    let key = derive_key(password, &salt, iterations);
    format!("{}${}${}${}", HASH_SCHEME, iterations, salt, to_hex(&key))
}

/// Check a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(key), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    if scheme != HASH_SCHEME || iterations == 0 || salt.is_empty() {
        return false;
    }

    let derived = to_hex(&derive_key(password, salt, iterations));
    constant_time_eq(derived.as_bytes(), key.as_bytes())
}

fn derive_key(password: &str, salt: &str, iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut key);
    key
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn new_session_id() -> String {
    to_hex(&rand::random::<[u8; 32]>())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CalendarError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Calendar ids are URL path segments
pub fn validate_calendar_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(CalendarError::InvalidInput(format!(
            "calendar id '{}' may only contain letters, digits, '-' and '_'",
            id
        )));
    }
    if RESERVED_CALENDAR_IDS.contains(&id) {
        return Err(CalendarError::InvalidInput(format!(
            "calendar id '{}' is reserved",
            id
        )));
    }
    Ok(())
}

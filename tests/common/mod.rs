//! Common utilities for integration tests
//!
//! Provides an in-process app backed by a temporary data directory, request
//! helpers for driving the router with `oneshot`, and the path to the
//! `taskcal` binary for CLI tests.

#![allow(dead_code)] // Not every test file uses every helper

use assert_cmd::Command;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response};
use axum::Router;
use std::fs;
use std::path::{Path, PathBuf};
use taskcal::config::AppConfig;
use taskcal::db::models::User;
use taskcal::web::server::{create_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

/// Icon bytes written to the test static directory
pub const FAVICON_BYTES: &[u8] = b"\x00\x00\x01\x00test-icon";

pub const PASSWORD: &str = "hunter22";

/// Create a Command for `taskcal` with its data directory pointed at `data_dir`
///
/// # Examples
///
/// ```no_run
/// mod common;
///
/// common::taskcal_command(temp.path())
///     .args(["user", "list"])
///     .assert()
///     .success();
/// ```
pub fn taskcal_command(data_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_taskcal"));
    cmd.env("TASKCAL_DATA_DIR", data_dir)
        .env("TASKCAL_PASSWORD_ITERATIONS", "1000")
        .env_remove("RUST_LOG")
        .env_remove("TASKCAL_PORT")
        .env_remove("TASKCAL_LOCALE");
    cmd
}

/// An app instance with its own database, chat log and static directory
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    temp_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Build an app after letting the caller adjust the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let static_dir = temp_dir.path().join("static");
        fs::create_dir_all(&static_dir).unwrap();
        fs::write(static_dir.join("favicon.ico"), FAVICON_BYTES).unwrap();
        fs::write(static_dir.join("style.css"), "body { margin: 0; }").unwrap();

        let mut config = AppConfig {
            data_dir: temp_dir.path().join("data"),
            static_dir,
            password_iterations: 1_000,
            ..AppConfig::default()
        };
        adjust(&mut config);

        let state = AppState::initialize(config)
            .await
            .expect("Failed to initialize app state");
        let router = create_router(state.clone());

        Self {
            state,
            router,
            temp_dir,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(with_cookie(Request::get(uri), cookie).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(&self, uri: &str, form: &str, cookie: Option<&str>) -> Response<Body> {
        let request = with_cookie(Request::post(uri), cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn create_user(&self, username: &str, calendar: &str) -> User {
        self.state
            .users()
            .create_user(username, PASSWORD, calendar, false)
            .await
            .unwrap()
    }

    /// Log in through `/do_login` and return the `sid=...` cookie pair
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .post_form(
                "/do_login",
                &format!("username={}&password={}", username, PASSWORD),
                None,
            )
            .await;
        session_cookie(&response).expect("login should set a session cookie")
    }

    /// Create a user with its own calendar and log in as them
    pub async fn logged_in_user(&self, username: &str, calendar: &str) -> String {
        self.create_user(username, calendar).await;
        self.login(username).await
    }
}

fn with_cookie(
    builder: axum::http::request::Builder,
    cookie: Option<&str>,
) -> axum::http::request::Builder {
    match cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

/// `name=value` part of the Set-Cookie header
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

//! Cookie sessions and the login flow.

use super::models::{json_error, LoginForm, LoginQuery};
use super::server::AppState;
use super::views;
use crate::db::models::User;
use crate::error::CalendarError;
use crate::users::UserManager;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};

pub const SESSION_COOKIE: &str = "sid";

/// The logged-in user of a request.
///
/// Without a valid session, page requests are redirected to `/login` and
/// JSON requests (DELETE, PUT) get a 401.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let wants_json = parts.method == Method::DELETE || parts.method == Method::PUT;

        let user = match cookie_value(&parts.headers, SESSION_COOKIE) {
            Some(session_id) => state
                .users()
                .session_user(&session_id)
                .await
                .map_err(|e| rejection(&e, wants_json))?,
            None => None,
        };

        match user {
            Some(user) => Ok(CurrentUser(user)),
            None if wants_json => Err(json_error(&CalendarError::Unauthorized)),
            None => Err(Redirect::to("/login").into_response()),
        }
    }
}

fn rejection(err: &CalendarError, wants_json: bool) -> Response {
    if wants_json {
        json_error(err)
    } else {
        super::models::html_error(err)
    }
}

/// Fail with `Forbidden` unless the user may use the calendar.
pub async fn authorize(state: &AppState, user: &User, calendar_id: &str) -> crate::error::Result<()> {
    if state.users().can_access(user, calendar_id).await? {
        Ok(())
    } else {
        tracing::warn!(
            username = user.username.as_str(),
            calendar = calendar_id,
            "Calendar access denied"
        );
        Err(CalendarError::Forbidden(calendar_id.to_string()))
    }
}

/// Value of a cookie across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn session_cookie(session_id: &str, https_only: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax{}",
        SESSION_COOKIE,
        session_id,
        if https_only { "; Secure" } else { "" }
    )
}

/// `/`: send logged-in users to their default calendar
pub async fn index(user: Option<CurrentUser>) -> Redirect {
    match user {
        Some(CurrentUser(user)) => Redirect::to(&format!("/{}/", user.default_calendar)),
        None => Redirect::to("/login"),
    }
}

pub async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(views::login_page(query.error.is_some()))
}

pub async fn do_login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let users = state.users();

    let user = match users.authenticate(&form.username, &form.password).await {
        Ok(Some(user)) => user,
        Ok(None) => return Redirect::to("/login?error=1").into_response(),
        Err(e) => return super::models::html_error(&e),
    };

    let session = match users.create_session(user.id).await {
        Ok(session) => session,
        Err(e) => return super::models::html_error(&e),
    };
    tracing::info!(username = user.username.as_str(), "User logged in");

    let mut response = Redirect::to("/").into_response();
    match HeaderValue::from_str(&session_cookie(&session.id, state.config.cookie_https_only)) {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
            response
        },
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

impl AppState {
    pub fn users(&self) -> UserManager<'_> {
        UserManager::new(&self.db_pool, self.config.password_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sid=abc123"));
        assert_eq!(cookie_value(&headers, "sid"), Some("abc123".to_string()));
        assert_eq!(cookie_value(&headers, "theme"), Some("dark".to_string()));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_cookie_value_across_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("sid=xyz"));
        assert_eq!(cookie_value(&headers, "sid"), Some("xyz".to_string()));
    }

    #[test]
    fn test_empty_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("sid="));
        assert_eq!(cookie_value(&headers, "sid"), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        assert_eq!(
            session_cookie("abc", false),
            "sid=abc; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(session_cookie("abc", true).ends_with("; Secure"));
    }
}

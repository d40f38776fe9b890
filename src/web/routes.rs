use axum::{
    routing::{get, post},
    Router,
};

use super::auth;
use super::handlers;
use super::server::AppState;
use super::websocket;

/// Page, form and JSON routes of the calendar
pub fn calendar_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page))
        .route("/do_login", post(auth::do_login))
        .route("/chat/", get(handlers::chat_view))
        .route(
            "/user/edit/",
            get(handlers::edit_user_form).post(handlers::edit_user),
        )
        .route("/main/:calendar_id/", get(handlers::main_calendar))
        .route("/socket", get(websocket::handle_chat_websocket))
        // Calendar scoped routes
        .route("/:calendar_id/", get(handlers::month_view))
        .route("/:calendar_id/new_task", post(handlers::save_task))
        .route(
            "/:calendar_id/:year/:month/new_task",
            get(handlers::new_task_form),
        )
        .route(
            "/:calendar_id/:year/:month/:day/:task_id/",
            get(handlers::edit_task_form)
                .delete(handlers::delete_task)
                .put(handlers::move_task),
        )
        .route(
            "/:calendar_id/:year/:month/:day/task/:task_id",
            post(handlers::update_task),
        )
        .route(
            "/:calendar_id/:year/:month/:day/:task_id/hide/",
            post(handlers::hide_repetition),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_routes_creation() {
        // Overlapping static and parameter segments must not panic
        let _router = calendar_routes();
    }
}

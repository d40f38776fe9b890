use super::websocket::ChatState;
use crate::chat::ChatStore;
use crate::config::AppConfig;
use crate::db::{create_pool, run_migrations};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Locale;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

const FAVICON_FILE: &str = "favicon.ico";
const FAVICON_MIME: &str = "image/vnd.microsoft.icon";

/// Headers present on every response, whatever the handler returned
const RESPONSE_HEADERS: [(&str, &str); 3] = [
    ("access-control-allow-credentials", "true"),
    ("access-control-allow-headers", "Content-Type,Authorization"),
    ("access-control-allow-methods", "GET,PUT,POST,DELETE,OPTIONS"),
];

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: Arc<AppConfig>,
    /// Locale for month and weekday names
    pub locale: Locale,
    pub chat: ChatState,
}

impl AppState {
    /// Open the database under the data directory and set up the chat log.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let db_path = config.db_path();
        let db_pool = create_pool(&db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        run_migrations(&db_pool)
            .await
            .context("Failed to run database migrations")?;

        let locale = config.resolve_locale();
        let chat = ChatState::new(ChatStore::new(config.chat_path()));

        Ok(Self {
            db_pool,
            config: Arc::new(config),
            locale,
            chat,
        })
    }
}

/// Web server instance
pub struct WebServer {
    config: AppConfig,
}

impl WebServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run the web server until it fails
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let data_dir = self.config.data_dir.clone();

        let state = AppState::initialize(self.config).await?;
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        tracing::info!("Web server listening on http://{}", addr);
        tracing::info!("Data directory: {}", data_dir.display());

        axum::serve(listener, app).await.context("Server error")?;

        Ok(())
    }
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    use super::routes;

    let static_dir = state.config.static_dir.clone();

    let mut router = Router::new()
        // Wins over the `/:calendar_id/` routes
        .route("/favicon.ico", get(favicon_handler))
        .merge(routes::calendar_routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::PUT,
                    Method::POST,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        );

    for (name, value) in RESPONSE_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router
}

/// Serve the site icon from the static directory
async fn favicon_handler(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join(FAVICON_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, FAVICON_MIME)], bytes).into_response(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            not_found_handler().await.into_response()
        },
    }
}

/// 404 Not Found handler
async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not found",
            "code": "NOT_FOUND"
        })),
    )
}

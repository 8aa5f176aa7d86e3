use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

pub mod config;
pub mod middleware;
pub mod routes;

use crate::config::{watcher::ConfigWatcher, AppConfig};
use crate::routes::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub config_watcher: Arc<ConfigWatcher>,
    pub users: UserStore,
}

impl AppState {
    pub fn new(config_watcher: Arc<ConfigWatcher>) -> Self {
        Self {
            config_watcher,
            users: UserStore::default(),
        }
    }

    /// State backed by a fixed config, with no file watcher.
    pub fn from_config(config: AppConfig) -> Self {
        Self::new(Arc::new(ConfigWatcher::unwatched(config)))
    }
}

/// Builds the application router with request logging registered on the
/// configured URL patterns.
pub async fn create_app(state: AppState) -> Router {
    let current_config = state.config_watcher.get_config().await;

    let api = Router::new()
        .route(
            "/v1/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route("/v1/users/:id", get(routes::users::get_user));

    let app = Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api);

    with_middleware(
        app,
        state,
        Duration::from_secs(current_config.server.timeout_seconds),
    )
}

/// Wraps `routes` in the request logger and the request timeout. The logger
/// sits outside the timeout so a timed-out request still logs its 408.
pub fn with_middleware(routes: Router<AppState>, state: AppState, timeout: Duration) -> Router {
    routes
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::logging_middleware,
                ))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}

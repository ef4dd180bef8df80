pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod health;
pub mod layers;
pub mod messages;
pub mod models;
pub mod rooms;
pub mod store;
pub mod users;

use std::{sync::Arc, time::Instant};

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use auth::TokenSigner;
use config::Config;
use gateway::Hub;
use store::Store;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub tokens: TokenSigner,
    pub hub: Hub,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> AppState {
        AppState {
            store: Store::new(db_pool),
            tokens: TokenSigner::new(&config.token_secret, config.token_ttl),
            hub: Hub::new(),
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/rooms", rooms::router())
        .nest("/messages", messages::router())
        .nest("/users", users::router())
        .route("/unread", get(messages::unread))
        .route("/health", get(health::health))
        .route("/ws", get(gateway::gateway_ws));

    let app = Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
        .fallback(error::not_found)
        .method_not_allowed_fallback(error::method_not_allowed)
        .layer(middleware::from_fn_with_state(state.config.clone(), error::shape_errors));

    let mut app = layers::security_headers(app)
        .layer(cors(&state.config))
        .layer(CompressionLayer::new());

    if state.config.log_requests {
        app = app.layer(TraceLayer::new_for_http().make_span_with(layers::RequestSpan));
    }

    app.with_state(state)
}

fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

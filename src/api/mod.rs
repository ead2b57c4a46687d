pub mod extract;
mod handlers;
pub mod middleware;

use axum::{
    extract::FromRef,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::db::Database;
use crate::events::EventBus;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub events: EventBus,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: Database, events: EventBus, config: AppConfig) -> Self {
        Self { db, events, config }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for EventBus {
    fn from_ref(state: &AppState) -> Self {
        state.events.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        // Session
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        // Customers
        .route(
            "/customers",
            get(handlers::customers::list).post(handlers::customers::create),
        )
        .route(
            "/customers/{id}",
            get(handlers::customers::get)
                .put(handlers::customers::update)
                .delete(handlers::customers::delete),
        )
        // Segments
        .route(
            "/segments",
            get(handlers::segments::list).post(handlers::segments::create),
        )
        .route(
            "/segments/{id}",
            get(handlers::segments::get)
                .put(handlers::segments::update)
                .delete(handlers::segments::delete),
        )
        .route("/segments/{id}/customers", get(handlers::segments::members))
        .route("/segments/{id}/refresh", post(handlers::segments::refresh))
        // Campaigns
        .route(
            "/campaigns",
            get(handlers::campaigns::list).post(handlers::campaigns::create),
        )
        .route(
            "/campaigns/{id}",
            get(handlers::campaigns::get).put(handlers::campaigns::update),
        )
        .route("/campaigns/{id}/launch", post(handlers::campaigns::launch))
        .route("/campaigns/{id}/pause", post(handlers::campaigns::pause))
        .route("/campaigns/{id}/resume", post(handlers::campaigns::resume))
        .route("/campaigns/{id}/complete", post(handlers::campaigns::complete))
        .route("/campaigns/{id}/stats", get(handlers::campaigns::stats))
        // Analytics
        .route("/analytics/overview", get(handlers::analytics::overview))
        .route("/analytics/roi", get(handlers::analytics::roi))
        .route("/analytics/funnel", get(handlers::analytics::funnel))
        .route("/analytics/segments", get(handlers::analytics::segments))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::auth::login))
        .route("/demo/initialize", post(handlers::demo::initialize))
        .merge(protected);

    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let Some(origins) = &config.cors_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

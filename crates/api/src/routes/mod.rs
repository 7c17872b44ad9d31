//! API routes

pub mod auth;
pub mod chats;
pub mod health;
pub mod requests;
pub mod users;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/username-availability", post(auth::username_availability));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route("/auth/me", get(auth::me))
        // Users & friends
        .route("/users", get(users::list_users))
        .route("/friends", get(users::list_friends))
        // Interest requests
        .route(
            "/requests",
            get(requests::pending_requests)
                .post(requests::send_request)
                .patch(requests::respond_to_request),
        )
        .route("/requests/check", get(requests::check_request_sent))
        // Chats
        .route("/chats", get(chats::list_chats))
        .route("/chats/:room_id/messages", get(chats::list_messages))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // WebSocket routes (auth handled in handler via query parameter or authenticate event)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

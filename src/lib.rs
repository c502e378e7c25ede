pub mod auth;
pub mod clients;
pub mod config;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod reconcile;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod websocket;
pub mod ws;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{cors::{Any, CorsLayer}, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::docs::ApiDoc;
use crate::routes::create_api_routes;
use crate::state::AppState;
use crate::websocket::handler::websocket_handler;

/// Assemble the HTTP and WebSocket routes.
pub fn build_app(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origin_list()
        .into_iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    let app = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(state.clone()))
        // Folder collaboration socket
        .route("/ws", get(websocket_handler))
        .with_state(state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    if origins.is_empty() {
        return app;
    }
    app.layer(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

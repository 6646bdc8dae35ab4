pub mod config;
pub mod dto;
pub mod format;
pub mod handlers;
pub mod models;
pub mod service;
pub mod smtp;

use axum::{
    Router,
    http::{HeaderName, Method, StatusCode, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use std::{sync::Arc, time::Duration};

use handlers::rest;
use service::NotificationService;

/// Browsers call these endpoints cross-origin from the portal frontend.
/// Preflight `OPTIONS` requests are answered here with `200`.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

/// Builds the HTTP router around a notification service.
pub fn app(service: Arc<NotificationService>, request_timeout: Duration) -> Router {
    let notifications = Router::new()
        .route("/functions/send-partner-email", post(rest::send_partner_email))
        .route("/functions/send-support-email", post(rest::send_support_email))
        .route(
            "/functions/send-referral-notification",
            post(rest::send_referral_notification),
        )
        .route_layer(middleware::from_fn(rest::require_bearer));

    Router::new()
        .route("/", get(rest::health_check))
        .route("/api-doc/openapi.json", get(rest::openapi))
        .merge(notifications)
        .with_state(service)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(middleware::map_response(rest::timeout_as_failure))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

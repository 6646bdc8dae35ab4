use axum::{
    Json,
    extract::{Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    dto::{AtFaultStatus, NotifyResponse, PartnerSubmission, ReferralCreated, SupportRequest},
    models::NotificationPayload,
    service::NotificationService,
};

#[derive(OpenApi)]
#[openapi(
    paths(send_partner_email, send_support_email, send_referral_notification),
    components(schemas(
        PartnerSubmission,
        SupportRequest,
        ReferralCreated,
        AtFaultStatus,
        NotifyResponse
    )),
    tags(
        (name = "notifications", description = "Portal notification emails")
    )
)]
pub struct ApiDoc;

async fn notify(
    service: &NotificationService,
    payload: Result<NotificationPayload, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!("Rejected notification body: {}", rejection.body_text());
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(NotifyResponse::failed(rejection.body_text())),
            )
                .into_response();
        }
    };

    match service.notify(payload).await {
        Ok(message) => (StatusCode::OK, Json(NotifyResponse::sent(message))).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(NotifyResponse::failed(e.to_string())),
        )
            .into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/functions/send-partner-email",
    request_body = PartnerSubmission,
    responses(
        (status = 200, description = "Notification sent", body = NotifyResponse),
        (status = 401, description = "Missing bearer token", body = NotifyResponse),
        (status = 500, description = "Notification failed", body = NotifyResponse)
    ),
    tag = "notifications"
)]
#[debug_handler]
pub async fn send_partner_email(
    State(service): State<Arc<NotificationService>>,
    payload: Result<Json<PartnerSubmission>, JsonRejection>,
) -> Response {
    notify(
        &service,
        payload.map(|Json(p)| NotificationPayload::PartnerSubmission(p)),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/functions/send-support-email",
    request_body = SupportRequest,
    responses(
        (status = 200, description = "Notification sent", body = NotifyResponse),
        (status = 401, description = "Missing bearer token", body = NotifyResponse),
        (status = 500, description = "Notification failed", body = NotifyResponse)
    ),
    tag = "notifications"
)]
#[debug_handler]
pub async fn send_support_email(
    State(service): State<Arc<NotificationService>>,
    payload: Result<Json<SupportRequest>, JsonRejection>,
) -> Response {
    notify(
        &service,
        payload.map(|Json(s)| NotificationPayload::SupportRequest(s)),
    )
    .await
}

#[utoipa::path(
    post,
    path = "/functions/send-referral-notification",
    request_body = ReferralCreated,
    responses(
        (status = 200, description = "Notification sent", body = NotifyResponse),
        (status = 401, description = "Missing bearer token", body = NotifyResponse),
        (status = 500, description = "Notification failed", body = NotifyResponse)
    ),
    tag = "notifications"
)]
#[debug_handler]
pub async fn send_referral_notification(
    State(service): State<Arc<NotificationService>>,
    payload: Result<Json<ReferralCreated>, JsonRejection>,
) -> Response {
    notify(
        &service,
        payload.map(|Json(r)| NotificationPayload::ReferralCreated(r)),
    )
    .await
}

/// Lets a request through only with an `Authorization: Bearer <token>` header.
///
/// The token itself is checked upstream by the API gateway.
pub async fn require_bearer(request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .is_some_and(|(scheme, token)| {
            scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty()
        });

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Missing or invalid authorization header");
        return (
            StatusCode::UNAUTHORIZED,
            Json(NotifyResponse::failed("Missing or invalid authorization header")),
        )
            .into_response();
    }

    next.run(request).await
}

/// Gives requests cut off by the router's `TimeoutLayer` the usual failure body.
pub async fn timeout_as_failure(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    tracing::error!("Request timed out before the notification finished");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(NotifyResponse::failed("request timed out")),
    )
        .into_response()
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub async fn health_check() -> Response {
    (StatusCode::OK, "Hello from referral notifier!").into_response()
}

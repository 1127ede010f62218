//! Message send endpoints. Same routing as the hub's SEND ops, for clients
//! that post over HTTP.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::message::Message;
use crate::models::user::Identity;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/private", post(send_private_message))
        .route("/messages/group", post(send_group_message))
}

// =========================================================================
// POST /api/v1/messages/private
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendPrivateMessageRequest {
    pub receiver_id: String,
    pub content: String,
}

/// `POST /api/v1/messages/private` — Send a message to one user.
#[utoipa::path(
    post,
    path = "/api/v1/messages/private",
    tag = "Messages",
    security(("bearer" = [])),
    request_body = SendPrivateMessageRequest,
    responses(
        (status = 201, description = "Message stored and routed", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 503, description = "Message could not be stored", body = ApiErrorBody),
    ),
)]
pub async fn send_private_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SendPrivateMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let report = state
        .router
        .send_private(&Identity::from(auth), &body.receiver_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(report.message)))
}

// =========================================================================
// POST /api/v1/messages/group
// =========================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendGroupMessageRequest {
    pub group_id: String,
    pub content: String,
}

/// `POST /api/v1/messages/group` — Send a message to a group the caller belongs to.
#[utoipa::path(
    post,
    path = "/api/v1/messages/group",
    tag = "Messages",
    security(("bearer" = [])),
    request_body = SendGroupMessageRequest,
    responses(
        (status = 201, description = "Message stored and routed", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a member of the group", body = ApiErrorBody),
        (status = 503, description = "Message could not be stored", body = ApiErrorBody),
    ),
)]
pub async fn send_group_message(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<SendGroupMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let report = state
        .router
        .send_group(&Identity::from(auth), &body.group_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(report.message)))
}

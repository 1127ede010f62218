//! Chat list and message history.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chat_common::is_valid_id;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::middleware::AuthUser;
use crate::db::store::{MessageQuery, MessageScope, UserFilter, MAX_PAGE_SIZE};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::message::{ChatKind, Message};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats", get(list_chats))
        .route("/chats/private/{peer_id}/messages", get(list_private_messages))
        .route("/chats/group/{group_id}/messages", get(list_group_messages))
}

// =========================================================================
// GET /api/v1/chats
// =========================================================================

/// One entry in the caller's chat list.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChatSummary {
    /// Peer user id for private chats, group id for group chats.
    pub id: String,
    pub kind: ChatKind,
    pub name: String,
}

/// `GET /api/v1/chats` — Private conversations and groups of the caller.
#[utoipa::path(
    get,
    path = "/api/v1/chats",
    tag = "Chats",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Private chats followed by groups", body = Vec<ChatSummary>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_chats(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatSummary>>, ApiError> {
    let peers = state.messages.conversation_peers(&auth.user_id).await?;

    let mut names: HashMap<String, String> = HashMap::with_capacity(peers.len());
    for chunk in peers.chunks(MAX_PAGE_SIZE as usize) {
        let users = state
            .users
            .query_users(&UserFilter {
                ids: Some(chunk.to_vec()),
                name_prefix: None,
                limit: Some(MAX_PAGE_SIZE),
            })
            .await?;
        names.extend(users.into_iter().map(|u| (u.id, u.display_name)));
    }

    let mut chats: Vec<ChatSummary> = peers
        .into_iter()
        .map(|peer_id| ChatSummary {
            name: names.remove(&peer_id).unwrap_or_else(|| peer_id.clone()),
            id: peer_id,
            kind: ChatKind::Private,
        })
        .collect();

    let groups = state.groups.groups_for_user(&auth.user_id).await?;
    chats.extend(groups.into_iter().map(|g| ChatSummary {
        id: g.id,
        kind: ChatKind::Group,
        name: g.name,
    }));

    Ok(Json(chats))
}

// =========================================================================
// History
// =========================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Return messages with an id lower than this one.
    pub before: Option<String>,
    /// Max messages (1-100, default 50).
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListMessagesResponse {
    /// Oldest first.
    pub messages: Vec<Message>,
}

/// `GET /api/v1/chats/private/{peer_id}/messages` — Conversation with one user.
#[utoipa::path(
    get,
    path = "/api/v1/chats/private/{peer_id}/messages",
    tag = "Chats",
    security(("bearer" = [])),
    params(("peer_id" = String, Path, description = "The other participant"), HistoryQuery),
    responses(
        (status = 200, description = "Message page", body = ListMessagesResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_private_messages(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    if !is_valid_id(&peer_id) {
        return Err(invalid("peer_id", "Malformed identifier"));
    }
    let query = MessageQuery::new(MessageScope::Conversation {
        user_id: auth.user_id,
        peer_id,
    })
    .before(parse_cursor(params.before.as_deref())?)
    .limit(params.limit);

    let messages = state.messages.query_messages(&query).await?;
    Ok(Json(ListMessagesResponse { messages }))
}

/// `GET /api/v1/chats/group/{group_id}/messages` — Group history, members only.
#[utoipa::path(
    get,
    path = "/api/v1/chats/group/{group_id}/messages",
    tag = "Chats",
    security(("bearer" = [])),
    params(("group_id" = String, Path, description = "Group ID"), HistoryQuery),
    responses(
        (status = 200, description = "Message page", body = ListMessagesResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a member of the group", body = ApiErrorBody),
    ),
)]
pub async fn list_group_messages(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<ListMessagesResponse>, ApiError> {
    if !is_valid_id(&group_id) {
        return Err(invalid("group_id", "Malformed identifier"));
    }
    let before = parse_cursor(params.before.as_deref())?;

    let group = state
        .groups
        .group_for_member(&auth.user_id, &group_id)
        .await?
        .ok_or_else(|| ApiError::forbidden("You are not a member of this group"))?;

    let query = MessageQuery::new(MessageScope::Group { group_id: group.id })
        .before(before)
        .limit(params.limit);

    let messages = state.messages.query_messages(&query).await?;
    Ok(Json(ListMessagesResponse { messages }))
}

fn parse_cursor(before: Option<&str>) -> Result<Option<i64>, ApiError> {
    before
        .map(|b| b.parse::<i64>().map_err(|_| invalid("before", "Must be a message id")))
        .transpose()
}

fn invalid(field: &str, message: &str) -> ApiError {
    ApiError::validation(vec![FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }])
}

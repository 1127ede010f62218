use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::middleware::AuthUser;
use crate::db::store::UserFilter;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::user::UserSummary;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/users", get(search_users))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchUsersQuery {
    /// Display-name prefix.
    pub q: Option<String>,
    /// Max results (1-100, default 50).
    pub limit: Option<i64>,
}

/// `GET /api/v1/users` — Look up users to start a private conversation with.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "Users",
    security(("bearer" = [])),
    params(SearchUsersQuery),
    responses(
        (status = 200, description = "Matching users, ordered by display name", body = Vec<UserSummary>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn search_users(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SearchUsersQuery>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let users = state
        .users
        .query_users(&UserFilter {
            ids: None,
            name_prefix: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            limit: query.limit,
        })
        .await?;
    Ok(Json(users))
}

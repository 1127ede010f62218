use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthUser;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::group::Group;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/groups", get(list_groups))
}

/// `GET /api/v1/groups` — Groups the caller belongs to.
#[utoipa::path(
    get,
    path = "/api/v1/groups",
    tag = "Groups",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller's groups", body = Vec<Group>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_groups(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Group>>, ApiError> {
    let groups = state.groups.groups_for_user(&auth.user_id).await?;
    Ok(Json(groups))
}

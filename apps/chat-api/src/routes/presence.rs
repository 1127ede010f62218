use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::middleware::AuthUser;
use crate::error::ApiErrorBody;
use crate::models::user::OnlineUser;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/presence", get(list_connected_users))
}

/// `GET /api/v1/presence` — Users with at least one live connection.
#[utoipa::path(
    get,
    path = "/api/v1/presence",
    tag = "Presence",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Connected users, ordered by display name", body = Vec<OnlineUser>),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_connected_users(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> Json<Vec<OnlineUser>> {
    Json(
        state
            .registry
            .snapshot()
            .into_iter()
            .map(OnlineUser::from)
            .collect(),
    )
}

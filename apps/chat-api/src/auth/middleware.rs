//! Access token extraction.

use axum::extract::{FromRequestParts, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;

use crate::auth::tokens;
use crate::error::ApiError;
use crate::models::user::Identity;
use crate::AppState;

/// Authenticated user extracted from `Authorization: Bearer <jwt>`, or from
/// the `access_token` query parameter for WebSocket upgrades.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(AUTHORIZATION) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_owned)
                .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?,
            None => Query::<TokenQuery>::try_from_uri(&parts.uri)
                .ok()
                .and_then(|q| q.0.access_token)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ApiError::unauthorized("Missing access token"))?,
        };

        let identity = tokens::validate_access_token(&token, &state.config)?;

        Ok(AuthUser {
            user_id: identity.user_id,
            display_name: identity.display_name,
        })
    }
}

impl From<AuthUser> for Identity {
    fn from(user: AuthUser) -> Self {
        Identity::new(user.user_id, user.display_name)
    }
}

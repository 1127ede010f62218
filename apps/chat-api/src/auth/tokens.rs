//! Access token validation.
//!
//! Tokens are issued by the external identity provider and signed with a
//! shared HS256 secret. This service only verifies them.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;
use crate::models::user::Identity;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: String,
    /// Display name shown to other users.
    pub name: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Validate an access token and resolve the caller's identity.
///
/// Checks:
///   1. HS256 signature with the configured secret
///   2. `exp` (jsonwebtoken handles this)
///   3. `iss` and `aud` match the configuration
///   4. `sub` is a well-formed id and `name` is not blank
pub fn validate_access_token(token: &str, config: &Config) -> Result<Identity, ApiError> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.jwt_audience.as_str()]);
    validation.set_issuer(&[config.jwt_issuer.as_str()]);

    let claims = jsonwebtoken::decode::<AccessClaims>(token, &key, &validation)
        .map_err(|e| {
            tracing::debug!(?e, "access token validation failed");
            ApiError::unauthorized("Invalid or expired access token")
        })?
        .claims;

    if !chat_common::is_valid_id(&claims.sub) {
        return Err(ApiError::unauthorized("Access token has a malformed subject"));
    }
    let display_name = claims.name.trim();
    if display_name.is_empty() {
        return Err(ApiError::unauthorized("Access token has no display name"));
    }

    Ok(Identity::new(claims.sub, display_name))
}

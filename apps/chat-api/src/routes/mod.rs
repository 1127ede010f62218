pub mod chats;
pub mod groups;
pub mod health;
pub mod messages;
pub mod presence;
pub mod users;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest(
            "/api/v1",
            presence::router()
                .merge(messages::router())
                .merge(chats::router())
                .merge(groups::router())
                .merge(users::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Presence
        presence::list_connected_users,
        // Messages
        messages::send_private_message,
        messages::send_group_message,
        // Chats
        chats::list_chats,
        chats::list_private_messages,
        chats::list_group_messages,
        // Groups
        groups::list_groups,
        // Users
        users::search_users,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::message::Message,
            crate::models::message::ChatKind,
            crate::models::group::Group,
            crate::models::user::UserSummary,
            crate::models::user::OnlineUser,
            // Route request/response types
            health::HealthResponse,
            messages::SendPrivateMessageRequest,
            messages::SendGroupMessageRequest,
            chats::ChatSummary,
            chats::ListMessagesResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Presence", description = "Connected users"),
        (name = "Messages", description = "Private and group messaging"),
        (name = "Chats", description = "Chat list and history"),
        (name = "Groups", description = "Group membership"),
        (name = "Users", description = "User directory"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/presence",
            "/api/v1/messages/private",
            "/api/v1/messages/group",
            "/api/v1/chats",
            "/api/v1/chats/private/{peer_id}/messages",
            "/api/v1/chats/group/{group_id}/messages",
            "/api/v1/groups",
            "/api/v1/users",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::sync::mpsc;

use chat_api::auth::tokens::AccessClaims;
use chat_api::config::Config;
use chat_api::db::store::MemoryStore;
use chat_api::db::Stores;
use chat_api::queue::{MemoryQueue, NotificationRequest};
use chat_api::AppState;

pub const TEST_SECRET: &str = "integration-test-secret";

pub const ALICE: &str = "usr_alice";
pub const BOB: &str = "usr_bob";
pub const CAROL: &str = "usr_carol";
pub const DAVE: &str = "usr_dave";
pub const TEAM: &str = "grp_team";

/// An in-memory application plus handles to inspect what it did.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub notifications: mpsc::UnboundedReceiver<NotificationRequest>,
}

impl TestContext {
    /// Drain every notification request published so far.
    pub fn take_notifications(&mut self) -> Vec<NotificationRequest> {
        let mut out = Vec::new();
        while let Ok(request) = self.notifications.try_recv() {
            out.push(request);
        }
        out
    }

    pub fn token(&self, user_id: &str) -> String {
        let name = display_name(user_id);
        mint_token(&self.state.config, user_id, name)
    }
}

/// Build a test AppState over the in-memory store and queue.
///
/// Seeds Alice, Bob, Carol and Dave; Alice, Bob and Carol share the "Team"
/// group; Alice and Bob are contacts.
pub fn test_context() -> TestContext {
    let store = Arc::new(MemoryStore::new());
    for user_id in [ALICE, BOB, CAROL, DAVE] {
        store.upsert_user(user_id, display_name(user_id));
    }
    store.upsert_group(TEAM, "Team", &[ALICE, BOB, CAROL]);
    store.add_contact(ALICE, BOB);

    let (queue, notifications) = MemoryQueue::new();
    let state = AppState::new(
        Config::for_tests(TEST_SECRET),
        Stores::memory(store.clone()),
        Arc::new(queue),
    );

    TestContext {
        state,
        store,
        notifications,
    }
}

/// Build the full application router wired to a fresh test context.
pub fn test_app() -> (Router, TestContext) {
    let ctx = test_context();
    let app = chat_api::routes::router().with_state(ctx.state.clone());
    (app, ctx)
}

pub fn display_name(user_id: &str) -> &'static str {
    match user_id {
        ALICE => "Alice",
        BOB => "Bob",
        CAROL => "Carol",
        DAVE => "Dave",
        _ => "Someone",
    }
}

/// Mint an access token the way the identity provider would.
pub fn mint_token(config: &Config, user_id: &str, name: &str) -> String {
    mint_token_with_exp(config, user_id, name, 300)
}

pub fn mint_token_with_exp(config: &Config, user_id: &str, name: &str, exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        name: name.to_string(),
        iss: config.jwt_issuer.clone(),
        aud: config.jwt_audience.clone(),
        exp: now + exp_offset_secs,
        iat: now,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .expect("mint test token")
}

//! Persistence collaborator seams and the in-memory implementation.
//!
//! The core consults these traits and never owns their data. Postgres backs
//! them in production (`db::pg`); `MemoryStore` backs tests and local runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::group::Group;
use crate::models::message::{ChatKind, Message, NewMessage};
use crate::models::user::UserSummary;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("connection pool error: {0}")]
    Pool(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Which conversation a history query reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    /// Private messages between two users, both directions.
    Conversation { user_id: String, peer_id: String },
    Group { group_id: String },
}

#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub scope: MessageScope,
    /// Only messages with an id strictly below this cursor.
    pub before: Option<i64>,
    pub limit: i64,
}

impl MessageQuery {
    pub fn new(scope: MessageScope) -> Self {
        Self {
            scope,
            before: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn before(mut self, before: Option<i64>) -> Self {
        self.before = before;
        self
    }

    pub fn limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        self
    }

    fn matches(&self, m: &Message) -> bool {
        let in_scope = match &self.scope {
            MessageScope::Conversation { user_id, peer_id } => {
                m.kind == ChatKind::Private
                    && ((&m.sender_id == user_id && &m.receiver_id == peer_id)
                        || (&m.sender_id == peer_id && &m.receiver_id == user_id))
            }
            MessageScope::Group { group_id } => {
                m.kind == ChatKind::Group && &m.receiver_id == group_id
            }
        };
        in_scope && self.before.map_or(true, |before| m.id < before)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub group_id: Option<String>,
    pub member_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub ids: Option<Vec<String>>,
    pub name_prefix: Option<String>,
    pub limit: Option<i64>,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Durably store a message. Returns only once the write is acknowledged.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Read one page of history, oldest first.
    async fn query_messages(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError>;

    /// Every user `user_id` has exchanged private messages with.
    async fn conversation_peers(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// The group membership provider.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn query_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError>;

    async fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        self.query_groups(&GroupFilter {
            member_id: Some(user_id.to_string()),
            ..Default::default()
        })
        .await
    }

    /// The group, if it exists and `user_id` belongs to it.
    async fn group_for_member(
        &self,
        user_id: &str,
        group_id: &str,
    ) -> Result<Option<Group>, StoreError> {
        let groups = self
            .query_groups(&GroupFilter {
                group_id: Some(group_id.to_string()),
                member_id: Some(user_id.to_string()),
            })
            .await?;
        Ok(groups.into_iter().next())
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn query_users(&self, filter: &UserFilter) -> Result<Vec<UserSummary>, StoreError>;

    /// Users who care about `user_id`'s presence (friends/contacts).
    async fn contacts_of(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryData {
    messages: Vec<Message>,
    groups: BTreeMap<String, Group>,
    users: BTreeMap<String, UserSummary>,
    contacts: HashMap<String, BTreeSet<String>>,
}

/// All three directories over one lock-guarded set of maps.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_user(&self, id: &str, display_name: &str) {
        self.data.write().users.insert(
            id.to_string(),
            UserSummary {
                id: id.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }

    pub fn upsert_group(&self, id: &str, name: &str, member_ids: &[&str]) {
        self.data.write().groups.insert(
            id.to_string(),
            Group {
                id: id.to_string(),
                name: name.to_string(),
                description: None,
                member_ids: member_ids.iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    /// Record a symmetric friendship.
    pub fn add_contact(&self, a: &str, b: &str) {
        let mut data = self.data.write();
        data.contacts
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        data.contacts
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    pub fn message_count(&self) -> usize {
        self.data.read().messages.len()
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let message = Message::from(message);
        self.data.write().messages.push(message.clone());
        Ok(message)
    }

    async fn query_messages(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        let data = self.data.read();
        let mut page: Vec<Message> = data
            .messages
            .iter()
            .filter(|m| query.matches(m))
            .cloned()
            .collect();
        page.sort_by_key(|m| std::cmp::Reverse(m.id));
        page.truncate(query.limit.max(0) as usize);
        page.reverse();
        Ok(page)
    }

    async fn conversation_peers(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.read();
        let peers: BTreeSet<String> = data
            .messages
            .iter()
            .filter(|m| m.kind == ChatKind::Private)
            .filter_map(|m| {
                if m.sender_id == user_id {
                    Some(m.receiver_id.clone())
                } else if m.receiver_id == user_id {
                    Some(m.sender_id.clone())
                } else {
                    None
                }
            })
            .collect();
        Ok(peers.into_iter().collect())
    }
}

#[async_trait]
impl GroupDirectory for MemoryStore {
    async fn query_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError> {
        let data = self.data.read();
        Ok(data
            .groups
            .values()
            .filter(|g| filter.group_id.as_ref().map_or(true, |id| &g.id == id))
            .filter(|g| filter.member_id.as_ref().map_or(true, |m| g.has_member(m)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn query_users(&self, filter: &UserFilter) -> Result<Vec<UserSummary>, StoreError> {
        let data = self.data.read();
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE) as usize;
        let mut users: Vec<UserSummary> = data
            .users
            .values()
            .filter(|u| filter.ids.as_ref().map_or(true, |ids| ids.contains(&u.id)))
            .filter(|u| {
                filter
                    .name_prefix
                    .as_ref()
                    .map_or(true, |p| u.display_name.starts_with(p.as_str()))
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        users.truncate(limit);
        Ok(users)
    }

    async fn contacts_of(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .read()
            .contacts
            .get(user_id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default())
    }
}

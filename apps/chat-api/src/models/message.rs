use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Which send path produced a message. Decides how `receiver_id` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// `receiver_id` is a user id.
    Private,
    /// `receiver_id` is a group id.
    Group,
}

impl ChatKind {
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Private => 0,
            Self::Group => 1,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(Self::Private),
            1 => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    #[serde(with = "chat_common::snowflake::as_string")]
    #[schema(value_type = String)]
    pub id: i64,
    pub kind: ChatKind,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A message as handed to the store. The id is minted by the caller so the
/// row is addressable before the write is acknowledged.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: i64,
    pub kind: ChatKind,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<NewMessage> for Message {
    fn from(m: NewMessage) -> Self {
        Self {
            id: m.id,
            kind: m.kind,
            sender_id: m.sender_id,
            receiver_id: m.receiver_id,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

//! Postgres-backed persistence via diesel-async.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::PoolError;

use crate::db::pool::DbPool;
use crate::db::schema::{chat_groups, friendships, group_members, messages, users};
use crate::db::store::{
    GroupDirectory, GroupFilter, MessageQuery, MessageRepository, MessageScope, StoreError,
    UserDirectory, UserFilter, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
use crate::models::group::Group;
use crate::models::message::{ChatKind, Message, NewMessage};
use crate::models::user::UserSummary;

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<PoolError> for StoreError {
    fn from(err: PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct MessageRow {
    id: i64,
    kind: i16,
    sender_id: String,
    receiver_id: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let kind = ChatKind::from_i16(row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("message {} has kind {}", row.id, row.kind)))?;
        Ok(Message {
            id: row.id,
            kind,
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = messages)]
struct NewMessageRow<'a> {
    id: i64,
    kind: i16,
    sender_id: &'a str,
    receiver_id: &'a str,
    content: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = chat_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct GroupRow {
    id: String,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: String,
    display_name: String,
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut conn = self.pool.get().await?;

        let row: MessageRow = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(messages::table)
                .values(NewMessageRow {
                    id: message.id,
                    kind: message.kind.as_i16(),
                    sender_id: &message.sender_id,
                    receiver_id: &message.receiver_id,
                    content: &message.content,
                    created_at: message.created_at,
                })
                .returning(MessageRow::as_returning()),
            &mut conn,
        )
        .await?;

        row.try_into()
    }

    async fn query_messages(&self, query: &MessageQuery) -> Result<Vec<Message>, StoreError> {
        let mut conn = self.pool.get().await?;

        let mut sql = messages::table
            .order(messages::id.desc())
            .limit(query.limit)
            .select(MessageRow::as_select())
            .into_boxed();

        match &query.scope {
            MessageScope::Conversation { user_id, peer_id } => {
                sql = sql
                    .filter(messages::kind.eq(ChatKind::Private.as_i16()))
                    .filter(
                        messages::sender_id
                            .eq(user_id)
                            .and(messages::receiver_id.eq(peer_id))
                            .or(messages::sender_id
                                .eq(peer_id)
                                .and(messages::receiver_id.eq(user_id))),
                    );
            }
            MessageScope::Group { group_id } => {
                sql = sql
                    .filter(messages::kind.eq(ChatKind::Group.as_i16()))
                    .filter(messages::receiver_id.eq(group_id));
            }
        }

        if let Some(before) = query.before {
            sql = sql.filter(messages::id.lt(before));
        }

        let rows: Vec<MessageRow> = diesel_async::RunQueryDsl::load(sql, &mut conn).await?;

        // Newest-first from the index; callers want chronological order.
        rows.into_iter()
            .rev()
            .map(Message::try_from)
            .collect()
    }

    async fn conversation_peers(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let private = ChatKind::Private.as_i16();

        let sent_to: Vec<String> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::kind.eq(private))
                .filter(messages::sender_id.eq(user_id))
                .select(messages::receiver_id)
                .distinct(),
            &mut conn,
        )
        .await?;

        let received_from: Vec<String> = diesel_async::RunQueryDsl::load(
            messages::table
                .filter(messages::kind.eq(private))
                .filter(messages::receiver_id.eq(user_id))
                .select(messages::sender_id)
                .distinct(),
            &mut conn,
        )
        .await?;

        let peers: BTreeSet<String> = sent_to.into_iter().chain(received_from).collect();
        Ok(peers.into_iter().collect())
    }
}

#[async_trait]
impl GroupDirectory for PgStore {
    async fn query_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError> {
        let mut conn = self.pool.get().await?;

        let mut sql = chat_groups::table
            .order(chat_groups::id.asc())
            .select(GroupRow::as_select())
            .into_boxed();

        if let Some(group_id) = &filter.group_id {
            sql = sql.filter(chat_groups::id.eq(group_id));
        }

        if let Some(member_id) = &filter.member_id {
            let member_of: Vec<String> = diesel_async::RunQueryDsl::load(
                group_members::table
                    .filter(group_members::user_id.eq(member_id))
                    .select(group_members::group_id),
                &mut conn,
            )
            .await?;
            if member_of.is_empty() {
                return Ok(Vec::new());
            }
            sql = sql.filter(chat_groups::id.eq_any(member_of));
        }

        let rows: Vec<GroupRow> = diesel_async::RunQueryDsl::load(sql, &mut conn).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let group_ids: Vec<String> = rows.iter().map(|g| g.id.clone()).collect();
        let memberships: Vec<(String, String)> = diesel_async::RunQueryDsl::load(
            group_members::table
                .filter(group_members::group_id.eq_any(&group_ids))
                .select((group_members::group_id, group_members::user_id)),
            &mut conn,
        )
        .await?;

        let mut members: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (group_id, user_id) in memberships {
            members.entry(group_id).or_default().insert(user_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| Group {
                member_ids: members.remove(&row.id).unwrap_or_default(),
                id: row.id,
                name: row.name,
                description: row.description,
            })
            .collect())
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn query_users(&self, filter: &UserFilter) -> Result<Vec<UserSummary>, StoreError> {
        let mut conn = self.pool.get().await?;
        let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let mut sql = users::table
            .order(users::display_name.asc())
            .limit(limit)
            .select(UserRow::as_select())
            .into_boxed();

        if let Some(ids) = &filter.ids {
            sql = sql.filter(users::id.eq_any(ids));
        }
        if let Some(prefix) = &filter.name_prefix {
            sql = sql.filter(users::display_name.like(format!("{}%", escape_like(prefix))));
        }

        let rows: Vec<UserRow> = diesel_async::RunQueryDsl::load(sql, &mut conn).await?;
        Ok(rows
            .into_iter()
            .map(|r| UserSummary {
                id: r.id,
                display_name: r.display_name,
            })
            .collect())
    }

    async fn contacts_of(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.pool.get().await?;
        let contacts: Vec<String> = diesel_async::RunQueryDsl::load(
            friendships::table
                .filter(friendships::user_id.eq(user_id))
                .select(friendships::friend_id),
            &mut conn,
        )
        .await?;
        Ok(contacts)
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_neutralises_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn unknown_kind_is_reported_as_corrupt() {
        let row = MessageRow {
            id: 9,
            kind: 7,
            sender_id: "a".into(),
            receiver_id: "b".into(),
            content: "x".into(),
            created_at: Utc::now(),
        };
        assert!(matches!(Message::try_from(row), Err(StoreError::Corrupt(_))));
    }
}

use std::collections::BTreeSet;

use serde::Serialize;
use utoipa::ToSchema;

/// A chat group as resolved by the membership provider. Read-only to the core.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Vec<String>)]
    pub member_ids: BTreeSet<String>,
}

impl Group {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.member_ids.contains(user_id)
    }
}

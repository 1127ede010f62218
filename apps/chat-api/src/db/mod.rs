pub mod pg;
pub mod pool;
pub mod schema;
pub mod store;

use std::sync::Arc;

use store::{GroupDirectory, MemoryStore, MessageRepository, UserDirectory};

/// Handles onto the persistence collaborators, typically all backed by the
/// same store.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageRepository>,
    pub groups: Arc<dyn GroupDirectory>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            messages: store.clone(),
            groups: store.clone(),
            users: store,
        }
    }

    pub fn postgres(store: pg::PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            messages: store.clone(),
            groups: store.clone(),
            users: store,
        }
    }
}

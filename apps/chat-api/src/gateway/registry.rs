//! Process-wide presence state: which users are online and through which
//! connections.
//!
//! A user has an entry exactly while they own at least one live connection.
//! Every operation takes the single map lock for its whole duration, so the
//! operations are linearizable with respect to each other and `snapshot`
//! is a true point-in-time copy. No lock is ever held across an `.await`;
//! all methods are synchronous.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::models::user::OnlineUser;

/// A user with at least one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedUser {
    pub id: String,
    /// Fixed by the connection that created the entry.
    pub display_name: String,
    pub connection_ids: HashSet<String>,
}

impl From<ConnectedUser> for OnlineUser {
    fn from(user: ConnectedUser) -> Self {
        Self {
            connection_count: user.connection_ids.len(),
            id: user.id,
            display_name: user.display_name,
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    users: RwLock<HashMap<String, ConnectedUser>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live connection for `user_id`, creating the user's entry if
    /// needed.
    ///
    /// Returns `true` when this made the user go from offline to online.
    pub fn add_connection(&self, user_id: &str, connection_id: &str, display_name: &str) -> bool {
        let mut users = self.users.write();
        match users.get_mut(user_id) {
            Some(user) => {
                user.connection_ids.insert(connection_id.to_string());
                false
            }
            None => {
                users.insert(
                    user_id.to_string(),
                    ConnectedUser {
                        id: user_id.to_string(),
                        display_name: display_name.to_string(),
                        connection_ids: HashSet::from([connection_id.to_string()]),
                    },
                );
                true
            }
        }
    }

    /// Drop a connection, removing the user's entry together with its last
    /// connection.
    ///
    /// Returns `true` only when this call took the user offline. Unknown
    /// users and already-removed connections are a no-op returning `false`.
    pub fn remove_connection(&self, user_id: &str, connection_id: &str) -> bool {
        let mut users = self.users.write();
        let Some(user) = users.get_mut(user_id) else {
            return false;
        };
        if !user.connection_ids.remove(connection_id) {
            return false;
        }
        if user.connection_ids.is_empty() {
            users.remove(user_id);
            return true;
        }
        false
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.read().contains_key(user_id)
    }

    /// The user's live connections; empty when offline.
    pub fn list_connections(&self, user_id: &str) -> HashSet<String> {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.connection_ids.clone())
            .unwrap_or_default()
    }

    /// Consistent copy of every online user, ordered by display name then id.
    pub fn snapshot(&self) -> Vec<ConnectedUser> {
        let mut users: Vec<ConnectedUser> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.id.cmp(&b.id))
        });
        users
    }

    pub fn online_count(&self) -> usize {
        self.users.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;

    #[test]
    fn first_connection_is_reported_once_per_online_run() {
        let reg = ConnectionRegistry::new();

        assert!(reg.add_connection("u1", "c1", "Alice"));
        assert!(!reg.add_connection("u1", "c2", "Alice"));
        assert!(!reg.remove_connection("u1", "c1"));
        assert!(reg.remove_connection("u1", "c2"));

        // A new run starts over.
        assert!(reg.add_connection("u1", "c3", "Alice"));
    }

    #[test]
    fn online_iff_connections_non_empty() {
        let reg = ConnectionRegistry::new();
        let steps: &[(bool, &str)] = &[
            (true, "c1"),
            (true, "c2"),
            (false, "c1"),
            (false, "c9"),
            (true, "c3"),
            (false, "c2"),
            (false, "c3"),
            (false, "c3"),
        ];

        for (add, conn) in steps {
            if *add {
                reg.add_connection("u1", conn, "Alice");
            } else {
                reg.remove_connection("u1", conn);
            }
            assert_eq!(reg.is_online("u1"), !reg.list_connections("u1").is_empty());
        }
        assert!(!reg.is_online("u1"));
        assert_eq!(reg.online_count(), 0);
    }

    #[test]
    fn removing_unknown_user_or_connection_is_a_noop() {
        let reg = ConnectionRegistry::new();
        assert!(!reg.remove_connection("ghost", "c1"));

        reg.add_connection("u1", "c1", "Alice");
        assert!(!reg.remove_connection("u1", "other"));
        assert!(reg.is_online("u1"));
    }

    #[test]
    fn double_disconnect_matches_single_disconnect() {
        let reg = ConnectionRegistry::new();
        reg.add_connection("u1", "c1", "Alice");
        reg.add_connection("u1", "c2", "Alice");

        assert!(!reg.remove_connection("u1", "c1"));
        let after_once = reg.snapshot();
        assert!(!reg.remove_connection("u1", "c1"));
        assert_eq!(reg.snapshot(), after_once);
    }

    #[test]
    fn display_name_is_fixed_by_first_connection() {
        let reg = ConnectionRegistry::new();
        reg.add_connection("u1", "c1", "Alice");
        reg.add_connection("u1", "c2", "Renamed");
        assert_eq!(reg.snapshot()[0].display_name, "Alice");
    }

    #[test]
    fn snapshot_is_ordered_and_detached() {
        let reg = ConnectionRegistry::new();
        reg.add_connection("u2", "c2", "Bob");
        reg.add_connection("u1", "c1", "Alice");

        let snap = reg.snapshot();
        reg.remove_connection("u1", "c1");

        let names: Vec<&str> = snap.iter().map(|u| u.display_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
        assert_eq!(reg.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_adds_for_same_user_keep_both_and_report_first_once() {
        for _ in 0..200 {
            let reg = Arc::new(ConnectionRegistry::new());
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = ["c1", "c2"]
                .into_iter()
                .map(|conn| {
                    let reg = reg.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        reg.add_connection("u1", conn, "Alice")
                    })
                })
                .collect();

            let firsts = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|first| *first)
                .count();

            assert_eq!(firsts, 1);
            let conns = reg.list_connections("u1");
            assert!(conns.contains("c1") && conns.contains("c2"));
        }
    }

    #[test]
    fn racing_add_and_remove_never_leaves_empty_entry() {
        for _ in 0..200 {
            let reg = Arc::new(ConnectionRegistry::new());
            reg.add_connection("u1", "c1", "Alice");
            let barrier = Arc::new(Barrier::new(2));

            let adder = {
                let reg = reg.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    reg.add_connection("u1", "c2", "Alice")
                })
            };
            let remover = {
                let reg = reg.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    reg.remove_connection("u1", "c1")
                })
            };

            let became_online = adder.join().unwrap();
            let went_offline = remover.join().unwrap();

            // Either order is fine, but the transitions must pair up and
            // the final state must hold exactly c2.
            assert_eq!(became_online, went_offline);
            assert_eq!(reg.list_connections("u1"), HashSet::from(["c2".to_string()]));
            assert!(reg.snapshot().iter().all(|u| !u.connection_ids.is_empty()));
        }
    }

    #[test]
    fn first_connection_flags_are_independent_across_users() {
        let reg = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                thread::spawn(move || {
                    let user = format!("u{}", i % 4);
                    reg.add_connection(&user, &format!("c{i}"), "name")
                })
            })
            .collect();
        let firsts = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|f| *f)
            .count();
        assert_eq!(firsts, 4);
        assert_eq!(reg.online_count(), 4);
    }
}

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

use super::connctx::{ConnCtx, Outbox};

/// Counts over the live connection set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub unjoined: usize,
    pub rooms: usize,
    pub users: usize,
}

/// Authoritative set of live connections and their room tags.
///
/// All writes go through `register`, `set_folder`, `clear_folder` and
/// `remove`. The in-process implementation is `InMemoryRegistry`; a
/// deployment with several server instances needs one backed by a shared
/// store instead.
pub trait ConnectionRegistry: Send + Sync {
    /// Add an untagged connection. Re-registering an id replaces its
    /// identity and outbox and drops any folder tag.
    fn register(&self, connection_id: &str, user_id: &str, user_name: &str, outbox: Outbox);

    /// Tag a connection with a folder, replacing any previous tag.
    /// Returns false when the connection is unknown.
    fn set_folder(&self, connection_id: &str, folder_id: &str) -> bool;

    /// Untag a connection, returning the folder it was in.
    fn clear_folder(&self, connection_id: &str) -> Option<String>;

    /// Delete a connection. Safe to call on ids already removed.
    fn remove(&self, connection_id: &str) -> Option<ConnCtx>;

    fn get(&self, connection_id: &str) -> Option<ConnCtx>;

    /// Connections tagged with `folder_id`, in the order they joined.
    fn list_by_folder(&self, folder_id: &str) -> Vec<ConnCtx>;

    fn outbox(&self, connection_id: &str) -> Option<Outbox>;

    /// Ids of every folder with at least one connection.
    fn folders(&self) -> Vec<String>;

    fn stats(&self) -> RegistryStats;
}

struct ConnEntry {
    ctx: ConnCtx,
    outbox: Outbox,
    joined_seq: u64,
}

#[derive(Default)]
struct Inner {
    conns: IndexMap<String, ConnEntry>,
    next_seq: u64,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    inner: Mutex<Inner>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for InMemoryRegistry {
    fn register(&self, connection_id: &str, user_id: &str, user_name: &str, outbox: Outbox) {
        let mut inner = self.inner.lock();
        let entry = ConnEntry {
            ctx: ConnCtx {
                connection_id: connection_id.to_string(),
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                folder_id: None,
            },
            outbox,
            joined_seq: 0,
        };
        inner.conns.insert(connection_id.to_string(), entry);
        debug!("Registered connection {} for user {}", connection_id, user_id);
    }

    fn set_folder(&self, connection_id: &str, folder_id: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.next_seq += 1;
        let seq = inner.next_seq;
        match inner.conns.get_mut(connection_id) {
            Some(entry) => {
                // re-joining the same room keeps the original position
                if entry.ctx.folder_id.as_deref() != Some(folder_id) {
                    entry.ctx.folder_id = Some(folder_id.to_string());
                    entry.joined_seq = seq;
                }
                true
            }
            None => {
                debug!("set_folder on unknown connection {}", connection_id);
                false
            }
        }
    }

    fn clear_folder(&self, connection_id: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        inner
            .conns
            .get_mut(connection_id)
            .and_then(|entry| entry.ctx.folder_id.take())
    }

    fn remove(&self, connection_id: &str) -> Option<ConnCtx> {
        let mut inner = self.inner.lock();
        // shift_remove keeps the remaining entries in registration order
        inner.conns.shift_remove(connection_id).map(|entry| entry.ctx)
    }

    fn get(&self, connection_id: &str) -> Option<ConnCtx> {
        self.inner.lock().conns.get(connection_id).map(|e| e.ctx.clone())
    }

    fn list_by_folder(&self, folder_id: &str) -> Vec<ConnCtx> {
        let inner = self.inner.lock();
        let mut tagged: Vec<&ConnEntry> = inner
            .conns
            .values()
            .filter(|e| e.ctx.folder_id.as_deref() == Some(folder_id))
            .collect();
        tagged.sort_by_key(|e| e.joined_seq);
        tagged.into_iter().map(|e| e.ctx.clone()).collect()
    }

    fn outbox(&self, connection_id: &str) -> Option<Outbox> {
        self.inner.lock().conns.get(connection_id).map(|e| e.outbox.clone())
    }

    fn folders(&self) -> Vec<String> {
        let inner = self.inner.lock();
        let mut seen = HashSet::new();
        inner
            .conns
            .values()
            .filter_map(|e| e.ctx.folder_id.clone())
            .filter(|f| seen.insert(f.clone()))
            .collect()
    }

    fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let mut rooms = HashSet::new();
        let mut users = HashSet::new();
        let mut unjoined = 0;
        for entry in inner.conns.values() {
            users.insert(entry.ctx.user_id.as_str());
            match &entry.ctx.folder_id {
                Some(folder) => {
                    rooms.insert(folder.as_str());
                }
                None => unjoined += 1,
            }
        }
        RegistryStats {
            connections: inner.conns.len(),
            unjoined,
            rooms: rooms.len(),
            users: users.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(reg: &InMemoryRegistry, conn: &str, user: &str) {
        let (outbox, _rx) = Outbox::channel();
        reg.register(conn, user, &user.to_uppercase(), outbox);
    }

    #[test]
    fn register_starts_untagged() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        let ctx = reg.get("c1").unwrap();
        assert_eq!(ctx.folder_id, None);
        assert_eq!(ctx.user_name, "A");
    }

    #[test]
    fn set_folder_overwrites_previous_tag() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        assert!(reg.set_folder("c1", "f1"));
        assert!(reg.set_folder("c1", "f2"));
        assert!(reg.list_by_folder("f1").is_empty());
        assert_eq!(reg.list_by_folder("f2").len(), 1);
    }

    #[test]
    fn set_folder_on_unknown_connection_is_noop() {
        let reg = InMemoryRegistry::new();
        assert!(!reg.set_folder("ghost", "f1"));
        assert!(reg.list_by_folder("f1").is_empty());
    }

    #[test]
    fn remove_twice_is_idempotent() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        register(&reg, "c2", "b");
        reg.set_folder("c1", "f1");
        assert!(reg.remove("c1").is_some());
        let after_first = reg.stats();
        assert!(reg.remove("c1").is_none());
        assert_eq!(reg.stats(), after_first);
        assert_eq!(after_first.connections, 1);
    }

    #[test]
    fn list_by_folder_follows_join_order() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        register(&reg, "c2", "b");
        reg.set_folder("c2", "f1");
        reg.set_folder("c1", "f1");
        let ids: Vec<String> = reg.list_by_folder("f1").into_iter().map(|c| c.connection_id).collect();
        assert_eq!(ids, vec!["c2", "c1"]);
    }

    #[test]
    fn clear_folder_keeps_connection() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        reg.set_folder("c1", "f1");
        assert_eq!(reg.clear_folder("c1").as_deref(), Some("f1"));
        assert_eq!(reg.clear_folder("c1"), None);
        assert!(reg.get("c1").is_some());
        assert_eq!(reg.stats().unjoined, 1);
    }

    #[test]
    fn stats_count_distinct_rooms_and_users() {
        let reg = InMemoryRegistry::new();
        register(&reg, "c1", "a");
        register(&reg, "c2", "a");
        register(&reg, "c3", "b");
        reg.set_folder("c1", "f1");
        reg.set_folder("c2", "f1");
        reg.set_folder("c3", "f2");
        let stats = reg.stats();
        assert_eq!(stats.connections, 3);
        assert_eq!(stats.rooms, 2);
        assert_eq!(stats.users, 2);
        let mut folders = reg.folders();
        folders.sort();
        assert_eq!(folders, vec!["f1", "f2"]);
    }
}

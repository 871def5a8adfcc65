use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

pub mod session;
pub mod sqlite;

pub use session::SessionStore;
pub use sqlite::SqliteStore;

/// One tier of key-value storage. Values are opaque strings; callers
/// serialize and deserialize JSON themselves.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// Two-tier facade: the durable tier is tried first, the session tier on any
/// failure, and when both fail the operation is a silent no-op. Storage
/// unavailability must never crash the app.
pub struct TieredStorage {
    primary: Box<dyn KeyValueBackend>,
    session: Box<dyn KeyValueBackend>,
}

impl TieredStorage {
    pub fn new(primary: Box<dyn KeyValueBackend>, session: Box<dyn KeyValueBackend>) -> Self {
        Self { primary, session }
    }

    /// Opens the durable SQLite tier at `db_path`, degrading to a second
    /// in-process tier when the file cannot be opened.
    pub fn open(db_path: &Path) -> Self {
        let primary: Box<dyn KeyValueBackend> = match SqliteStore::open(db_path) {
            Ok(store) => Box::new(store),
            Err(e) => {
                log::error!("failed to open durable store, running session-only: {}", e);
                Box::new(SessionStore::new())
            }
        };
        Self::new(primary, Box::new(SessionStore::new()))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match self.primary.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("primary store get failed for {}: {}", key, e);
                self.session.get(key).ok().flatten()
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.primary.set(key, value) {
            log::warn!("primary store set failed for {}: {}", key, e);
            if let Err(e2) = self.session.set(key, value) {
                log::error!("session store set failed for {}: {}", key, e2);
            }
        }
    }

    /// Removes from both tiers so a value parked in the session tier during an
    /// outage does not resurface.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.primary.remove(key) {
            log::warn!("primary store remove failed for {}: {}", key, e);
        }
        if let Err(e) = self.session.remove(key) {
            log::warn!("session store remove failed for {}: {}", key, e);
        }
    }

    /// Removes every key starting with `prefix` from both tiers.
    pub fn clear_by_prefix(&self, prefix: &str) {
        for backend in [&self.primary, &self.session] {
            let keys = match backend.keys() {
                Ok(keys) => keys,
                Err(e) => {
                    log::warn!("store enumeration failed during clear: {}", e);
                    continue;
                }
            };
            for key in keys.iter().filter(|k| k.starts_with(prefix)) {
                if let Err(e) = backend.remove(key) {
                    log::warn!("store remove failed for {} during clear: {}", key, e);
                }
            }
        }
    }

    /// Snapshot of every prefixed key across both tiers, durable tier taking
    /// precedence for values present in both.
    pub fn export_by_prefix(&self, prefix: &str) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for backend in [&self.session, &self.primary] {
            let keys = match backend.keys() {
                Ok(keys) => keys,
                Err(e) => {
                    log::warn!("store enumeration failed during export: {}", e);
                    continue;
                }
            };
            for key in keys.into_iter().filter(|k| k.starts_with(prefix)) {
                if let Ok(Some(value)) = backend.get(&key) {
                    out.insert(key, value);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails every call, to exercise the fallback path.
    struct BrokenStore;

    impl KeyValueBackend for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("quota exceeded"))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow::anyhow!("quota exceeded"))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow::anyhow!("quota exceeded"))
        }
        fn keys(&self) -> Result<Vec<String>> {
            Err(anyhow::anyhow!("quota exceeded"))
        }
    }

    #[test]
    fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("kv.db")).unwrap();
        store.set("reboot_a", "1").unwrap();
        store.set("reboot_a", "2").unwrap();
        assert_eq!(store.get("reboot_a").unwrap().as_deref(), Some("2"));
        store.remove("reboot_a").unwrap();
        assert_eq!(store.get("reboot_a").unwrap(), None);
    }

    #[test]
    fn falls_back_to_session_tier() {
        let storage = TieredStorage::new(Box::new(BrokenStore), Box::new(SessionStore::new()));
        storage.set("reboot_key", "value");
        assert_eq!(storage.get("reboot_key").as_deref(), Some("value"));
    }

    #[test]
    fn both_tiers_broken_is_a_silent_noop() {
        let storage = TieredStorage::new(Box::new(BrokenStore), Box::new(BrokenStore));
        storage.set("reboot_key", "value");
        assert_eq!(storage.get("reboot_key"), None);
        storage.remove("reboot_key");
        storage.clear_by_prefix("reboot_");
    }

    #[test]
    fn clear_by_prefix_spans_both_tiers() {
        let storage = TieredStorage::new(
            Box::new(SqliteStore::open_in_memory().unwrap()),
            Box::new(SessionStore::new()),
        );
        storage.primary.set("reboot_keep", "1").unwrap();
        storage.session.set("reboot_orphan", "2").unwrap();
        storage.set("other_untouched", "3");

        storage.clear_by_prefix("reboot_");
        assert_eq!(storage.get("reboot_keep"), None);
        assert_eq!(storage.session.get("reboot_orphan").unwrap(), None);
        assert_eq!(storage.get("other_untouched").as_deref(), Some("3"));
    }

    #[test]
    fn export_prefers_primary_values() {
        let storage = TieredStorage::new(
            Box::new(SqliteStore::open_in_memory().unwrap()),
            Box::new(SessionStore::new()),
        );
        storage.primary.set("reboot_a", "primary").unwrap();
        storage.session.set("reboot_a", "stale").unwrap();
        storage.session.set("reboot_b", "session-only").unwrap();

        let exported = storage.export_by_prefix("reboot_");
        assert_eq!(exported.get("reboot_a").map(String::as_str), Some("primary"));
        assert_eq!(
            exported.get("reboot_b").map(String::as_str),
            Some("session-only")
        );
    }
}

//! Persistence of player records.
//!
//! Records live under `<namespace>:players:<id>` (the player as JSON) and
//! `<namespace>:nameRef:<name>` (the owning id as a JSON string). Writes the
//! store cannot take yet (none attached, or a failed `set`) wait in an
//! [`OfflineQueue`]. Every later write goes behind them, and the queue is
//! retried oldest first on [`Persister::attach`] and on each write.

use std::collections::BTreeMap;

use quizrelay_core::types::Player;
use quizrelay_link::OfflineQueue;
use serde::Serialize;

use crate::error::StoreError;

/// Opaque key-value service.
pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Keys matching `pattern`; a trailing `*` matches any suffix.
    fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let keys = match pattern.strip_suffix('*') {
            Some(prefix) => self
                .entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect(),
            None => self
                .entries
                .keys()
                .filter(|k| k.as_str() == pattern)
                .cloned()
                .collect(),
        };
        Ok(keys)
    }
}

// ─── Persister ────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Persister<S> {
    namespace: String,
    store: Option<S>,
    /// `(key, serialized value)` pairs waiting for a store.
    backlog: OfflineQueue<(String, String)>,
}

impl<S: KvStore> Persister<S> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store: None,
            backlog: OfflineQueue::new(),
        }
    }

    /// Attach a store and flush the backlog into it. Returns the number of
    /// records flushed.
    pub fn attach(&mut self, store: S) -> usize {
        self.store = Some(store);
        let flushed = self.flush();
        if flushed > 0 {
            tracing::info!(flushed, remaining = self.backlog.len(), "store backlog flushed");
        }
        flushed
    }

    fn flush(&mut self) -> usize {
        let Some(store) = self.store.as_mut() else {
            return 0;
        };
        self.backlog.drain(|(key, value)| match store.set(&key, &value) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "store write failed, keeping in backlog");
                Err((key, value))
            }
        })
    }

    pub fn put_player(&mut self, player: &Player) {
        self.put(&format!("players:{}", player.id()), player);
    }

    pub fn put_name_ref(&mut self, player: &Player) {
        self.put(&format!("nameRef:{}", player.name()), player.id());
    }

    /// Serialize and write `value` under `<namespace>:<suffix>`. A value that
    /// cannot be serialized is logged and dropped.
    pub fn put<T: Serialize + ?Sized>(&mut self, suffix: &str, value: &T) {
        let key = format!("{}:{suffix}", self.namespace);
        let value = match serde_json::to_string(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "record not serializable, dropped");
                return;
            }
        };

        self.backlog.enqueue((key, value));
        self.flush();
    }

    /// Read every player record. Unreadable records are logged and skipped.
    pub fn load_players(&self) -> Result<Vec<Player>, StoreError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(Vec::new());
        };

        let mut players = Vec::new();
        for key in store.keys(&format!("{}:players:*", self.namespace))? {
            let Some(raw) = store.get(&key)? else {
                continue;
            };
            match serde_json::from_str::<Player>(&raw) {
                Ok(player) => players.push(player),
                Err(source) => {
                    let e = StoreError::Corrupt { key, source };
                    tracing::warn!(error = %e, "skipping player record");
                }
            }
        }
        Ok(players)
    }

    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizrelay_core::types::PlayerId;

    /// Store that refuses writes until opened.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        open: bool,
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }
        fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            if !self.open {
                return Err(StoreError::Unavailable("closed".into()));
            }
            self.inner.set(key, value)
        }
        fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            self.inner.keys(pattern)
        }
    }

    fn alice() -> Player {
        Player::new(PlayerId::new("+100"), "Alice")
    }

    #[test]
    fn keys_are_namespaced() {
        let mut p = Persister::new("quiz");
        p.attach(MemoryStore::new());
        p.put_player(&alice());
        p.put_name_ref(&alice());

        let store = p.store().unwrap();
        assert!(store.get("quiz:players:+100").unwrap().is_some());
        assert_eq!(
            store.get("quiz:nameRef:Alice").unwrap().as_deref(),
            Some("\"+100\"")
        );
    }

    #[test]
    fn writes_before_attach_are_flushed_in_order() {
        let mut p: Persister<MemoryStore> = Persister::new("quiz");
        p.put("a", &1);
        p.put("a", &2);
        assert_eq!(p.backlog(), 2);

        assert_eq!(p.attach(MemoryStore::new()), 2);
        assert_eq!(p.backlog(), 0);
        // Last write wins because replay kept the order.
        assert_eq!(p.store().unwrap().get("quiz:a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn failed_writes_stay_queued() {
        let mut p = Persister::new("quiz");
        p.attach(FlakyStore::default());
        p.put_player(&alice());
        assert_eq!(p.backlog(), 1);

        let mut open = FlakyStore::default();
        open.open = true;
        assert_eq!(p.attach(open), 1);
        assert_eq!(p.load_players().unwrap(), vec![alice()]);
    }

    #[test]
    fn backlog_retried_on_next_write_keeps_newest_value() {
        let mut p = Persister::new("quiz");
        p.attach(FlakyStore::default());
        p.put("a", "old");
        assert_eq!(p.backlog(), 1);

        p.store.as_mut().unwrap().open = true;
        p.put("a", "new");
        assert_eq!(p.backlog(), 0);
        assert_eq!(
            p.store().unwrap().get("quiz:a").unwrap().as_deref(),
            Some("\"new\"")
        );
    }

    #[test]
    fn writes_behind_a_stalled_backlog_wait_their_turn() {
        let mut p = Persister::new("quiz");
        p.attach(FlakyStore::default());
        p.put("a", "old");
        p.put("a", "new");
        assert_eq!(p.backlog(), 2);
        assert_eq!(p.store().unwrap().get("quiz:a").unwrap(), None);

        let mut open = FlakyStore::default();
        open.open = true;
        assert_eq!(p.attach(open), 2);
        assert_eq!(
            p.store().unwrap().get("quiz:a").unwrap().as_deref(),
            Some("\"new\"")
        );
    }

    #[test]
    fn corrupt_records_are_skipped() {
        let mut store = MemoryStore::new();
        store.set("quiz:players:bad", "{not json").unwrap();
        store
            .set("quiz:players:+100", &serde_json::to_string(&alice()).unwrap())
            .unwrap();
        store.set("other:players:+200", "{}").unwrap();

        let mut p = Persister::new("quiz");
        p.attach(store);
        assert_eq!(p.load_players().unwrap(), vec![alice()]);
    }

    #[test]
    fn memory_store_exact_key_pattern() {
        let mut store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.set("ab", "2").unwrap();
        assert_eq!(store.keys("a").unwrap(), ["a"]);
        assert_eq!(store.keys("a*").unwrap(), ["a", "ab"]);
    }
}

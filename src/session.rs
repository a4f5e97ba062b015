use crate::shopping_list::ShoppingList;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Default session lifetime: 24 hours of inactivity.
pub const SESSION_DURATION_SECS: u64 = 24 * 60 * 60;

/// Everything the application keeps per browser session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub shopping_list: ShoppingList,

    /// One-time notifications shown on the next rendered page.
    #[serde(default)]
    pub flashes: Vec<String>,
}

impl SessionData {
    /// Queue a message for the next rendered page.
    pub fn flash(&mut self, message: impl Into<String>) {
        self.flashes.push(message.into());
    }

    /// Drain all queued messages.
    pub fn take_flashes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flashes)
    }
}

/// Generate a fresh, unguessable session id.
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Keyed storage for per-session state.
///
/// Unknown or expired ids behave like a brand new, empty session.
pub trait SessionStore: Send + Sync {
    /// Snapshot of a session's data.
    fn get(&self, session_id: &str) -> SessionData;

    /// Replace a session's data.
    fn set(&self, session_id: &str, data: SessionData);

    /// Read-modify-write a session's data as one step.
    fn mutate(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionData));

    /// Drop every expired session. Returns how many were dropped.
    fn purge_expired(&self) -> usize;
}

/// Run `f` against a session's data through [`SessionStore::mutate`] and
/// hand back its result.
pub fn with_session<R>(
    store: &dyn SessionStore,
    session_id: &str,
    f: impl FnOnce(&mut SessionData) -> R,
) -> R {
    let mut f = Some(f);
    let mut result = None;
    store.mutate(session_id, &mut |data| {
        if let Some(f) = f.take() {
            result = Some(f(data));
        }
    });
    match (result, f) {
        (Some(result), _) => result,
        // store never called back: behave like a fresh session
        (None, Some(f)) => f(&mut SessionData::default()),
        (None, None) => unreachable!("session callback ran without a result"),
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: SessionData,
    expires_at: DateTime<Utc>,
}

/// In-process session store. Sessions expire after a period of inactivity.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(SESSION_DURATION_SECS)
    }
}

impl MemorySessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        MemorySessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl: Duration::try_seconds(ttl_secs).unwrap_or(Duration::MAX),
        }
    }

    /// Number of sessions currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session_id: &str) -> SessionData {
        let sessions = self.sessions.read();
        match sessions.get(session_id) {
            Some(entry) if entry.expires_at > Utc::now() => entry.data.clone(),
            _ => SessionData::default(),
        }
    }

    fn set(&self, session_id: &str, data: SessionData) {
        let now = Utc::now();
        let expires_at = self.expiry_from(now);
        let mut sessions = self.sessions.write();
        if !sessions.contains_key(session_id) {
            sessions.retain(|_, entry| entry.expires_at > now);
        }
        sessions.insert(session_id.to_string(), Entry { data, expires_at });
    }

    fn mutate(&self, session_id: &str, f: &mut dyn FnMut(&mut SessionData)) {
        let now = Utc::now();
        let expires_at = self.expiry_from(now);
        let mut sessions = self.sessions.write();

        if !sessions.contains_key(session_id) {
            sessions.retain(|_, entry| entry.expires_at > now);
            log::debug!("Starting session {}", session_id);
        }

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Entry {
                data: SessionData::default(),
                expires_at,
            });
        if entry.expires_at <= now {
            entry.data = SessionData::default();
        }
        entry.expires_at = expires_at;
        f(&mut entry.data);
    }

    fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_is_empty() {
        let store = MemorySessionStore::default();
        assert_eq!(store.get("nope"), SessionData::default());
        assert!(store.is_empty());
    }

    #[test]
    fn mutate_creates_and_persists() {
        let store = MemorySessionStore::default();
        let id = new_session_id();

        let count = with_session(&store, &id, |data| {
            data.shopping_list = ShoppingList::from_iter([("A1", 2)]);
            data.flash("Added 2 x A1 to your shopping list.");
            data.shopping_list.len()
        });
        assert_eq!(count, 1);

        let data = store.get(&id);
        assert_eq!(data.shopping_list.get("A1"), Some(2));
        assert_eq!(data.flashes.len(), 1);
    }

    #[test]
    fn flashes_are_taken_once() {
        let store = MemorySessionStore::default();
        store.set(
            "s1",
            SessionData {
                flashes: vec!["hello".to_string()],
                ..SessionData::default()
            },
        );

        let first = with_session(&store, "s1", |data| data.take_flashes());
        let second = with_session(&store, "s1", |data| data.take_flashes());
        assert_eq!(first, vec!["hello".to_string()]);
        assert!(second.is_empty());
    }

    #[test]
    fn expired_sessions_read_as_empty_and_are_purged() {
        let store = MemorySessionStore::new(0);
        store.set(
            "old",
            SessionData {
                shopping_list: ShoppingList::from_iter([("A1", 1)]),
                flashes: Vec::new(),
            },
        );

        assert_eq!(store.get("old"), SessionData::default());
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = MemorySessionStore::default();
        with_session(&store, "a", |data| data.flash("for a"));

        assert!(store.get("b").flashes.is_empty());
        assert_eq!(store.get("a").flashes, vec!["for a".to_string()]);
    }
}

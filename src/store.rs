//! Host preference storage
//!
//! The dispatcher persists a small set of values (last used account, user
//! token) so tracking can resume after a process restart. Hosts supply the
//! durable storage; the dispatcher depends only on this narrow key-value
//! interface.

use std::collections::HashMap;

/// Store key for the last initialized account id
pub const KEY_LAST_USED_ACCOUNT_ID: &str = "last_used_account_id";
/// Store key for the last initialized domain
pub const KEY_LAST_USED_DOMAIN: &str = "last_used_domain";
/// Store key for the per-install user token
pub const KEY_USER_TOKEN: &str = "user_token";

/// String key-value storage supplied by the host.
///
/// Implementations are expected to behave like mobile preference APIs:
/// best-effort and infallible at this interface, with a `get` after a lost
/// write simply returning nothing.
pub trait PreferenceStore {
    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value
    fn put(&mut self, key: &str, value: &str);

    /// Delete the value stored under `key`, if any
    fn remove(&mut self, key: &str);
}

/// In-memory store for hosts without durable preferences, and for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferenceStore {
    values: HashMap<String, String>,
}

impl MemoryPreferenceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let mut store = MemoryPreferenceStore::new();
        assert_eq!(store.get(KEY_LAST_USED_ACCOUNT_ID), None);

        store.put(KEY_LAST_USED_ACCOUNT_ID, "acct-1");
        assert_eq!(
            store.get(KEY_LAST_USED_ACCOUNT_ID),
            Some("acct-1".to_string())
        );

        store.remove(KEY_LAST_USED_ACCOUNT_ID);
        assert_eq!(store.get(KEY_LAST_USED_ACCOUNT_ID), None);
    }

    #[test]
    fn test_put_replaces_previous_value() {
        let mut store = MemoryPreferenceStore::new();
        store.put(KEY_USER_TOKEN, "tok-a");
        store.put(KEY_USER_TOKEN, "tok-b");
        assert_eq!(store.get(KEY_USER_TOKEN), Some("tok-b".to_string()));
    }
}

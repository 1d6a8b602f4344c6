//! Key/value session storage injected into transports

use dashmap::DashMap;

/// Where session values such as the XSRF token live
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    values: DashMap<String, String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&self) {
        self.values.clear();
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|value| value.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_session_store() {
        let store = MemorySessionStore::new();
        assert!(!store.has("XSRF-TOKEN"));

        store.set("XSRF-TOKEN", "abc".to_string());
        assert_eq!(store.get("XSRF-TOKEN").as_deref(), Some("abc"));
        assert_eq!(store.len(), 1);

        store.remove("XSRF-TOKEN");
        assert!(store.is_empty());
    }
}

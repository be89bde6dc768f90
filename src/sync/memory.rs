use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ SharedStore, StoreEvent, EVENT_CAPACITY };
use crate::error::Result;

/// In-process store. Every session sharing one `Arc<MemoryStore>` behaves like
/// a tab of the same origin.
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            events,
        }
    }

    fn notify(&self, origin: Uuid, key: &str, value: Option<String>) {
        // no subscribers is fine
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value,
            origin,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, origin: Uuid, key: &str, value: &str) -> Result<()> {
        {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            if values.get(key).map(String::as_str) == Some(value) {
                return Ok(());
            }
            values.insert(key.to_string(), value.to_string());
        }
        self.notify(origin, key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, origin: Uuid, key: &str) -> Result<()> {
        let removed = {
            let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
            values.remove(key).is_some()
        };
        if removed {
            self.notify(origin, key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_notify_subscribers() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();
        let tab = Uuid::new_v4();

        store.set(tab, "threadId", "t-1").await.unwrap();
        assert_eq!(store.get("threadId").await.unwrap().as_deref(), Some("t-1"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.key, "threadId");
        assert_eq!(event.value.as_deref(), Some("t-1"));
        assert_eq!(event.origin, tab);

        store.remove(tab, "threadId").await.unwrap();
        assert_eq!(rx.recv().await.unwrap().value, None);
        assert_eq!(store.get("threadId").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unchanged_values_do_not_notify() {
        let store = MemoryStore::new();
        let tab = Uuid::new_v4();
        store.set(tab, "miniChatOpen", "true").await.unwrap();
        let mut rx = store.subscribe();
        store.set(tab, "miniChatOpen", "true").await.unwrap();
        store.remove(tab, "missing").await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}

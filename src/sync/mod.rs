mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use log::info;
use serde::{ Deserialize, Serialize };
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::cli::StoreArgs;
use crate::error::{ Error, Result };

pub const THREAD_ID: &str = "threadId";
pub const CHAT_MESSAGES: &str = "chatMessages";
pub const MINI_CHAT_OPEN: &str = "miniChatOpen";
pub const HAD_CHAT_INTERACTION: &str = "hadChatInteraction";
pub const CHAT_ENDING: &str = "chatEnding";

const EVENT_CAPACITY: usize = 256;

/// Change notification. `value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub key: String,
    pub value: Option<String>,
    pub origin: Uuid,
}

/// Key-value store shared by every tab, with change notifications.
///
/// Writes are tagged with the writing tab so a tab can ignore its own echoes.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, origin: Uuid, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, origin: Uuid, key: &str) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

pub async fn create_store(args: &StoreArgs) -> Result<Arc<dyn SharedStore>> {
    match args.store_type.to_lowercase().as_str() {
        "memory" => {
            info!("Shared state is held in memory (single process)");
            Ok(Arc::new(MemoryStore::new()))
        }
        "redis" => {
            info!("Shared state is held in redis at {}", args.store_host);
            let store = RedisStore::connect(&args.store_host, &args.store_redis_prefix).await?;
            Ok(Arc::new(store))
        }
        _ => Err(Error::UnsupportedStore(args.store_type.clone())),
    }
}

pub mod client;
pub mod fallback;
pub mod stream;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use log::{ debug, info, warn };
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ Error, Result };
use crate::models::chat::ChatMessage;
use crate::sync::{
    SharedStore,
    StoreEvent,
    CHAT_ENDING,
    CHAT_MESSAGES,
    HAD_CHAT_INTERACTION,
    MINI_CHAT_OPEN,
    THREAD_ID,
};
use self::fallback::FallbackRotation;
use self::stream::DeltaStream;

/// The view keeps following new content while within this many pixels of the bottom.
pub const FOLLOW_THRESHOLD_PX: f64 = 50.0;

/// A foreign end-flow flag older than this is treated as abandoned.
pub const ENDING_LEASE_MS: i64 = 30_000;

pub fn should_follow(distance_from_bottom: f64) -> bool {
    distance_from_bottom <= FOLLOW_THRESHOLD_PX
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Good,
    Bad,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Good => write!(f, "good"),
            Feedback::Bad => write!(f, "bad"),
        }
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "good" => Ok(Feedback::Good),
            "bad" => Ok(Feedback::Bad),
            _ => Err(format!("Invalid feedback: '{}' (expected good or bad)", s)),
        }
    }
}

pub struct ChatStream {
    pub thread_id: Option<String>,
    pub deltas: DeltaStream,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        thread_id: Option<&str>
    ) -> Result<ChatStream>;

    async fn resolve_session(&self, thread_id: &str, feedback: Feedback) -> Result<()>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
    Ending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageChange {
    Appended(ChatMessage),
    Updated(ChatMessage),
    Removed(ChatMessage),
}

/// Holder of the shared end-flow flag: `"<tab id>:<millis>"`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct EndingFlag {
    owner: Uuid,
    since: i64,
}

impl EndingFlag {
    fn parse(value: &str) -> Option<Self> {
        let (owner, since) = value.split_once(':')?;
        Some(Self {
            owner: owner.parse().ok()?,
            since: since.parse().ok()?,
        })
    }

    fn encode(&self) -> String {
        format!("{}:{}", self.owner, self.since)
    }

    fn is_live(&self, now: i64) -> bool {
        now - self.since < ENDING_LEASE_MS
    }
}

/// Chat state for one tab. Every mutation is written through to the shared
/// store; peers' writes arrive through [`ChatSession::handle_event`].
pub struct ChatSession {
    tab_id: Uuid,
    store: Arc<dyn SharedStore>,
    api: Arc<dyn ChatApi>,
    state: ChatState,
    messages: Vec<ChatMessage>,
    thread_id: Option<String>,
    open: bool,
    had_interaction: bool,
    peer_ending: bool,
    fallback: FallbackRotation,
}

impl ChatSession {
    pub async fn open(store: Arc<dyn SharedStore>, api: Arc<dyn ChatApi>) -> Result<Self> {
        let tab_id = Uuid::new_v4();
        let mut session = Self {
            tab_id,
            store,
            api,
            state: ChatState::Idle,
            messages: Vec::new(),
            thread_id: None,
            open: false,
            had_interaction: false,
            peer_ending: false,
            fallback: FallbackRotation::starting_at(tab_id.as_bytes()[0] as usize),
        };
        session.reload().await?;
        info!("Chat tab {} opened with {} stored messages", tab_id, session.messages.len());
        Ok(session)
    }

    async fn reload(&mut self) -> Result<()> {
        self.messages = self.load_messages().await?;
        self.thread_id = self.store.get(THREAD_ID).await?.filter(|t| !t.is_empty());
        self.open = self.store.get(MINI_CHAT_OPEN).await?.as_deref() == Some("true");
        self.had_interaction = self.store.get(HAD_CHAT_INTERACTION).await?.as_deref() == Some("true");
        let flag = self.store.get(CHAT_ENDING).await?;
        self.peer_ending = self.held_by_peer(flag.as_deref());
        Ok(())
    }

    /// A live end-flow flag owned by another tab.
    fn held_by_peer(&self, flag: Option<&str>) -> bool {
        let now = Utc::now().timestamp_millis();
        flag.and_then(EndingFlag::parse).map_or(false, |flag| flag.owner != self.tab_id && flag.is_live(now))
    }

    async fn load_messages(&self) -> Result<Vec<ChatMessage>> {
        let Some(raw) = self.store.get(CHAT_MESSAGES).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<ChatMessage>>(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!("Stored chat messages are corrupt, resetting: {}", e);
                self.store.remove(self.tab_id, CHAT_MESSAGES).await?;
                Ok(Vec::new())
            }
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn had_interaction(&self) -> bool {
        self.had_interaction
    }

    /// Another tab is currently ending the session.
    pub fn is_peer_ending(&self) -> bool {
        self.peer_ending
    }

    async fn persist_messages(&self) -> Result<()> {
        let json = serde_json::to_string(&self.messages)?;
        self.store.set(self.tab_id, CHAT_MESSAGES, &json).await
    }

    async fn set_thread_id(&mut self, thread_id: String) -> Result<()> {
        if self.thread_id.as_deref() == Some(thread_id.as_str()) {
            return Ok(());
        }
        self.store.set(self.tab_id, THREAD_ID, &thread_id).await?;
        self.thread_id = Some(thread_id);
        Ok(())
    }

    pub async fn set_open(&mut self, open: bool) -> Result<()> {
        self.open = open;
        self.store.set(self.tab_id, MINI_CHAT_OPEN, if open { "true" } else { "false" }).await
    }

    pub async fn append(&mut self, message: ChatMessage) -> Result<()> {
        self.messages.push(message);
        self.persist_messages().await
    }

    /// Sends a user message and streams the reply into a new assistant
    /// message, calling `on_delta` with each piece of text as it lands.
    /// Transport failures never surface as errors here: the reply is replaced
    /// by a canned fallback if nothing arrived, or kept partial otherwise.
    pub async fn send<F>(&mut self, text: &str, mut on_delta: F) -> Result<ChatMessage>
        where F: FnMut(&str) + Send
    {
        if self.state != ChatState::Idle {
            return Err(Error::Busy(self.state));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        self.state = ChatState::Sending;
        let result = self.exchange(text, &mut on_delta).await;
        self.state = ChatState::Idle;
        result
    }

    async fn exchange<F>(&mut self, text: &str, on_delta: &mut F) -> Result<ChatMessage>
        where F: FnMut(&str) + Send
    {
        self.append(ChatMessage::user(text)).await?;
        if !self.had_interaction {
            self.had_interaction = true;
            self.store.set(self.tab_id, HAD_CHAT_INTERACTION, "true").await?;
        }

        let opened = self.api.stream_chat(&self.messages, self.thread_id.as_deref()).await;

        self.state = ChatState::Streaming;
        self.messages.push(ChatMessage::assistant(""));
        let reply = self.messages.len() - 1;

        // the reply is never left empty, even when a store write fails
        let streamed = self.stream_reply(reply, opened, on_delta).await;
        if self.messages[reply].content.is_empty() {
            let fallback = self.fallback.next_message();
            self.messages[reply].content.push_str(fallback);
            on_delta(fallback);
        }
        let persisted = self.persist_messages().await;
        streamed?;
        persisted?;
        Ok(self.messages[reply].clone())
    }

    async fn stream_reply<F>(
        &mut self,
        reply: usize,
        opened: Result<ChatStream>,
        on_delta: &mut F
    ) -> Result<()>
        where F: FnMut(&str) + Send
    {
        let ChatStream { thread_id, mut deltas } = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                return Ok(());
            }
        };
        if let Some(thread_id) = thread_id {
            self.set_thread_id(thread_id).await?;
        }
        while let Some(item) = deltas.next().await {
            match item {
                Ok(delta) => {
                    self.messages[reply].content.push_str(&delta);
                    on_delta(&delta);
                    self.persist_messages().await?;
                }
                Err(e) => {
                    warn!("Chat stream failed after {} bytes: {}", self.messages[reply].content.len(), e);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Restores the conversation from the server when a thread is known but
    /// nothing is stored locally. Returns the number of messages restored.
    pub async fn restore_history(&mut self) -> Result<usize> {
        let Some(thread_id) = self.thread_id.clone() else {
            return Ok(0);
        };
        if !self.messages.is_empty() {
            return Ok(0);
        }
        let history = self.api.list_messages(&thread_id).await?;
        let restored = history.len();
        if restored > 0 {
            self.messages = history;
            self.persist_messages().await?;
        }
        info!("Restored {} messages for thread {}", restored, thread_id);
        Ok(restored)
    }

    /// Ends the session: resolves the thread on the server with `feedback`
    /// and clears local and shared state. Only one tab may do this at a time;
    /// if a peer holds the end-flow flag this returns [`Error::AlreadyEnding`].
    pub async fn end(&mut self, feedback: Feedback) -> Result<()> {
        if self.state != ChatState::Idle {
            return Err(Error::Busy(self.state));
        }

        let now = Utc::now().timestamp_millis();
        if let Some(flag) = self.current_ending_flag().await? {
            if flag.owner != self.tab_id && flag.is_live(now) {
                info!("Tab {} is already ending the session", flag.owner);
                return Err(Error::AlreadyEnding);
            }
        }

        let mine = EndingFlag { owner: self.tab_id, since: now };
        self.store.set(self.tab_id, CHAT_ENDING, &mine.encode()).await?;
        // last writer wins
        if self.current_ending_flag().await? != Some(mine) {
            info!("Another tab took over ending the session; cancelling");
            return Err(Error::AlreadyEnding);
        }

        self.state = ChatState::Ending;
        if let Some(thread_id) = self.thread_id.as_deref() {
            if let Err(e) = self.api.resolve_session(thread_id, feedback).await {
                warn!("Failed to resolve thread {}: {}", thread_id, e);
            }
        } else {
            debug!("No thread to resolve; clearing local state only");
        }

        let result = self.reset().await;
        self.state = ChatState::Idle;
        result
    }

    async fn current_ending_flag(&self) -> Result<Option<EndingFlag>> {
        Ok(self.store.get(CHAT_ENDING).await?.and_then(|v| EndingFlag::parse(&v)))
    }

    async fn reset(&mut self) -> Result<()> {
        self.messages.clear();
        self.thread_id = None;
        self.store.remove(self.tab_id, CHAT_MESSAGES).await?;
        self.store.remove(self.tab_id, THREAD_ID).await?;
        self.store.remove(self.tab_id, CHAT_ENDING).await?;
        info!("Chat session reset by tab {}", self.tab_id);
        Ok(())
    }

    /// Applies a peer tab's write. Own writes are ignored.
    pub fn handle_event(&mut self, event: &StoreEvent) -> Vec<MessageChange> {
        if event.origin == self.tab_id {
            return Vec::new();
        }
        match event.key.as_str() {
            CHAT_MESSAGES => {
                let incoming = match event.value.as_deref() {
                    None => Vec::new(),
                    Some(raw) =>
                        match serde_json::from_str::<Vec<ChatMessage>>(raw) {
                            Ok(messages) => messages,
                            Err(e) => {
                                warn!("Ignoring corrupt chat messages from tab {}: {}", event.origin, e);
                                return Vec::new();
                            }
                        }
                };
                reconcile(&mut self.messages, incoming)
            }
            THREAD_ID => {
                self.thread_id = event.value.clone().filter(|t| !t.is_empty());
                Vec::new()
            }
            MINI_CHAT_OPEN => {
                self.open = event.value.as_deref() == Some("true");
                Vec::new()
            }
            HAD_CHAT_INTERACTION => {
                self.had_interaction = event.value.as_deref() == Some("true");
                Vec::new()
            }
            CHAT_ENDING => {
                self.peer_ending = self.held_by_peer(event.value.as_deref());
                Vec::new()
            }
            other => {
                debug!("Ignoring change to unrelated key {}", other);
                Vec::new()
            }
        }
    }

    /// Re-reads everything from the shared store, e.g. after missing
    /// notifications.
    pub async fn resync(&mut self) -> Result<Vec<MessageChange>> {
        let local = std::mem::take(&mut self.messages);
        self.reload().await?;
        let stored = std::mem::replace(&mut self.messages, local);
        Ok(reconcile(&mut self.messages, stored))
    }
}

/// Adopts `incoming` as the message list (last write wins) and reports what
/// changed relative to `local`. Messages already known by content and
/// timestamp produce no change; a known (role, timestamp) with new content is
/// an update, which is how a peer's in-progress reply grows.
pub fn reconcile(local: &mut Vec<ChatMessage>, incoming: Vec<ChatMessage>) -> Vec<MessageChange> {
    let same_slot = |a: &ChatMessage, b: &ChatMessage| a.role == b.role && a.timestamp == b.timestamp;
    let mut changes = Vec::new();

    for old in local.iter() {
        if !incoming.iter().any(|m| same_slot(m, old)) {
            changes.push(MessageChange::Removed(old.clone()));
        }
    }
    for msg in &incoming {
        if local.iter().any(|m| m.same_as(msg)) {
            continue;
        }
        if local.iter().any(|m| same_slot(m, msg)) {
            changes.push(MessageChange::Updated(msg.clone()));
        } else {
            changes.push(MessageChange::Appended(msg.clone()));
        }
    }

    *local = incoming;
    changes
}

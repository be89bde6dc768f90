pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod flights;
pub mod models;
pub mod sync;

use chat::client::HttpChatClient;
use chat::{ ChatApi, ChatSession, Feedback, MessageChange };
use cli::{ Args, ChatArgs, Command, DataArgs, StoreArgs };
use error::{ Error, Result };
use flights::tiles::{ Theme, TileSet };
use flights::viewport::Viewport;
use flights::{ AirportSummary, RouteView };
use log::{ info, warn };
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use sync::SharedStore;
use tokio::sync::broadcast::error::RecvError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData<'a> {
    pub routes: Vec<RouteView<'a>>,
    pub airports: Vec<AirportSummary>,
    pub viewport: Viewport,
    pub tile_url: String,
    pub skipped: usize,
}

pub async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Routes(data) => routes(&data),
        Command::Chat { store, chat, message } => send(&store, &chat, &message).await,
        Command::Watch { store, chat } => watch(&store, &chat).await,
        Command::End { store, chat, feedback } => {
            let feedback: Feedback = feedback.parse().map_err(Error::InvalidArgument)?;
            end(&store, &chat, feedback).await
        }
        Command::History { store, chat, thread_id } => history(&store, &chat, thread_id).await,
    }
}

fn routes(args: &DataArgs) -> Result<()> {
    info!("--- Flight Map Configuration ---");
    info!("Airports: {}", args.airports_path);
    info!("Flights: {}", args.flights_path);
    info!("Theme: {}", args.theme);
    info!("--------------------------------");

    let theme: Theme = args.theme.parse().map_err(|e| Error::InvalidArgument(format!("{}", e)))?;
    let tiles = TileSet {
        light: args.tile_light_url.clone(),
        dark: args.tile_dark_url.clone(),
    };
    let airports = config::data::load_airports(&args.airports_path)?;
    let records = config::data::load_flights(&args.flights_path)?;

    let set = flights::aggregate(&airports, records);
    let data = MapData {
        routes: set.views(),
        airports: set.airports(),
        viewport: set.viewport(),
        tile_url: tiles.url_for(theme).to_string(),
        skipped: set.skipped(),
    };
    info!(
        "Built {} routes over {} airports ({} records skipped), zoom tier {:?}",
        data.routes.len(),
        data.airports.len(),
        data.skipped,
        data.viewport.tier
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&data)?
    } else {
        serde_json::to_string(&data)?
    };
    println!("{}", json);
    Ok(())
}

async fn connect(store: &StoreArgs, chat: &ChatArgs) -> Result<(Arc<dyn SharedStore>, Arc<dyn ChatApi>)> {
    info!("--- Chat Configuration ---");
    info!("Store Type: {}", store.store_type);
    info!("Store Host: {}", store.store_host);
    info!("Chat Base URL: {}", chat.chat_base_url);
    info!("--------------------------");

    let shared = sync::create_store(store).await?;
    let api: Arc<dyn ChatApi> = Arc::new(HttpChatClient::from_args(chat)?);
    Ok((shared, api))
}

async fn open_session(store: &StoreArgs, chat: &ChatArgs) -> Result<(ChatSession, Arc<dyn ChatApi>)> {
    let (shared, api) = connect(store, chat).await?;
    let session = ChatSession::open(shared, api.clone()).await?;
    Ok((session, api))
}

/// Opens the widget and pulls server history for a known thread. History is
/// best effort: the message is still sent if the endpoint is unreachable.
async fn prepare(session: &mut ChatSession) -> Result<()> {
    if !session.is_open() {
        session.set_open(true).await?;
    }
    if let Err(e) = session.restore_history().await {
        warn!("Could not restore chat history, continuing without it: {}", e);
    }
    Ok(())
}

async fn send(store: &StoreArgs, chat: &ChatArgs, message: &str) -> Result<()> {
    let (mut session, _) = open_session(store, chat).await?;
    prepare(&mut session).await?;

    let mut stdout = std::io::stdout();
    session.send(message, |delta| {
        let _ = write!(stdout, "{}", delta);
        let _ = stdout.flush();
    }).await?;
    println!();

    if let Some(thread_id) = session.thread_id() {
        info!("Thread: {}", thread_id);
    }
    Ok(())
}

fn print_change(change: &MessageChange) {
    match change {
        MessageChange::Appended(m) => println!("{}: {}", m.role.label(), m.content),
        MessageChange::Updated(m) => println!("{} (updated): {}", m.role.label(), m.content),
        MessageChange::Removed(m) => println!("- {} message removed ({})", m.role.label(), m.timestamp),
    }
}

async fn watch(store: &StoreArgs, chat: &ChatArgs) -> Result<()> {
    let (shared, api) = connect(store, chat).await?;
    // subscribe before loading so nothing written in between is missed
    let mut events = shared.subscribe();
    let mut session = ChatSession::open(shared, api).await?;
    info!("Watching shared chat state as tab {}", session.tab_id());

    for message in session.messages() {
        println!("{}: {}", message.role.label(), message.content);
    }

    loop {
        tokio::select! {
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        for change in session.handle_event(&event) {
                            print_change(&change);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} notifications, resyncing", missed);
                        for change in session.resync().await? {
                            print_change(&change);
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Store notifications closed");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                break;
            }
        }
    }
    Ok(())
}

async fn end(store: &StoreArgs, chat: &ChatArgs, feedback: Feedback) -> Result<()> {
    let (mut session, _) = open_session(store, chat).await?;
    match session.end(feedback).await {
        Ok(()) => {
            info!("Session ended with feedback {}", feedback);
            Ok(())
        }
        Err(Error::AlreadyEnding) => {
            warn!("Another tab is ending this session; nothing to do");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn history(store: &StoreArgs, chat: &ChatArgs, thread_id: Option<String>) -> Result<()> {
    let (session, api) = open_session(store, chat).await?;
    let Some(thread_id) = thread_id.or_else(|| session.thread_id().map(str::to_string)) else {
        warn!("No thread id given and none stored");
        return Ok(());
    };
    for message in api.list_messages(&thread_id).await? {
        println!("{}: {}", message.role.label(), message.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatStream;
    use crate::models::chat::ChatMessage;
    use crate::sync::{ MemoryStore, THREAD_ID };
    use async_trait::async_trait;
    use uuid::Uuid;

    struct HistoryDown;

    #[async_trait]
    impl ChatApi for HistoryDown {
        async fn stream_chat(&self, _messages: &[ChatMessage], _thread_id: Option<&str>) -> Result<ChatStream> {
            Err(Error::InvalidArgument("not used".to_string()))
        }

        async fn resolve_session(&self, _thread_id: &str, _feedback: Feedback) -> Result<()> {
            Ok(())
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<ChatMessage>> {
            Err(Error::InvalidArgument("history unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn unreachable_history_does_not_block_sending() {
        let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
        store.set(Uuid::new_v4(), THREAD_ID, "thread-3").await.unwrap();
        let mut session = ChatSession::open(store, Arc::new(HistoryDown)).await.unwrap();

        prepare(&mut session).await.unwrap();
        assert!(session.is_open());
        assert!(session.messages().is_empty());

        let reply = session.send("still there?", |_| {}).await.unwrap();
        assert!(!reply.content.is_empty());
        assert_eq!(session.messages().len(), 2);
    }
}

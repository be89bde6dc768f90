use clap::{ Args as ClapArgs, Parser, Subcommand };

use crate::chat::client::{
    DEFAULT_CHAT_PATH,
    DEFAULT_MESSAGES_PATH,
    DEFAULT_RESOLVE_PATH,
    DEFAULT_THREAD_HEADER,
};
use crate::flights::tiles::{ DEFAULT_DARK_TILES, DEFAULT_LIGHT_TILES };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Aggregate the flight log into map routes and print them as JSON.
    Routes(DataArgs),

    /// Send one message and stream the reply to stdout.
    Chat {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        chat: ChatArgs,

        /// Message to send
        message: String,
    },

    /// Follow the shared chat state the way a second tab would.
    Watch {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        chat: ChatArgs,
    },

    /// End the current session with feedback (good or bad).
    End {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        chat: ChatArgs,

        #[arg(long, default_value = "good")]
        feedback: String,
    },

    /// Print the messages the server holds for a thread.
    History {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        chat: ChatArgs,

        /// Thread to list; defaults to the one in the shared store
        #[arg(long)]
        thread_id: Option<String>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StoreArgs {
    // --- Shared State Args ---
    /// Shared state store type (memory, redis)
    #[arg(long, env = "STORE_TYPE", default_value = "redis")]
    pub store_type: String,

    /// Shared state store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "STORE_HOST", default_value = "redis://127.0.0.1:6379")]
    pub store_host: String,

    /// Prefix for redis keys and the notification channel.
    #[arg(long, env = "STORE_REDIS_PREFIX", default_value = "folio:")]
    pub store_redis_prefix: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    // --- Chat API Args ---
    /// Base URL of the site serving the chat endpoints
    #[arg(long, env = "CHAT_BASE_URL", default_value = "http://127.0.0.1:3000")]
    pub chat_base_url: String,

    /// Path of the streaming completion endpoint.
    #[arg(long, env = "CHAT_PATH", default_value = DEFAULT_CHAT_PATH)]
    pub chat_path: String,

    /// Path of the session resolution endpoint.
    #[arg(long, env = "CHAT_RESOLVE_PATH", default_value = DEFAULT_RESOLVE_PATH)]
    pub chat_resolve_path: String,

    /// Path of the thread history endpoint.
    #[arg(long, env = "CHAT_MESSAGES_PATH", default_value = DEFAULT_MESSAGES_PATH)]
    pub chat_messages_path: String,

    /// Response header carrying the thread identifier.
    #[arg(long, env = "CHAT_THREAD_HEADER", default_value = DEFAULT_THREAD_HEADER)]
    pub chat_thread_header: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DataArgs {
    // --- Flight Map Args ---
    /// Path to the airport reference table (JSON array or object keyed by code).
    #[arg(long, env = "AIRPORTS_PATH", default_value = "data/airports.json")]
    pub airports_path: String,

    /// Path to the flight log (JSON array of flight records).
    #[arg(long, env = "FLIGHTS_PATH", default_value = "data/flights.json")]
    pub flights_path: String,

    /// Map theme (light, dark)
    #[arg(long, env = "THEME", default_value = "light")]
    pub theme: String,

    #[arg(long, env = "TILE_LIGHT_URL", default_value = DEFAULT_LIGHT_TILES)]
    pub tile_light_url: String,

    #[arg(long, env = "TILE_DARK_URL", default_value = DEFAULT_DARK_TILES)]
    pub tile_dark_url: String,

    /// Pretty-print the JSON output
    #[arg(long, env = "PRETTY", default_value = "false")]
    pub pretty: bool,
}

use async_trait::async_trait;
use chrono::Utc;
use log::{ debug, info };
use reqwest::header::{ HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE };
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use url::Url;

use super::stream::delta_stream;
use super::{ ChatApi, ChatStream, Feedback };
use crate::cli::ChatArgs;
use crate::error::{ Error, Result };
use crate::models::chat::{ ChatMessage, Role };

pub const DEFAULT_CHAT_PATH: &str = "/api/chat";
pub const DEFAULT_RESOLVE_PATH: &str = "/api/chat/resolve";
pub const DEFAULT_MESSAGES_PATH: &str = "/api/chat/messages";
pub const DEFAULT_THREAD_HEADER: &str = "x-thread-id";

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    stream: bool,
    raw_response: bool,
    messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest<'a> {
    thread_id: &'a str,
    feedback: Feedback,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteMessage {
    role: Role,
    content: String,
    #[serde(default)]
    created_at: Option<i64>,
}

pub struct HttpChatClient {
    http: HttpClient,
    chat_url: Url,
    resolve_url: Url,
    messages_url: Url,
    thread_header: HeaderName,
}

impl HttpChatClient {
    pub fn new(
        base_url: &str,
        chat_path: &str,
        resolve_path: &str,
        messages_path: &str,
        thread_header: &str
    ) -> Result<Self> {
        let base = Url::parse(base_url)?;
        let thread_header = HeaderName::from_bytes(thread_header.as_bytes()).map_err(|_|
            Error::InvalidHeader(thread_header.to_string())
        )?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            chat_url: base.join(chat_path)?,
            resolve_url: base.join(resolve_path)?,
            messages_url: base.join(messages_path)?,
            thread_header,
        })
    }

    pub fn from_args(args: &ChatArgs) -> Result<Self> {
        let client = Self::new(
            &args.chat_base_url,
            &args.chat_path,
            &args.chat_resolve_path,
            &args.chat_messages_path,
            &args.chat_thread_header
        )?;
        info!("Chat endpoint: {}", client.chat_url);
        Ok(client)
    }
}

#[async_trait]
impl ChatApi for HttpChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        thread_id: Option<&str>
    ) -> Result<ChatStream> {
        let request = CompletionRequest {
            stream: true,
            raw_response: true,
            messages: messages
                .iter()
                .map(|m| RequestMessage { role: m.role, content: &m.content })
                .collect(),
            thread_id,
        };

        let resp = self.http
            .post(self.chat_url.clone())
            .json(&request)
            .send().await?
            .error_for_status()?;

        let thread_id = resp
            .headers()
            .get(&self.thread_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!("Completion stream opened (thread {:?})", thread_id);

        Ok(ChatStream {
            thread_id,
            deltas: delta_stream(resp.bytes_stream()),
        })
    }

    async fn resolve_session(&self, thread_id: &str, feedback: Feedback) -> Result<()> {
        self.http
            .post(self.resolve_url.clone())
            .json(&(ResolveRequest { thread_id, feedback }))
            .send().await?
            .error_for_status()?;
        info!("Resolved thread {} with feedback {}", thread_id, feedback);
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        let mut url = self.messages_url.clone();
        url.query_pairs_mut().append_pair("threadId", thread_id);

        let remote = self.http
            .get(url)
            .send().await?
            .error_for_status()?
            .json::<Vec<RemoteMessage>>().await?;

        // undated messages get distinct, increasing stamps so they stay
        // distinguishable by (role, timestamp)
        let now = Utc::now().timestamp_millis();
        Ok(
            remote
                .into_iter()
                .enumerate()
                .map(|(i, m)| ChatMessage {
                    role: m.role,
                    content: m.content,
                    timestamp: m.created_at.unwrap_or(now + (i as i64)),
                })
                .collect()
        )
    }
}

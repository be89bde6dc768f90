use axum::body::Body;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{ get, post };
use axum::{ Json, Router };
use folio::chat::client::HttpChatClient;
use folio::chat::{ ChatApi, ChatSession, Feedback };
use folio::models::chat::{ ChatMessage, Role };
use folio::sync::{ MemoryStore, SharedStore, CHAT_MESSAGES, THREAD_ID };
use futures::StreamExt;
use serde_json::{ json, Value };
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{ Arc, Mutex };

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str) -> HttpChatClient {
    HttpChatClient::new(
        base,
        "/api/chat",
        "/api/chat/resolve",
        "/api/chat/messages",
        "x-thread-id"
    ).unwrap()
}

/// Completion endpoint that splits one NDJSON record across two chunks.
fn streaming_app(seen: Arc<Mutex<Option<Value>>>) -> Router {
    Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<Value>| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() = Some(body);
                let chunks = vec![
                    "{\"choices\":[{\"delta\":{\"content\":\"Hel",
                    "lo\"}}]}\n{\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n"
                ];
                let body = Body::from_stream(futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>)));
                ([("x-thread-id", "thread-42")], body)
            }
        })
    )
}

#[tokio::test]
async fn completion_stream_carries_thread_and_deltas() {
    let seen = Arc::new(Mutex::new(None));
    let base = serve(streaming_app(seen.clone())).await;
    let api = client(&base);

    let stream = api.stream_chat(&[ChatMessage::user("hi")], Some("prev-thread")).await.unwrap();
    assert_eq!(stream.thread_id.as_deref(), Some("thread-42"));
    let deltas: Vec<String> = stream.deltas.map(|d| d.unwrap()).collect().await;
    assert_eq!(deltas.concat(), "Hello world");

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["stream"], json!(true));
    assert_eq!(body["rawResponse"], json!(true));
    assert_eq!(body["threadId"], json!("prev-thread"));
    assert_eq!(body["messages"], json!([{ "role": "user", "content": "hi" }]));
}

#[tokio::test]
async fn first_request_omits_thread_id() {
    let seen = Arc::new(Mutex::new(None));
    let base = serve(streaming_app(seen.clone())).await;

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(store.clone(), Arc::new(client(&base))).await.unwrap();
    let reply = session.send("hello", |_| {}).await.unwrap();

    assert_eq!(reply.content, "Hello world");
    assert_eq!(reply.role, Role::Assistant);
    assert!(seen.lock().unwrap().as_ref().unwrap().get("threadId").is_none());
    assert_eq!(store.get(THREAD_ID).await.unwrap().as_deref(), Some("thread-42"));
    let stored: Vec<ChatMessage> = serde_json::from_str(&store.get(CHAT_MESSAGES).await.unwrap().unwrap()).unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn server_error_yields_a_single_fallback() {
    let app = Router::new().route("/api/chat", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let base = serve(app).await;

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(store, Arc::new(client(&base))).await.unwrap();
    let reply = session.send("hello", |_| {}).await.unwrap();

    assert!(!reply.content.is_empty());
    assert_eq!(session.messages().len(), 2);
    assert_eq!(session.thread_id(), None);
}

#[tokio::test]
async fn empty_body_yields_a_single_fallback() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async { ([("x-thread-id", "thread-empty")], Body::empty()) })
    );
    let base = serve(app).await;

    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(store, Arc::new(client(&base))).await.unwrap();
    session.send("hello", |_| {}).await.unwrap();

    let replies: Vec<_> = session.messages().iter().filter(|m| m.role == Role::Assistant).collect();
    assert_eq!(replies.len(), 1);
    assert!(!replies[0].content.is_empty());
    assert_eq!(session.thread_id(), Some("thread-empty"));
}

#[tokio::test]
async fn resolve_posts_thread_and_feedback() {
    let seen = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let app = Router::new().route(
        "/api/chat/resolve",
        post(move |Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = Some(body);
                StatusCode::NO_CONTENT
            }
        })
    );
    let base = serve(app).await;

    client(&base).resolve_session("thread-7", Feedback::Bad).await.unwrap();
    assert_eq!(seen.lock().unwrap().clone().unwrap(), json!({ "threadId": "thread-7", "feedback": "bad" }));
}

#[tokio::test]
async fn history_is_listed_by_thread() {
    let app = Router::new().route(
        "/api/chat/messages",
        get(|Query(query): Query<HashMap<String, String>>| async move {
            let thread = query.get("threadId").cloned().unwrap_or_default();
            Json(
                json!([
                    { "role": "user", "content": format!("asked in {}", thread), "createdAt": 5 },
                    { "role": "assistant", "content": "answer" }
                ])
            )
        })
    );
    let base = serve(app).await;

    let messages = client(&base).list_messages("thread 7").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "asked in thread 7");
    assert_eq!(messages[0].timestamp, 5);
    assert_eq!(messages[1].role, Role::Assistant);
    assert!(messages[1].timestamp > 5);
}

#[tokio::test]
async fn undated_history_gets_distinct_timestamps() {
    let app = Router::new().route(
        "/api/chat/messages",
        get(|| async {
            Json(
                json!([
                    { "role": "assistant", "content": "first" },
                    { "role": "user", "content": "question" },
                    { "role": "assistant", "content": "second" }
                ])
            )
        })
    );
    let base = serve(app).await;

    let messages = client(&base).list_messages("thread-8").await.unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].timestamp < messages[1].timestamp);
    assert!(messages[1].timestamp < messages[2].timestamp);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    assert!(HttpChatClient::new("not a url", "/a", "/b", "/c", "x-thread-id").is_err());
    assert!(HttpChatClient::new("http://localhost", "/a", "/b", "/c", "bad header").is_err());
}

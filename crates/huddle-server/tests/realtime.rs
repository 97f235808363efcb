use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use huddle_db::MemoryStore;
use huddle_gateway::GatewayConfig;
use huddle_server::build_app;
use huddle_server::config::{ServerConfig, StoreBackend};
use huddle_types::api::Claims;
use huddle_types::events::{ErrorCode, ServerEvent};
use huddle_types::models::MessageStatus;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(jwt_secret: Option<&str>, media_dir: PathBuf) -> SocketAddr {
    let config = ServerConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        store: StoreBackend::Memory,
        gateway: GatewayConfig::default(),
        jwt_secret: jwt_secret.map(str::to_string),
        media_dir,
        max_upload_bytes: 1024,
    };
    let (app, _supervisor) = build_app(&config, Arc::new(MemoryStore::new()));

    let listener = tokio::net::TcpListener::bind(config.addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> Ws {
    let (ws, _) = connect_async(format!("ws://{addr}/gateway")).await.unwrap();
    ws
}

async fn send(ws: &mut Ws, json: serde_json::Value) {
    ws.send(Message::Text(json.to_string().into())).await.unwrap();
}

async fn next_event(ws: &mut Ws) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

fn roster_names(event: &ServerEvent) -> Vec<String> {
    match event {
        ServerEvent::UpdateUserList(list) => list.iter().map(|p| p.display_name.clone()).collect(),
        other => panic!("expected roster, got {other:?}"),
    }
}

#[tokio::test]
async fn two_participants_chat_end_to_end() {
    let media = tempfile::tempdir().unwrap();
    let addr = start(None, media.path().to_path_buf()).await;

    let mut ada = connect(addr).await;
    assert_eq!(next_event(&mut ada).await, ServerEvent::ChatHistory(vec![]));
    send(&mut ada, serde_json::json!({"type": "user_connected", "data": {"display_name": "ada"}})).await;
    assert_eq!(roster_names(&next_event(&mut ada).await), vec!["ada"]);

    let mut bob = connect(addr).await;
    assert_eq!(next_event(&mut bob).await, ServerEvent::ChatHistory(vec![]));
    send(&mut bob, serde_json::json!({"type": "user_connected", "data": {"display_name": "bob"}})).await;
    assert_eq!(roster_names(&next_event(&mut ada).await), vec!["ada", "bob"]);
    assert_eq!(roster_names(&next_event(&mut bob).await), vec!["ada", "bob"]);

    // Message fan-out reaches the sender too
    send(&mut ada, serde_json::json!({"type": "chat_message", "data": {"text": "hi bob"}})).await;
    let ServerEvent::ChatMessage(sent) = next_event(&mut ada).await else {
        panic!("expected chat_message");
    };
    assert_eq!(next_event(&mut bob).await, ServerEvent::ChatMessage(sent.clone()));
    assert_eq!(sent.author, "ada");
    assert!(!sent.seen);

    send(&mut bob, serde_json::json!({"type": "message_seen", "data": {"message_id": sent.id}})).await;
    let seen = ServerEvent::MessageStatusUpdated {
        message_id: sent.id,
        status: MessageStatus::Seen,
    };
    assert_eq!(next_event(&mut ada).await, seen);
    assert_eq!(next_event(&mut bob).await, seen);

    // Typing goes to everyone but the typist
    send(&mut bob, serde_json::json!({"type": "typing_start"})).await;
    assert_eq!(
        next_event(&mut ada).await,
        ServerEvent::TypingStart { display_name: "bob".into() }
    );

    // A joiner sees the persisted message in its history
    let mut carol = connect(addr).await;
    let ServerEvent::ChatHistory(history) = next_event(&mut carol).await else {
        panic!("expected chat_history");
    };
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, sent.id);
    assert!(history[0].seen);
    carol.close(None).await.unwrap();

    // Carol never announced, so her departure is silent; bob's is not
    bob.close(None).await.unwrap();
    assert_eq!(
        next_event(&mut ada).await,
        ServerEvent::TypingStop { display_name: "bob".into() }
    );
    assert_eq!(roster_names(&next_event(&mut ada).await), vec!["ada"]);

    send(&mut ada, serde_json::json!({"type": "clear_chat"})).await;
    assert_eq!(next_event(&mut ada).await, ServerEvent::ChatCleared);
}

#[tokio::test]
async fn bad_frames_get_an_error_and_the_connection_survives() {
    let media = tempfile::tempdir().unwrap();
    let addr = start(None, media.path().to_path_buf()).await;

    let mut ws = connect(addr).await;
    assert_eq!(next_event(&mut ws).await, ServerEvent::ChatHistory(vec![]));

    ws.send(Message::Text("not json".to_string().into())).await.unwrap();
    let ServerEvent::Error { code, .. } = next_event(&mut ws).await else {
        panic!("expected error");
    };
    assert_eq!(code, ErrorCode::BadCommand);

    // Chatting before announcing is a validation error, not a disconnect
    send(&mut ws, serde_json::json!({"type": "chat_message", "data": {"text": "hello?"}})).await;
    let ServerEvent::Error { code, .. } = next_event(&mut ws).await else {
        panic!("expected error");
    };
    assert_eq!(code, ErrorCode::Validation);

    send(&mut ws, serde_json::json!({"type": "user_connected", "data": {"display_name": "dana"}})).await;
    assert_eq!(roster_names(&next_event(&mut ws).await), vec!["dana"]);
}

#[tokio::test]
async fn gateway_requires_token_when_secret_set() {
    let media = tempfile::tempdir().unwrap();
    let addr = start(Some("s3cret"), media.path().to_path_buf()).await;

    match connect_async(format!("ws://{addr}/gateway")).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should have been rejected"),
    }

    let claims = Claims {
        sub: uuid::Uuid::new_v4(),
        username: "ada".into(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"s3cret"),
    )
    .unwrap();

    let (mut ws, _) = connect_async(format!("ws://{addr}/gateway?token={token}"))
        .await
        .unwrap();
    assert_eq!(next_event(&mut ws).await, ServerEvent::ChatHistory(vec![]));
}

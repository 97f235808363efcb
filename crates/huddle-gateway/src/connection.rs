use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, trace, warn};

use huddle_types::events::{ClientCommand, ErrorCode, ServerEvent};
use huddle_types::models::Identity;

use crate::supervisor::Gateway;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one WebSocket until either side goes away. Identity was already
/// established at the HTTP upgrade layer, if authentication is enabled.
pub async fn handle_connection(socket: WebSocket, gateway: Gateway, identity: Option<Identity>) {
    let (mut sender, mut receiver) = socket.split();

    let who = identity
        .as_ref()
        .map(|i| i.username.clone())
        .unwrap_or_else(|| "anonymous".to_string());

    // History is queued on the outbox before anything else
    let (conn, mut outbox) = gateway.connect(identity);
    info!("{} ({}) connected to gateway", who, conn);

    // Replies that never go through the supervisor (unparseable frames)
    let (local_tx, mut local_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward outbox + local replies -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            let event: Arc<ServerEvent> = tokio::select! {
                result = outbox.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                result = local_rx.recv() => match result {
                    Some(event) => Arc::new(event),
                    None => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let text = match serde_json::to_string(&*event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize {}: {}", event.name(), e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let gateway_recv = gateway.clone();
    let who_recv = who.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        trace!("{} ({}) -> {}", who_recv, conn, cmd.name());
                        gateway_recv.submit(conn, cmd);
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} ({}) bad command: {} -- raw: {}", who_recv, conn, e, raw);
                        let _ = local_tx.send(ServerEvent::Error {
                            code: ErrorCode::BadCommand,
                            message: e.to_string(),
                        });
                    }
                },
                Message::Binary(data) => {
                    warn!("{} ({}) sent {} byte binary frame, ignored", who_recv, conn, data.len());
                    let _ = local_tx.send(ServerEvent::Error {
                        code: ErrorCode::BadCommand,
                        message: "binary frames are not supported".to_string(),
                    });
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Commands already submitted are still handled before this
    gateway.disconnect(conn);
    info!("{} ({}) disconnected from gateway", who, conn);
}

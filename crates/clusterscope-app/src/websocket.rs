//! Per-connection WebSocket pump from a context's metrics hub.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clusterscope_core::{HubMessage, Subscription};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

use crate::server::SharedManager;

pub async fn metrics_upgrade(
    State(manager): State<SharedManager>,
    Path(context): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    let subscription = match manager.subscribe_metrics(&context) {
        Ok(subscription) => subscription,
        Err(e) => return (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    };
    let hub = manager.config().hub.clone();

    ws.on_upgrade(move |socket| {
        handle_connection(socket, context, subscription, hub.ping_interval(), hub.pong_timeout())
    })
}

async fn handle_connection(
    socket: WebSocket,
    context: String,
    subscription: Subscription,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    debug!(context = %context, subscriber = subscription.id(), "Metrics stream opened");
    let (sender, receiver) = socket.split();
    let last_pong = Arc::new(Mutex::new(Instant::now()));

    let mut send_task = tokio::spawn(forward_messages(
        sender,
        subscription,
        Arc::clone(&last_pong),
        ping_interval,
        pong_timeout,
    ));
    let mut recv_task = tokio::spawn(read_incoming(receiver, last_pong));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!(context = %context, "Metrics stream closed");
}

async fn forward_messages(
    mut sender: SplitSink<WebSocket, Message>,
    mut subscription: Subscription,
    last_pong: Arc<Mutex<Instant>>,
    ping_interval: Duration,
    pong_timeout: Duration,
) {
    let mut ping_timer = interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            message = subscription.recv() => {
                // None: hub closed or dropped us as a stalled subscriber
                let Some(message) = message else { break };
                let Some(frame) = encode(&message) else { continue };
                if sender.send(frame).await.is_err() {
                    return;
                }
            }
            _ = ping_timer.tick() => {
                if pong_overdue(*last_pong.lock(), Instant::now(), pong_timeout) {
                    debug!(subscriber = subscription.id(), "No pong received, closing");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    return;
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

async fn read_incoming(mut receiver: SplitStream<WebSocket>, last_pong: Arc<Mutex<Instant>>) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Pong(_)) => *last_pong.lock() = Instant::now(),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

fn encode(message: &HubMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!(error = %e, "Failed to serialize hub message");
            None
        }
    }
}

fn pong_overdue(last_pong: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_pong) > timeout
}

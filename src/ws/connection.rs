//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered progress events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType, WsRequest};
use super::subscription::SubscriptionManager;
use crate::domain::{CauseId, ProgressEvent};
use crate::service::DonationService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<ProgressEvent>,
    donations: Arc<DonationService>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(&text, &mut subs, &donations).await;
                        let json = serde_json::to_string(&response).unwrap_or_default();
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(progress_event) => {
                        if subs.matches(progress_event.cause_id()) {
                            let msg = WsMessage::new(
                                uuid::Uuid::new_v4().to_string(),
                                WsMessageType::Event,
                                serde_json::json!({
                                    "event": progress_event.event_type_str(),
                                    "channel": progress_event.channel,
                                    "data": progress_event.progress,
                                }),
                            );
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Splits raw cause ids into parsed ids and the wildcard flag. Unparseable
/// entries are ignored.
fn parse_cause_ids(raw: &[String]) -> (Vec<CauseId>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for s in raw {
        if s == "*" {
            wildcard = true;
        } else if let Ok(id) = s.parse::<CauseId>() {
            ids.push(id);
        }
    }
    (ids, wildcard)
}

/// Handles a text message from the client and builds the reply.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    donations: &DonationService,
) -> WsMessage {
    let request = match serde_json::from_str::<WsRequest>(text) {
        Ok(request) => request,
        Err(err) => {
            let message = if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                format!("unknown command: {err}")
            } else {
                "malformed JSON".to_string()
            };
            return WsMessage::error(String::new(), 400, &message);
        }
    };
    let id = request.id.unwrap_or_default();

    match request.command {
        WsCommand::Subscribe { cause_ids } => {
            let (ids, wildcard) = parse_cause_ids(&cause_ids);
            subs.subscribe(&ids, wildcard);
            WsMessage::new(
                id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::Unsubscribe { cause_ids } => {
            let (ids, wildcard) = parse_cause_ids(&cause_ids);
            subs.unsubscribe(&ids, wildcard);
            WsMessage::new(
                id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "remaining_count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::GetProgress { cause_id } => {
            let Ok(cause_id) = cause_id.parse::<CauseId>() else {
                return WsMessage::error(id, 400, "invalid cause id");
            };
            match donations.cause_progress(cause_id).await {
                Ok(progress) => WsMessage::new(
                    id,
                    WsMessageType::Response,
                    serde_json::to_value(&progress).unwrap_or_default(),
                ),
                Err(err) => WsMessage::error(id, err.status_code().as_u16(), &err.to_string()),
            }
        }
    }
}

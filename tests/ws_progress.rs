//! Live progress over WebSocket against a served application.

#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use common::spawn_app;

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let Ok(Some(Ok(msg))) = tokio::time::timeout(Duration::from_secs(5), ws.next()).await
        else {
            panic!("no message within timeout");
        };
        if let Ok(text) = msg.to_text() {
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn subscriber_receives_progress_after_payment() {
    let app = spawn_app().await;
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let router = app.router.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let Ok((mut ws, _)) = connect_async(format!("ws://{addr}/ws")).await else {
        panic!("websocket connect failed");
    };
    let subscribe = json!({
        "id": "sub-1",
        "command": "subscribe",
        "cause_ids": [app.cause.id.to_string()],
    });
    let Ok(()) = ws.send(Message::text(subscribe.to_string())).await else {
        panic!("send failed");
    };
    let ack = next_json(&mut ws).await;
    assert_eq!(ack.get("id"), Some(&json!("sub-1")));
    assert_eq!(ack.get("type"), Some(&json!("response")));

    let (_, invoice_id) = app.donate(None).await;
    app.gateway.set_status(&invoice_id, "Paid", Some("ws-1"));
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/payments/webhook"))
        .json(&json!({ "EventType": "PaymentSucceeded", "ResourceId": invoice_id }))
        .send()
        .await;
    let Ok(response) = response else {
        panic!("webhook request failed");
    };
    assert!(response.status().is_success());

    let event = next_json(&mut ws).await;
    assert_eq!(event.get("type"), Some(&json!("event")));
    assert_eq!(
        event.pointer("/payload/event"),
        Some(&json!("cause_progress"))
    );
    assert_eq!(
        event.pointer("/payload/channel"),
        Some(&json!(format!("causes:{}", app.cause.id)))
    );
    assert_eq!(
        event.pointer("/payload/data/donorCount"),
        Some(&json!(1))
    );
}

#[tokio::test]
async fn get_progress_answers_on_the_socket() {
    let app = spawn_app().await;
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let router = app.router.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let Ok((mut ws, _)) = connect_async(format!("ws://{addr}/ws")).await else {
        panic!("websocket connect failed");
    };
    let request = json!({
        "id": "p-1",
        "command": "get_progress",
        "cause_id": app.cause.id.to_string(),
    });
    let Ok(()) = ws.send(Message::text(request.to_string())).await else {
        panic!("send failed");
    };
    let reply = next_json(&mut ws).await;
    assert_eq!(reply.get("type"), Some(&json!("response")));
    assert!(reply.pointer("/payload/raisedAmount").is_some());
}

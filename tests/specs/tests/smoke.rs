// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `sessgate` binary and
//! drive it over its WebSocket port, as a real client would.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use sessgate_specs::GatewayBuilder;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(10);

async fn next_json(ws: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin)) -> serde_json::Value {
    loop {
        match ws.next().await.expect("stream open").expect("no error") {
            Message::Text(text) => return serde_json::from_str(&text).expect("valid json"),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;
    Ok(())
}

#[tokio::test]
async fn full_session_lifecycle_over_websocket() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;

    ws.send(Message::Text(json!({"type":"hello","clientId":"c1","deviceType":"desktop","token":"t"}).to_string().into())).await?;
    let hello_ok = next_json(&mut ws).await;
    assert_eq!(hello_ok["type"], "hello_ok");

    ws.send(Message::Text(json!({"type":"create_session","workingDirectory":"/tmp","agentType":"claude"}).to_string().into())).await?;
    let created = next_json(&mut ws).await;
    let session_id = created["sessionId"].as_str().expect("session id").to_owned();

    ws.send(Message::Text(json!({"type":"subscribe","sessionId":session_id,"lastAckSeq":0}).to_string().into())).await?;
    let subscribed = next_json(&mut ws).await;
    assert_eq!(subscribed["type"], "subscribed");

    ws.send(Message::Text(json!({"type":"input","sessionId":session_id,"clientInputId":"i1","data":"hello"}).to_string().into())).await?;
    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "input_ack");
    assert_eq!(ack["acceptedSeq"], 1);

    ws.send(Message::Text(json!({"type":"stop_session","sessionId":session_id}).to_string().into())).await?;
    let stopped = next_json(&mut ws).await;
    assert_eq!(stopped["type"], "session_stopped");

    Ok(())
}

#[tokio::test]
async fn resubscribe_catches_up_missed_events() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;
    ws.send(Message::Text(json!({"type":"hello","clientId":"c1","deviceType":"web","token":"t"}).to_string().into())).await?;
    let _ = next_json(&mut ws).await;

    ws.send(Message::Text(json!({"type":"create_session","workingDirectory":"/tmp","agentType":"claude"}).to_string().into())).await?;
    let created = next_json(&mut ws).await;
    let session_id = created["sessionId"].as_str().expect("session id").to_owned();

    ws.send(Message::Text(json!({"type":"subscribe","sessionId":session_id,"lastAckSeq":0}).to_string().into())).await?;
    let _ = next_json(&mut ws).await; // subscribed

    for i in 0..3 {
        ws.send(Message::Text(json!({"type":"input","sessionId":session_id,"clientInputId":format!("i{i}"),"data":"x"}).to_string().into())).await?;
        let _ = next_json(&mut ws).await; // input_ack
        let _ = next_json(&mut ws).await; // event
    }

    ws.send(Message::Text(json!({"type":"unsubscribe","sessionId":session_id}).to_string().into())).await?;
    let _ = next_json(&mut ws).await; // unsubscribed

    ws.send(Message::Text(json!({"type":"subscribe","sessionId":session_id,"lastAckSeq":1}).to_string().into())).await?;
    let subscribed = next_json(&mut ws).await;
    assert_eq!(subscribed["latestSeq"], 3);

    let first_catchup = next_json(&mut ws).await;
    assert_eq!(first_catchup["seq"], 2);
    let second_catchup = next_json(&mut ws).await;
    assert_eq!(second_catchup["seq"], 3);

    Ok(())
}

#[tokio::test]
async fn unauthenticated_state_rejects_non_hello_messages() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;
    ws.send(Message::Text(json!({"type":"ping","ts":1}).to_string().into())).await?;
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["retryable"], false);

    Ok(())
}

#[tokio::test]
async fn wrong_bearer_token_is_rejected_on_hello() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().auth_token("secret").spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;
    ws.send(Message::Text(json!({"type":"hello","clientId":"c1","deviceType":"desktop","token":"wrong"}).to_string().into())).await?;
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "UNAUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn matching_bearer_token_is_accepted_on_hello() -> anyhow::Result<()> {
    let gateway = GatewayBuilder::new().auth_token("secret").spawn();
    tokio::time::timeout(TIMEOUT, gateway.wait_healthy()).await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(gateway.ws_url()).await?;
    ws.send(Message::Text(json!({"type":"hello","clientId":"c1","deviceType":"desktop","token":"secret"}).to_string().into())).await?;
    let hello_ok = next_json(&mut ws).await;
    assert_eq!(hello_ok["type"], "hello_ok");

    Ok(())
}

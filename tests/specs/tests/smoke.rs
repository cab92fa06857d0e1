// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests: the real `chathub` binary, a stub issuer, real
//! HTTP and WebSocket clients.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use chathub::transport::ws_msg::{AckStatus, ServerFrame};
use chathub_specs::{HubProcess, StubIssuer};

const TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Read the next text frame within `TIMEOUT` and parse it.
async fn next_frame(ws: &mut WsStream) -> anyhow::Result<ServerFrame> {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or_else(|| anyhow::anyhow!("timed out waiting for frame"))?;
        let msg = tokio::time::timeout(remaining, ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("socket closed"))?;
        match msg? {
            Message::Text(text) => return Ok(serde_json::from_str(&text)?),
            Message::Close(_) => anyhow::bail!("socket closed"),
            _ => continue,
        }
    }
}

async fn start() -> anyhow::Result<(StubIssuer, HubProcess, reqwest::Client)> {
    let issuer = StubIssuer::spawn().await?;
    let hub = HubProcess::start(&issuer.url())?;
    hub.wait_healthy(TIMEOUT).await?;
    Ok((issuer, hub, reqwest::Client::new()))
}

async fn grant(
    client: &reqwest::Client,
    hub: &HubProcess,
    admin_token: &str,
    user: &str,
    chat: &str,
) -> anyhow::Result<()> {
    let resp = client
        .post(format!("{}/permissions", hub.base_url()))
        .bearer_auth(admin_token)
        .json(&serde_json::json!({ "targetUserId": user, "chatId": chat, "role": "member" }))
        .send()
        .await?;
    anyhow::ensure!(resp.status().is_success(), "grant failed: {}", resp.status());
    Ok(())
}

#[tokio::test]
async fn handshake_denied_without_permission() -> anyhow::Result<()> {
    let (issuer, hub, _client) = start().await?;

    let token = issuer.mint("mallory", 3600)?;
    let err = tokio_tungstenite::connect_async(hub.ws_url(&token, "chat-y")).await.err();
    anyhow::ensure!(err.is_some(), "handshake should be denied");
    Ok(())
}

#[tokio::test]
async fn handshake_denied_with_expired_token() -> anyhow::Result<()> {
    let (issuer, hub, _client) = start().await?;

    let stale = issuer.mint("alice", -120)?;
    let err = tokio_tungstenite::connect_async(hub.ws_url(&stale, "chat-y")).await.err();
    anyhow::ensure!(err.is_some(), "expired token should deny the handshake");
    Ok(())
}

#[tokio::test]
async fn fifo_ordering_reaches_two_sessions_in_order() -> anyhow::Result<()> {
    let (issuer, hub, client) = start().await?;
    let alice = issuer.mint("alice", 3600)?;
    grant(&client, &hub, &alice, "alice", "chat-y").await?;

    // Two live sessions on chat-y.
    let (mut s1, _) = tokio_tungstenite::connect_async(hub.ws_url(&alice, "chat-y")).await?;
    let (mut s2, _) = tokio_tungstenite::connect_async(hub.ws_url(&alice, "chat-y")).await?;
    for ws in [&mut s1, &mut s2] {
        let frame = next_frame(ws).await?;
        let ServerFrame::Connected { chat_ids, .. } = frame else {
            anyhow::bail!("expected connected frame, got {frame:?}");
        };
        assert_eq!(chat_ids, ["chat-y"]);
    }

    // Publish "1", "2", "3" as sequenced FIFO messages over HTTP.
    for text in ["1", "2", "3"] {
        let resp = client
            .post(format!("{}/publish", hub.base_url()))
            .bearer_auth(&alice)
            .json(&serde_json::json!({
                "targetChannel": "session",
                "messageType": "fifo",
                "generateSequence": true,
                "payload": { "chatId": "chat-y", "text": text }
            }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "publish failed: {}", resp.status());
    }

    // Each session sees all three, in order, with consecutive sequences.
    for ws in [&mut s1, &mut s2] {
        let mut seqs = Vec::new();
        let mut texts = Vec::new();
        for _ in 0..3 {
            let frame = next_frame(ws).await?;
            let ServerFrame::Notification { sequence_number, payload, chat_id, .. } = frame
            else {
                anyhow::bail!("expected notification, got {frame:?}");
            };
            assert_eq!(chat_id, "chat-y");
            seqs.push(sequence_number.unwrap_or(0));
            texts.push(payload["text"].as_str().unwrap_or("").to_owned());
        }
        assert_eq!(texts, ["1", "2", "3"]);
        let base = seqs[0];
        assert_eq!(seqs, [base, base + 1, base + 2]);
    }
    Ok(())
}

#[tokio::test]
async fn p2p_publish_is_acked_and_fanned_out() -> anyhow::Result<()> {
    let (issuer, hub, client) = start().await?;
    let alice = issuer.mint("alice", 3600)?;
    let bob = issuer.mint("bob", 3600)?;
    grant(&client, &hub, &alice, "alice", "chat-y").await?;
    grant(&client, &hub, &alice, "bob", "chat-y").await?;

    let (mut sender, _) = tokio_tungstenite::connect_async(hub.ws_url(&alice, "chat-y")).await?;
    let (mut receiver, _) = tokio_tungstenite::connect_async(hub.ws_url(&bob, "chat-y")).await?;
    next_frame(&mut sender).await?;
    next_frame(&mut receiver).await?;

    let frame = serde_json::json!({
        "op": "sendMessage",
        "ackId": "req-7",
        "targetChannel": "session",
        "messageType": "standard",
        "payload": { "chatId": "chat-y", "text": "hello from the session" }
    });
    sender.send(Message::Text(frame.to_string().into())).await?;

    // The publisher gets a correlated ok ack.
    let ack = next_frame(&mut sender).await?;
    let ServerFrame::Ack { ack_id, status, message_id, .. } = ack else {
        anyhow::bail!("expected ack, got {ack:?}");
    };
    assert_eq!(ack_id.as_deref(), Some("req-7"));
    assert_eq!(status, AckStatus::Ok);
    anyhow::ensure!(message_id.is_some(), "ok ack carries the message id");

    // The other session receives the message.
    let delivered = next_frame(&mut receiver).await?;
    let ServerFrame::Notification { payload, principal_id, .. } = delivered else {
        anyhow::bail!("expected notification, got {delivered:?}");
    };
    assert_eq!(payload["text"], "hello from the session");
    assert_eq!(principal_id, "alice");
    Ok(())
}

#[tokio::test]
async fn revocation_denies_publish_but_not_delivery() -> anyhow::Result<()> {
    let (issuer, hub, client) = start().await?;
    let alice = issuer.mint("alice", 3600)?;
    let bob = issuer.mint("bob", 3600)?;
    grant(&client, &hub, &alice, "alice", "chat-z").await?;
    grant(&client, &hub, &alice, "bob", "chat-z").await?;

    let (mut bob_ws, _) = tokio_tungstenite::connect_async(hub.ws_url(&bob, "chat-z")).await?;
    next_frame(&mut bob_ws).await?;

    // Revoke bob mid-session.
    let resp = client
        .delete(format!("{}/permissions", hub.base_url()))
        .query(&[("userId", "bob"), ("chatId", "chat-z")])
        .bearer_auth(&alice)
        .send()
        .await?;
    anyhow::ensure!(resp.status().is_success(), "revoke failed");

    // Bob's stateless publish is now denied at publish time.
    let resp = client
        .post(format!("{}/publish", hub.base_url()))
        .bearer_auth(&bob)
        .json(&serde_json::json!({
            "targetChannel": "session",
            "messageType": "standard",
            "payload": { "chatId": "chat-z", "text": "nope" }
        }))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 403);

    // But the open session still receives messages published by others.
    let resp = client
        .post(format!("{}/publish", hub.base_url()))
        .bearer_auth(&alice)
        .json(&serde_json::json!({
            "targetChannel": "session",
            "messageType": "standard",
            "payload": { "chatId": "chat-z", "text": "still delivered" }
        }))
        .send()
        .await?;
    anyhow::ensure!(resp.status().is_success(), "alice publish failed");

    let delivered = next_frame(&mut bob_ws).await?;
    let ServerFrame::Notification { payload, .. } = delivered else {
        anyhow::bail!("expected notification, got {delivered:?}");
    };
    assert_eq!(payload["text"], "still delivered");
    Ok(())
}

#[tokio::test]
async fn gap_recovery_over_http() -> anyhow::Result<()> {
    let (issuer, hub, client) = start().await?;
    let alice = issuer.mint("alice", 3600)?;
    grant(&client, &hub, &alice, "alice", "chat-g").await?;

    for i in 1..=6 {
        let resp = client
            .post(format!("{}/publish", hub.base_url()))
            .bearer_auth(&alice)
            .json(&serde_json::json!({
                "targetChannel": "session",
                "messageType": "fifo",
                "generateSequence": true,
                "payload": { "chatId": "chat-g", "text": format!("msg-{i}") }
            }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "publish failed");
    }

    // Poll the gap-fill query until storage has caught up.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        let body: serde_json::Value = client
            .get(format!("{}/messages", hub.base_url()))
            .query(&[("chatId", "chat-g"), ("sequences", "3,5")])
            .bearer_auth(&alice)
            .send()
            .await?
            .json()
            .await?;
        let mut seqs: Vec<u64> = body["messages"]
            .as_array()
            .map(|m| m.iter().filter_map(|r| r["sequenceNumber"].as_u64()).collect())
            .unwrap_or_default();
        seqs.sort_unstable();
        if seqs == [3, 5] {
            return Ok(());
        }
        anyhow::ensure!(
            tokio::time::Instant::now() < deadline,
            "gap query never returned sequences 3 and 5 (got {seqs:?})"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

//! Integration tests for the WebSocket relay path.

use axum::extract::ws::Message as OriginSeenMessage;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

mod common;

#[tokio::test]
async fn relays_text_and_binary_frames() {
    let origin = common::spawn_ws_echo_origin().await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    client.send(Message::Text("ping".into())).await.unwrap();
    let echoed = client.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Text("ping".into()));

    client
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();
    let echoed = client.next().await.unwrap().unwrap();
    assert_eq!(echoed, Message::Binary(vec![1, 2, 3].into()));
}

#[tokio::test]
async fn upgrade_path_includes_base_path() {
    let origin = common::spawn_ws_path_reporter().await;
    let proxy = common::spawn_proxy(&format!("http://{origin}/api/v1")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    let first = client.next().await.unwrap().unwrap();
    assert_eq!(first, Message::Text("/api/v1/stream".into()));
}

#[tokio::test]
async fn explicit_close_frame_reaches_origin() {
    let (origin, mut seen) = common::spawn_ws_close_recorder().await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    client
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(4001),
            reason: "bye".into(),
        })))
        .await
        .unwrap();

    let frame = seen.recv().await.unwrap().unwrap();
    assert_eq!(frame.code, 4001);
    assert_eq!(frame.reason, "bye");
}

#[tokio::test]
async fn close_without_frame_becomes_normal_closure() {
    let (origin, mut seen) = common::spawn_ws_close_recorder().await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    client.send(Message::Close(None)).await.unwrap();

    let frame = seen.recv().await.unwrap().unwrap();
    assert_eq!(frame.code, 1000);
    assert_eq!(frame.reason, "normal closure");
}

#[tokio::test]
async fn origin_close_frame_reaches_client() {
    let (origin, _seen) = common::spawn_ws_closer(4010, "room closed").await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    let message = client.next().await.unwrap().unwrap();
    match message {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 4010);
            assert_eq!(frame.reason, "room closed");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn origin_initiated_close_handshake_completes() {
    let (origin, mut seen) = common::spawn_ws_closer(1000, "done").await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    let message = client.next().await.unwrap().unwrap();
    assert!(matches!(message, Message::Close(Some(_))));

    // The origin gets its own close frame echoed back, not a dead socket.
    let echoed = seen.recv().await.unwrap();
    match echoed {
        OriginSeenMessage::Close(Some(frame)) => {
            assert_eq!(frame.code, 1000);
            assert_eq!(frame.reason.as_str(), "done");
        }
        other => panic!("expected close echo, got {other:?}"),
    }
}

#[tokio::test]
async fn frames_after_origin_close_are_not_forwarded() {
    let (origin, mut seen) = common::spawn_ws_closer(1000, "done").await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let (mut client, _) = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap();

    // Wait until the origin's close has reached this side of the relay.
    loop {
        match client.next().await {
            Some(Ok(Message::Close(_))) | None => break,
            Some(_) => {}
        }
    }

    // The session is over; these must never reach the origin.
    let _ = client.send(Message::Text("too late".into())).await;
    let _ = client.send(Message::Binary(vec![9].into())).await;
    drop(client);

    // Drain everything the origin saw after it closed: at most the close
    // echo, never a data frame.
    while let Some(message) = seen.recv().await {
        assert!(
            matches!(message, OriginSeenMessage::Close(_)),
            "frame relayed after close: {message:?}"
        );
    }
}

#[tokio::test]
async fn origin_selected_subprotocol_surfaces_on_upgrade() {
    let origin = common::spawn_ws_subprotocol_origin("chat.v1").await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let mut request = format!("ws://{proxy}/stream")
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "chat.v1".parse().unwrap());

    let (_client, response) = connect_async(request).await.unwrap();
    assert_eq!(
        response.headers().get("sec-websocket-protocol").unwrap(),
        "chat.v1"
    );
}

#[tokio::test]
async fn origin_refusal_propagates_status_and_body() {
    let origin = common::spawn_refusing_origin().await;
    let proxy = common::spawn_proxy(&format!("http://{origin}")).await;

    let error = connect_async(format!("ws://{proxy}/stream"))
        .await
        .unwrap_err();

    match error {
        WsError::Http(response) => {
            assert_eq!(response.status().as_u16(), 403);
            let body = response.body().as_deref().unwrap_or_default();
            assert_eq!(body, b"forbidden".as_slice());
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

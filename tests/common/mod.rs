//! Shared utilities for integration testing: mock origin servers and a
//! proxy spawner.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use origin_proxy::{HttpServer, ProxyConfig};

/// Start the proxy against the given origin URL, returning its address.
pub async fn spawn_proxy(origin_url: &str) -> SocketAddr {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.origin.url = origin_url.to_string();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    addr
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// HTTP origin that echoes what it received as JSON, with a couple of
/// special paths for redirect and header-fingerprint behavior.
pub async fn spawn_http_origin() -> SocketAddr {
    async fn handler(request: Request<Body>) -> axum::response::Response {
        let path = request.uri().path().to_string();

        if path.ends_with("/redirect") {
            return Response::builder()
                .status(StatusCode::FOUND)
                .header(header::LOCATION, "https://elsewhere.example/")
                .body(Body::from("redirecting"))
                .unwrap()
                .into_response();
        }

        if path.ends_with("/fingerprint") {
            return Response::builder()
                .status(StatusCode::OK)
                .header("x-powered-by", "Express")
                .header(header::X_CONTENT_TYPE_OPTIONS, "custom")
                .body(Body::from("fingerprinted"))
                .unwrap()
                .into_response();
        }

        let (parts, body) = request.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

        let mut headers = serde_json::Map::new();
        for (name, value) in parts.headers.iter() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_string(), Value::from(v));
            }
        }

        Json(json!({
            "method": parts.method.as_str(),
            "path": path,
            "query": parts.uri.query(),
            "headers": headers,
            "body_len": bytes.len(),
        }))
        .into_response()
    }

    serve(Router::new().fallback(handler)).await
}

/// Origin that refuses everything, including upgrade attempts.
pub async fn spawn_refusing_origin() -> SocketAddr {
    async fn handler() -> (StatusCode, &'static str) {
        (StatusCode::FORBIDDEN, "forbidden")
    }
    serve(Router::new().fallback(handler)).await
}

/// WebSocket origin that echoes text and binary frames.
pub async fn spawn_ws_echo_origin() -> SocketAddr {
    async fn handler(ws: WebSocketUpgrade) -> axum::response::Response {
        ws.on_upgrade(|mut socket: WebSocket| async move {
            while let Some(Ok(message)) = socket.recv().await {
                match message {
                    Message::Text(_) | Message::Binary(_) => {
                        if socket.send(message).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        })
    }
    serve(Router::new().fallback(handler)).await
}

/// WebSocket origin that reports the upgrade path as its first message.
pub async fn spawn_ws_path_reporter() -> SocketAddr {
    async fn handler(ws: WebSocketUpgrade, request: Request<Body>) -> axum::response::Response {
        let path = request.uri().path().to_string();
        ws.on_upgrade(move |mut socket: WebSocket| async move {
            let _ = socket.send(Message::Text(path.into())).await;
        })
    }
    serve(Router::new().fallback(handler)).await
}

/// WebSocket origin that records the close frame it receives.
pub async fn spawn_ws_close_recorder() -> (SocketAddr, mpsc::Receiver<Option<CloseFrame>>) {
    async fn handler(
        State(tx): State<mpsc::Sender<Option<CloseFrame>>>,
        ws: WebSocketUpgrade,
    ) -> axum::response::Response {
        ws.on_upgrade(move |mut socket: WebSocket| async move {
            while let Some(Ok(message)) = socket.recv().await {
                if let Message::Close(frame) = message {
                    let _ = tx.send(frame).await;
                    break;
                }
            }
        })
    }

    let (tx, rx) = mpsc::channel(1);
    let addr = serve(Router::new().fallback(handler).with_state(tx)).await;
    (addr, rx)
}

/// WebSocket origin that accepts the connection, immediately closes it
/// with the given code and reason, then records everything it still
/// receives afterwards. The channel closes when the socket does.
pub async fn spawn_ws_closer(
    code: u16,
    reason: &'static str,
) -> (SocketAddr, mpsc::Receiver<Message>) {
    async fn handler(
        State((code, reason, tx)): State<(u16, &'static str, mpsc::Sender<Message>)>,
        ws: WebSocketUpgrade,
    ) -> axum::response::Response {
        ws.on_upgrade(move |mut socket: WebSocket| async move {
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })))
                .await;
            while let Some(Ok(message)) = socket.recv().await {
                let _ = tx.send(message).await;
            }
        })
    }

    let (tx, rx) = mpsc::channel(8);
    let addr = serve(
        Router::new()
            .fallback(handler)
            .with_state((code, reason, tx)),
    )
    .await;
    (addr, rx)
}

/// WebSocket origin that selects the given subprotocol during the
/// handshake and then waits for the peer to hang up.
pub async fn spawn_ws_subprotocol_origin(protocol: &'static str) -> SocketAddr {
    async fn handler(
        State(protocol): State<&'static str>,
        ws: WebSocketUpgrade,
    ) -> axum::response::Response {
        ws.protocols([protocol])
            .on_upgrade(|mut socket: WebSocket| async move {
                while let Some(Ok(_)) = socket.recv().await {}
            })
    }

    serve(Router::new().fallback(handler).with_state(protocol)).await
}

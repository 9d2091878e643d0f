//! WebSocket relay between the client and the origin.
//!
//! # Responsibilities
//! - Dial the origin (ws/wss per origin scheme) before accepting the client
//! - Forward only the allow-listed handshake headers on the origin leg
//! - Fail the client handshake with the origin's status/body on rejection
//! - Forward text/binary frames verbatim in both directions
//! - Propagate close/error events with matching code/reason
//!
//! # Data Flow
//! ```text
//! Client ←── frames ──→ Proxy ←── frames ──→ Origin
//! ```
//!
//! # Design Decisions
//! - The origin is dialed first; a rejected upgrade never leaves the
//!   client with a silently accepted socket
//! - Both pump directions run concurrently under one `tokio::select!`,
//!   so neither side can starve the other
//! - The session owns both socket halves exclusively; the close event
//!   itself is the cancellation signal, there is no separate token

use axum::body::Body;
use axum::extract::ws::{CloseFrame, Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderName, Response, Uri};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as OriginCloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as OriginMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::Origin;
use crate::http::{request, response};
use crate::observability::metrics;

/// Handshake headers forwarded verbatim on the origin leg.
///
/// `Sec-WebSocket-Key` and `-Version` are absent on purpose: the proxy
/// terminates the handshake on each leg, so the origin dial carries a
/// fresh key generated by the client handshake.
pub const WS_FORWARDED_HEADERS: [&str; 5] = [
    "sec-websocket-protocol",
    "user-agent",
    "origin",
    "cookie",
    "authorization",
];

const NO_STATUS_CODE: u16 = 1005;
const DEFAULT_CLOSE_REASON: &str = "normal closure";
const ERROR_CLOSE_REASON: &str = "internal error";

type OriginSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial the origin and, on success, upgrade the client connection and
/// relay frames until either side closes.
pub async fn handle_upgrade(
    ws: WebSocketUpgrade,
    origin: &Origin,
    inbound_headers: &HeaderMap,
    inbound_uri: &Uri,
    request_id: String,
) -> Response<Body> {
    let target = dial_target(origin, inbound_uri);

    tracing::debug!(
        request_id = %request_id,
        target = %target,
        "Dialing origin for WebSocket upgrade"
    );

    let mut dial = match target.as_str().into_client_request() {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Invalid origin dial target");
            return response::bad_gateway(&e.to_string());
        }
    };
    apply_handshake_headers(dial.headers_mut(), inbound_headers);

    match connect_async(dial).await {
        Ok((origin_socket, handshake)) => {
            let subprotocol = handshake.headers().get(header::SEC_WEBSOCKET_PROTOCOL).cloned();
            metrics::record_relay_session();

            let mut upgrade_response =
                ws.on_upgrade(move |client| relay(client, origin_socket, request_id));
            // Surface the subprotocol the origin selected; the proxy never
            // negotiates one itself.
            if let Some(protocol) = subprotocol {
                upgrade_response
                    .headers_mut()
                    .insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);
            }
            upgrade_response
        }
        Err(WsError::Http(rejection)) => {
            tracing::warn!(
                request_id = %request_id,
                status = %rejection.status(),
                "Origin refused WebSocket upgrade"
            );
            origin_rejection(rejection)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "WebSocket dial to origin failed");
            response::bad_gateway(&e.to_string())
        }
    }
}

/// Build the origin dial URL: rewritten path, verbatim query, ws/wss scheme.
fn dial_target(origin: &Origin, inbound: &Uri) -> String {
    let path = request::rewrite_path(&origin.base_path, inbound.path());
    match inbound.query() {
        Some(query) => format!("{}://{}{}?{}", origin.ws_scheme(), origin.authority, path, query),
        None => format!("{}://{}{}", origin.ws_scheme(), origin.authority, path),
    }
}

/// Copy the allow-listed inbound handshake headers onto the dial request.
fn apply_handshake_headers(dial_headers: &mut HeaderMap, inbound: &HeaderMap) {
    for name in WS_FORWARDED_HEADERS {
        if let Some(value) = inbound.get(name) {
            dial_headers.insert(HeaderName::from_static(name), value.clone());
        }
    }
}

/// Map an origin upgrade rejection onto the client handshake response,
/// preserving the origin's status and body.
fn origin_rejection(
    rejection: axum::http::Response<Option<Vec<u8>>>,
) -> Response<Body> {
    let (parts, body) = rejection.into_parts();

    let mut response = Response::new(Body::from(body.unwrap_or_default()));
    *response.status_mut() = parts.status;
    for (name, value) in parts.headers.iter() {
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    response
}

/// Pump frames between the two sockets until either side closes.
///
/// Each direction is an independent flow; `tokio::select!` services both
/// without giving either priority. Once either direction observes a close
/// or error it propagates the close to its destination and the session
/// ends, so nothing is forwarded after either handle leaves OPEN.
async fn relay(client: WebSocket, origin: OriginSocket, request_id: String) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut origin_tx, mut origin_rx) = origin.split();

    let client_to_origin = async {
        while let Some(message) = client_rx.next().await {
            match message {
                Ok(ClientMessage::Text(text)) => {
                    if let Err(e) = origin_tx
                        .send(OriginMessage::Text(text.as_str().into()))
                        .await
                    {
                        tracing::warn!(request_id = %request_id, error = %e, "Dropped client frame, origin side not open");
                        break;
                    }
                }
                Ok(ClientMessage::Binary(data)) => {
                    if let Err(e) = origin_tx.send(OriginMessage::Binary(data)).await {
                        tracing::warn!(request_id = %request_id, error = %e, "Dropped client frame, origin side not open");
                        break;
                    }
                }
                Ok(ClientMessage::Close(frame)) => {
                    let close = close_frame_for_origin(frame.as_ref());
                    tracing::debug!(
                        request_id = %request_id,
                        code = u16::from(close.code),
                        "Client closed, propagating to origin"
                    );
                    let _ = origin_tx.send(OriginMessage::Close(Some(close))).await;
                    break;
                }
                // Ping/pong are answered by the protocol layer on each leg.
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(request_id = %request_id, error = %e, "Client socket error");
                    let close = OriginCloseFrame {
                        code: CloseCode::Error,
                        reason: ERROR_CLOSE_REASON.into(),
                    };
                    let _ = origin_tx.send(OriginMessage::Close(Some(close))).await;
                    break;
                }
            }
        }
    };

    // Yields the close frame to echo on the origin leg when the origin
    // initiated the close.
    let origin_to_client = async {
        while let Some(message) = origin_rx.next().await {
            match message {
                Ok(OriginMessage::Text(text)) => {
                    if let Err(e) = client_tx
                        .send(ClientMessage::Text(text.as_str().into()))
                        .await
                    {
                        tracing::warn!(request_id = %request_id, error = %e, "Dropped origin frame, client side not open");
                        return None;
                    }
                }
                Ok(OriginMessage::Binary(data)) => {
                    if let Err(e) = client_tx.send(ClientMessage::Binary(data)).await {
                        tracing::warn!(request_id = %request_id, error = %e, "Dropped origin frame, client side not open");
                        return None;
                    }
                }
                Ok(OriginMessage::Close(frame)) => {
                    let close = close_frame_for_client(frame.as_ref());
                    tracing::debug!(
                        request_id = %request_id,
                        code = close.code,
                        "Origin closed, propagating to client"
                    );
                    let _ = client_tx.send(ClientMessage::Close(Some(close))).await;
                    return Some(frame);
                }
                Ok(_) => {}
                Err(e) => {
                    match e {
                        WsError::ConnectionClosed
                        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                            tracing::debug!(request_id = %request_id, "Origin disconnected: {e}");
                        }
                        _ => {
                            tracing::warn!(request_id = %request_id, error = %e, "Origin socket error");
                        }
                    }
                    let close = CloseFrame {
                        code: 1011,
                        reason: ERROR_CLOSE_REASON.into(),
                    };
                    let _ = client_tx.send(ClientMessage::Close(Some(close))).await;
                    return None;
                }
            }
        }
        None
    };

    let close_echo = tokio::select! {
        _ = client_to_origin => {
            tracing::debug!(request_id = %request_id, "Client to origin flow ended");
            None
        }
        echo = origin_to_client => {
            tracing::debug!(request_id = %request_id, "Origin to client flow ended");
            echo
        }
    };

    // Complete the close handshake on the origin leg; without the echo the
    // origin only ever sees an abrupt TCP teardown.
    if close_echo.is_some() {
        let _ = origin_tx.send(OriginMessage::Close(close_echo.flatten())).await;
    }

    tracing::debug!(request_id = %request_id, "Relay session closed");
}

/// Translate a client close frame for the origin leg.
///
/// 1005 means no status was received; it cannot be sent on the wire and
/// is replaced by the 1000/"normal closure" default, as is an absent
/// close frame. Explicit codes and reasons propagate exactly.
fn close_frame_for_origin(frame: Option<&CloseFrame>) -> OriginCloseFrame {
    match frame {
        Some(f) if f.code != NO_STATUS_CODE => OriginCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        },
        _ => OriginCloseFrame {
            code: CloseCode::Normal,
            reason: DEFAULT_CLOSE_REASON.into(),
        },
    }
}

/// Translate an origin close frame for the client leg.
fn close_frame_for_client(frame: Option<&OriginCloseFrame>) -> CloseFrame {
    match frame {
        Some(f) if u16::from(f.code) != NO_STATUS_CODE => CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().into(),
        },
        _ => CloseFrame {
            code: 1000,
            reason: DEFAULT_CLOSE_REASON.into(),
        },
    }
}

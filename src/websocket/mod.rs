//! The WebSocket dispatch path.
//!
//! Masking, fragmentation and the wire codec live in the frame codec
//! collaborator (`tokio-tungstenite`); this module only models complete
//! frames, carries the per-connection context and re-enters dispatch for
//! every inbound frame with the mapping that was selected at upgrade time.

use crate::{
    error::{EmbernetError, EmbernetErrorKind},
    exchange::CancelSignal,
    middlewares,
    req::HttpRequest,
    requirement::{RequirementCatalogue, ValueSource},
    router::{EndpointHandler, EndpointMapping},
    session::Session,
    types::SchemeFamily,
};
use ahash::AHashMap;
use bytes::Bytes;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::{self, Display};
use std::sync::Arc;
use tokio_tungstenite::{
    tungstenite::{protocol::Role, Message},
    WebSocketStream,
};

type WsSink = SplitSink<WebSocketStream<TokioIo<Upgraded>>, Message>;

/// Frame opcodes as delivered by the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameOpcode {
    /// A continuation of a fragmented message.
    Continuation,
    /// A UTF-8 text frame.
    Text,
    /// A binary frame.
    Binary,
    /// The peer is closing the connection.
    Close,
    /// A ping; the codec answers it, dispatch still observes it.
    Ping,
    /// A pong.
    Pong,
}

impl Display for FrameOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcode = match self {
            FrameOpcode::Continuation => "continuation",
            FrameOpcode::Text => "text",
            FrameOpcode::Binary => "binary",
            FrameOpcode::Close => "close",
            FrameOpcode::Ping => "ping",
            FrameOpcode::Pong => "pong",
        };
        write!(f, "{}", opcode)
    }
}

/// One complete inbound or outbound frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// The frame opcode.
    pub opcode: FrameOpcode,
    /// The payload bytes.
    pub payload: Bytes,
    /// Final-fragment flag; the codec reassembles, so inbound frames carry
    /// `true`.
    pub fin: bool,
}

impl Frame {
    /// A text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            opcode: FrameOpcode::Text,
            payload: Bytes::from(text.into().into_bytes()),
            fin: true,
        }
    }

    /// A binary frame.
    pub fn binary(payload: Vec<u8>) -> Self {
        Self {
            opcode: FrameOpcode::Binary,
            payload: Bytes::from(payload),
            fin: true,
        }
    }

    /// The payload as UTF-8 text.
    pub fn as_text(&self) -> Result<&str, EmbernetError> {
        std::str::from_utf8(&self.payload).map_err(|e| {
            EmbernetError::new(EmbernetErrorKind::InvalidInput, e.to_string())
        })
    }

    pub(crate) fn from_message(message: &Message) -> Option<Frame> {
        match message {
            Message::Text(text) => Some(Frame {
                opcode: FrameOpcode::Text,
                payload: Bytes::from(text.clone().into_bytes()),
                fin: true,
            }),
            Message::Binary(payload) => Some(Frame {
                opcode: FrameOpcode::Binary,
                payload: Bytes::from(payload.clone()),
                fin: true,
            }),
            Message::Ping(payload) => Some(Frame {
                opcode: FrameOpcode::Ping,
                payload: Bytes::from(payload.clone()),
                fin: true,
            }),
            Message::Pong(payload) => Some(Frame {
                opcode: FrameOpcode::Pong,
                payload: Bytes::from(payload.clone()),
                fin: true,
            }),
            Message::Close(reason) => Some(Frame {
                opcode: FrameOpcode::Close,
                payload: reason
                    .as_ref()
                    .map(|r| Bytes::from(r.reason.to_string().into_bytes()))
                    .unwrap_or_default(),
                fin: true,
            }),
            Message::Frame(_) => None,
        }
    }

    pub(crate) fn into_message(self) -> Message {
        match self.opcode {
            FrameOpcode::Text | FrameOpcode::Continuation => {
                Message::Text(String::from_utf8_lossy(&self.payload).into_owned())
            }
            FrameOpcode::Binary => Message::Binary(self.payload.to_vec()),
            FrameOpcode::Ping => Message::Ping(self.payload.to_vec()),
            FrameOpcode::Pong => Message::Pong(self.payload.to_vec()),
            FrameOpcode::Close => Message::Close(None),
        }
    }
}

/// The per-connection context handed to WebSocket handlers, once per
/// inbound frame.
///
/// Carries the upgrade-time request view (headers, cookies, captures), the
/// session bound at upgrade, the per-connection attribute map and the
/// outbound half of the socket.
pub struct SocketExchange {
    request: HttpRequest,
    session: Option<Arc<Session>>,
    attributes: AHashMap<String, serde_json::Value>,
    sink: WsSink,
}

impl SocketExchange {
    /// The request view captured at upgrade time.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The session bound at upgrade, if any.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.as_ref().map(Arc::clone)
    }

    /// Stores a per-connection attribute.
    pub fn set_attribute<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        if let Ok(value) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), value);
        }
    }

    /// Reads a per-connection attribute.
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Sends a text frame to the peer.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), EmbernetError> {
        self.send_frame(Frame::text(text)).await
    }

    /// Sends a binary frame to the peer.
    pub async fn send_bytes(&mut self, payload: Vec<u8>) -> Result<(), EmbernetError> {
        self.send_frame(Frame::binary(payload)).await
    }

    /// Sends a text frame containing the JSON form of `value`.
    pub async fn send_json<V: Serialize>(&mut self, value: &V) -> Result<(), EmbernetError> {
        let text = serde_json::to_string(value)?;
        self.send_text(text).await
    }

    /// Sends any outbound frame to the peer.
    pub async fn send_frame(&mut self, frame: Frame) -> Result<(), EmbernetError> {
        self.sink
            .send(frame.into_message())
            .await
            .map_err(|e| EmbernetError::new(EmbernetErrorKind::IO, e.to_string()))
    }

    /// Closes the connection.
    pub async fn close(&mut self) -> Result<(), EmbernetError> {
        self.sink
            .close()
            .await
            .map_err(|e| EmbernetError::new(EmbernetErrorKind::IO, e.to_string()))
    }
}

/// Drives one upgraded connection: reads frames from the codec and
/// re-enters dispatch for each with the mapping selected at upgrade.
///
/// The `websocket-opcode` requirement is evaluated per frame; frames the
/// mapping does not accept are skipped. The middleware chain runs per frame
/// with the shared callback; a middleware cancel skips the handler for that
/// frame, except on close frames, where the disconnect is unavoidable and
/// the cancel is ignored. The loop exits when the codec reports the peer
/// gone, the connection's cancellation signal fires, or the server shuts
/// down.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn run_socket(
    upgraded: Upgraded,
    mapping: Arc<EndpointMapping>,
    request: HttpRequest,
    session: Option<Arc<Session>>,
    globals: Vec<Arc<dyn middlewares::Middleware>>,
    catalogue: Arc<RequirementCatalogue>,
    cancel: CancelSignal,
    shutdown: CancelSignal,
) {
    let io = TokioIo::new(upgraded);
    let socket = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
    let (sink, mut stream) = socket.split();

    let EndpointHandler::Socket(handler) = &mapping.handler else {
        tracing::error!(
            pattern = mapping.pattern().template(),
            "upgrade selected a non-socket mapping"
        );
        return;
    };

    let mut exchange = SocketExchange {
        request,
        session,
        attributes: AHashMap::new(),
        sink,
    };

    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            _ = cancel.cancelled() => break,
            _ = shutdown.cancelled() => break,
        };
        let Some(message) = message else { break };
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "websocket read failed, closing");
                break;
            }
        };
        let Some(frame) = Frame::from_message(&message) else {
            continue;
        };
        let disconnect = frame.opcode == FrameOpcode::Close;

        if !disconnect && !frame_accepted(&mapping, &catalogue, &exchange, &frame) {
            continue;
        }

        let callback = middlewares::run_frame_chain(
            &globals,
            &mapping.middlewares,
            &mut exchange,
            &frame,
        )
        .await;
        if callback.is_cancelled() && !disconnect {
            continue;
        }

        exchange = (handler)(exchange, frame).await;

        if disconnect {
            break;
        }
    }

    let _ = exchange.close().await;
}

fn frame_accepted(
    mapping: &EndpointMapping,
    catalogue: &RequirementCatalogue,
    exchange: &SocketExchange,
    frame: &Frame,
) -> bool {
    let source = ValueSource {
        request: &exchange.request,
        frame: Some(frame),
    };
    catalogue
        .applicable(SchemeFamily::Ws)
        .iter()
        .all(|descriptor| match mapping.requirement(descriptor.name()) {
            Some(info) => descriptor.applies(&source, info),
            None => true,
        })
}

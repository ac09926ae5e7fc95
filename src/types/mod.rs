use crate::{
    exchange::Exchange,
    websocket::{Frame, SocketExchange},
};
use serde::Serialize;
use std::{
    fmt::{self, Display},
    future::Future,
    pin::Pin,
    sync::Arc,
};

/// The URI scheme an exchange arrived on.
///
/// `Http`/`Https` and `Ws`/`Wss` form two families; the upgrade between the
/// plain and the TLS member of a family is a property of the transport, not
/// of routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
}

impl Scheme {
    /// The family this scheme belongs to. Routing, requirements and global
    /// middlewares are all keyed by family, never by individual scheme.
    pub fn family(&self) -> SchemeFamily {
        match self {
            Scheme::Http | Scheme::Https => SchemeFamily::Http,
            Scheme::Ws | Scheme::Wss => SchemeFamily::Ws,
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        };
        write!(f, "{}", scheme)
    }
}

/// One of the two scheme families an endpoint can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeFamily {
    /// `http` and `https`.
    Http,
    /// `ws` and `wss`.
    Ws,
}

impl Display for SchemeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemeFamily::Http => write!(f, "http"),
            SchemeFamily::Ws => write!(f, "ws"),
        }
    }
}

/// HTTP request methods understood by the registry.
#[allow(missing_docs)]
#[derive(Eq, Hash, PartialEq, Clone, Copy, Debug, PartialOrd, Ord)]
pub enum HttpMethods {
    GET,
    PUT,
    POST,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl HttpMethods {
    /// Every method of the HTTP family, in a fixed order. Used when a CORS
    /// policy allows all methods.
    pub fn all() -> &'static [HttpMethods] {
        &[
            HttpMethods::GET,
            HttpMethods::PUT,
            HttpMethods::POST,
            HttpMethods::DELETE,
            HttpMethods::PATCH,
            HttpMethods::HEAD,
            HttpMethods::OPTIONS,
        ]
    }

    /// Parses a method name. Comparison is case-sensitive, matching the wire
    /// format.
    pub fn parse(value: &str) -> Option<HttpMethods> {
        match value {
            "GET" => Some(HttpMethods::GET),
            "PUT" => Some(HttpMethods::PUT),
            "POST" => Some(HttpMethods::POST),
            "DELETE" => Some(HttpMethods::DELETE),
            "PATCH" => Some(HttpMethods::PATCH),
            "HEAD" => Some(HttpMethods::HEAD),
            "OPTIONS" => Some(HttpMethods::OPTIONS),
            _ => None,
        }
    }
}

impl Display for HttpMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method = match self {
            HttpMethods::GET => "GET",
            HttpMethods::PUT => "PUT",
            HttpMethods::POST => "POST",
            HttpMethods::DELETE => "DELETE",
            HttpMethods::PATCH => "PATCH",
            HttpMethods::HEAD => "HEAD",
            HttpMethods::OPTIONS => "OPTIONS",
        };
        write!(f, "{}", method)
    }
}

/// Endpoint priority used as the first ranking key during dispatch.
///
/// Totally ordered, `Highest` wins. `Normal` is the default for every
/// registration that does not say otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Considered last.
    Lowest,
    /// Considered after `Normal`.
    Low,
    /// The default.
    Normal,
    /// Considered before `Normal`.
    High,
    /// Considered first.
    Highest,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let priority = match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        };
        write!(f, "{}", priority)
    }
}

// HttpRequest types

/// Broad classification of a request body snapshot, derived from the
/// Content-Type header at bind time.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestBodyType {
    JSON,
    TEXT,
    FORM,
    BINARY,
    EMPTY,
}

impl Display for RequestBodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            RequestBodyType::JSON => "json",
            RequestBodyType::TEXT => "text",
            RequestBodyType::FORM => "form",
            RequestBodyType::BINARY => "binary",
            RequestBodyType::EMPTY => "empty",
        };
        write!(f, "{}", kind)
    }
}

// HttpResponse types

/// Content type of an outgoing response body.
#[allow(missing_docs)]
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ResponseContentType {
    JSON,
    TEXT,
    HTML,
    BINARY,
}

impl ResponseContentType {
    pub(crate) fn mime(&self) -> &'static str {
        match self {
            ResponseContentType::JSON => "application/json",
            ResponseContentType::TEXT => "text/plain; charset=utf-8",
            ResponseContentType::HTML => "text/html; charset=utf-8",
            ResponseContentType::BINARY => "application/octet-stream",
        }
    }
}

/// Buffered body content of an outgoing response.
#[derive(Serialize, PartialEq, Debug, Clone)]
pub(crate) enum ResponseContentBody {
    JSON(serde_json::Value),
    TEXT(String),
    HTML(String),
    BINARY(Vec<u8>),
    EMPTY,
}

impl ResponseContentBody {
    pub fn new_text<T: Into<String>>(text: T) -> Self {
        ResponseContentBody::TEXT(text.into())
    }

    pub fn new_html<T: Into<String>>(text: T) -> Self {
        ResponseContentBody::HTML(text.into())
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            ResponseContentBody::JSON(value) => serde_json::to_vec(&value).unwrap_or_default(),
            ResponseContentBody::TEXT(text) => text.into_bytes(),
            ResponseContentBody::HTML(html) => html.into_bytes(),
            ResponseContentBody::BINARY(bytes) => bytes,
            ResponseContentBody::EMPTY => Vec::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, ResponseContentBody::EMPTY)
    }
}

// Handler types

/// Boxed future returned by an HTTP endpoint handler.
pub type HandlerFut = Pin<Box<dyn Future<Output = Exchange> + Send + 'static>>;

/// An HTTP endpoint handler. Receives the bound exchange, returns it after
/// writing the response view.
pub type Handler = Arc<dyn Fn(Exchange) -> HandlerFut + Send + Sync + 'static>;

/// Boxed future returned by a WebSocket endpoint handler.
pub type SocketHandlerFut = Pin<Box<dyn Future<Output = SocketExchange> + Send + 'static>>;

/// A WebSocket endpoint handler, invoked once per inbound frame with the
/// mapping selected at upgrade.
pub type SocketHandler =
    Arc<dyn Fn(SocketExchange, Frame) -> SocketHandlerFut + Send + Sync + 'static>;

pub(crate) fn box_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Exchange> + Send + 'static,
{
    Arc::new(move |exchange| Box::pin(f(exchange)))
}

pub(crate) fn box_socket_handler<F, Fut>(f: F) -> SocketHandler
where
    F: Fn(SocketExchange, Frame) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SocketExchange> + Send + 'static,
{
    Arc::new(move |exchange, frame| Box::pin(f(exchange, frame)))
}

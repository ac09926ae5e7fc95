use crate::{error::EmbernetError, req::HttpRequest};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// A body parser claimed by content type.
///
/// Parsers live outside the core; the server only holds the registry and
/// consults it through [`Exchange::parse_body`](crate::exchange::Exchange::parse_body).
/// A parser rejecting the payload surfaces as a `400` carrying the parser's
/// message.
pub trait BodyParser: Send + Sync {
    /// Parses the request's body snapshot into a value.
    fn parse(&self, request: &HttpRequest) -> Result<serde_json::Value, EmbernetError>;
}

/// Registry mapping content types to parsers. Only the lookup contract is
/// consumed by the core.
#[derive(Default)]
pub struct BodyParserRegistry {
    parsers: RwLock<AHashMap<String, Arc<dyn BodyParser>>>,
}

impl BodyParserRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a content type (`type/subtype`, parameters ignored) for a
    /// parser. A later registration for the same content type replaces the
    /// earlier one.
    pub fn register(&self, content_type: impl Into<String>, parser: Arc<dyn BodyParser>) {
        self.parsers
            .write()
            .insert(content_type.into().to_ascii_lowercase(), parser);
    }

    /// The parser claiming `content_type`, if any.
    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn BodyParser>> {
        let essence = content_type
            .parse::<mime::Mime>()
            .map(|m| m.essence_str().to_ascii_lowercase())
            .unwrap_or_else(|_| content_type.to_ascii_lowercase());
        self.parsers.read().get(&essence).map(Arc::clone)
    }
}

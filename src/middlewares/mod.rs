//! The middleware engine: an ordered, cancellable pre-handler pipeline
//! shared by the HTTP and WebSocket dispatch paths.
//!
//! Middleware runs strictly sequentially on the handling worker: globals for
//! the exchange's scheme family first, then the mapping-local chain resolved
//! at registration time, each in registration order. All middlewares of one
//! request share a single [`CallbackInfo`]; setting it cancelled lets the
//! chain finish but keeps the handler from being entered.

use crate::{exchange::Exchange, types::SchemeFamily, websocket::{Frame, SocketExchange}};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Built-in request logger middleware.
pub mod logger;

/// The shared, cancellable callback threaded through one request's
/// middleware chain.
#[derive(Debug, Default)]
pub struct CallbackInfo {
    cancelled: bool,
    cancel_reason: Option<String>,
}

impl CallbackInfo {
    /// A fresh, uncancelled callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the request: the remaining chain still runs, the handler
    /// does not.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancel_reason = Some(reason.into());
    }

    /// Whether any middleware cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The reason given by the cancelling middleware, if any.
    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }
}

/// A pre-handler hook.
///
/// Implementations override [`handle`](Middleware::handle) for the HTTP
/// path, [`handle_frame`](Middleware::handle_frame) for the per-frame
/// WebSocket path, or both; the defaults do nothing. The `name` identifies
/// the middleware for global-list deduplication: a mapping-local middleware
/// whose name is already registered globally for the family is dropped at
/// resolution time, since globals run unconditionally.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Unique middleware name used for deduplication against globals.
    fn name(&self) -> &str;

    /// Which scheme families this middleware participates in.
    fn applies_to(&self, family: SchemeFamily) -> bool {
        let _ = family;
        true
    }

    /// Called once per HTTP exchange (and once at WebSocket upgrade),
    /// before the handler.
    async fn handle(&self, callback: &mut CallbackInfo, exchange: &mut Exchange) {
        let _ = (callback, exchange);
    }

    /// Called once per inbound WebSocket frame, before the frame handler.
    async fn handle_frame(
        &self,
        callback: &mut CallbackInfo,
        exchange: &mut SocketExchange,
        frame: &Frame,
    ) {
        let _ = (callback, exchange, frame);
    }
}

/// The global middleware lists, one per scheme family, behind a single
/// registry-wide lock. Dispatch reads take a snapshot.
#[derive(Default)]
pub struct GlobalMiddlewares {
    inner: RwLock<GlobalLists>,
}

#[derive(Default)]
struct GlobalLists {
    http: Vec<Arc<dyn Middleware>>,
    ws: Vec<Arc<dyn Middleware>>,
}

impl GlobalMiddlewares {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a global middleware to every family it applies to.
    pub fn register(&self, middleware: Arc<dyn Middleware>) {
        let mut inner = self.inner.write();
        if middleware.applies_to(SchemeFamily::Http) {
            inner.http.push(Arc::clone(&middleware));
        }
        if middleware.applies_to(SchemeFamily::Ws) {
            inner.ws.push(middleware);
        }
    }

    /// A snapshot of the family's globals in registration order.
    pub fn snapshot(&self, family: SchemeFamily) -> Vec<Arc<dyn Middleware>> {
        let inner = self.inner.read();
        match family {
            SchemeFamily::Http => inner.http.clone(),
            SchemeFamily::Ws => inner.ws.clone(),
        }
    }

    /// Whether a global with this name exists for the family.
    pub fn contains(&self, family: SchemeFamily, name: &str) -> bool {
        self.snapshot(family)
            .iter()
            .any(|middleware| middleware.name() == name)
    }
}

/// Resolves a mapping's local chain at registration time: declared
/// middlewares minus those not applicable to the family, minus those already
/// present in the family's global list.
pub(crate) fn resolve_chain(
    declared: &[Arc<dyn Middleware>],
    family: SchemeFamily,
    globals: &GlobalMiddlewares,
) -> Vec<Arc<dyn Middleware>> {
    declared
        .iter()
        .filter(|middleware| middleware.applies_to(family))
        .filter(|middleware| !globals.contains(family, middleware.name()))
        .map(Arc::clone)
        .collect()
}

/// Runs the globals-then-locals chain for an HTTP exchange.
///
/// A transport-level cancel stops the chain immediately; a middleware
/// cancel (through the callback) lets the remaining chain run and is acted
/// on by the dispatcher afterwards.
pub(crate) async fn run_http_chain(
    globals: &[Arc<dyn Middleware>],
    locals: &[Arc<dyn Middleware>],
    exchange: &mut Exchange,
) -> CallbackInfo {
    let mut callback = CallbackInfo::new();
    for middleware in globals.iter().chain(locals.iter()) {
        if exchange.is_cancelled() {
            break;
        }
        middleware.handle(&mut callback, exchange).await;
    }
    callback
}

/// Runs the globals-then-locals chain for one inbound WebSocket frame.
pub(crate) async fn run_frame_chain(
    globals: &[Arc<dyn Middleware>],
    locals: &[Arc<dyn Middleware>],
    exchange: &mut SocketExchange,
    frame: &Frame,
) -> CallbackInfo {
    let mut callback = CallbackInfo::new();
    for middleware in globals.iter().chain(locals.iter()) {
        middleware.handle_frame(&mut callback, exchange, frame).await;
    }
    callback
}


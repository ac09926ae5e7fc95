use crate::{
    body::BodyParserRegistry,
    error::{EmbernetError, EmbernetErrorKind},
    req::HttpRequest,
    res::HttpResponse,
    session::{manager::SessionManager, Session},
};
use ahash::AHashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Notify;

/// Request-level cancellation signal handed in by the transport.
///
/// The accept loop raises it when the connection carrying the request dies
/// or the server shuts down. Once raised, the dispatcher enters no further
/// middleware or handler bodies; in-flight handlers observe it through the
/// exchange, and waiters parked on [`cancelled`](CancelSignal::cancelled)
/// wake.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// A fresh, unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal and wakes every waiter. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the signal is raised. Returns immediately when it
    /// already was.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The per-request context handed to middleware and handlers.
///
/// Owns the immutable request view and the response view, carries the
/// per-request attribute map, and binds the session lazily: the session is
/// allocated on first access and loaded through the driver if the request
/// carried a session cookie.
pub struct Exchange {
    pub(crate) request: HttpRequest,
    pub(crate) response: HttpResponse,
    session: Option<Arc<Session>>,
    attributes: AHashMap<String, serde_json::Value>,
    cancel: CancelSignal,
    sessions: Arc<SessionManager>,
    parsers: Arc<BodyParserRegistry>,
}

impl Exchange {
    pub(crate) fn bind(
        request: HttpRequest,
        response: HttpResponse,
        sessions: Arc<SessionManager>,
        parsers: Arc<BodyParserRegistry>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            request,
            response,
            session: None,
            attributes: AHashMap::new(),
            cancel,
            sessions,
            parsers,
        }
    }

    /// The immutable request view.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// The response view.
    pub fn response(&self) -> &HttpResponse {
        &self.response
    }

    /// Mutable access to the response view.
    pub fn response_mut(&mut self) -> &mut HttpResponse {
        &mut self.response
    }

    /// Replaces the buffered response wholesale. The teacher pattern for
    /// handlers that build a response with the consuming combinators:
    ///
    /// ```no_run
    /// # async fn handler(ex: embernet::exchange::Exchange) -> embernet::exchange::Exchange {
    /// ex.respond(|res| res.ok().text("hi"))
    /// # }
    /// ```
    pub fn respond<F>(mut self, build: F) -> Self
    where
        F: FnOnce(HttpResponse) -> HttpResponse,
    {
        let response = std::mem::take(&mut self.response);
        self.response = build(response);
        self
    }

    /// The session bound to this exchange, allocating and loading it on
    /// first access.
    pub async fn session(&mut self) -> Result<Arc<Session>, EmbernetError> {
        if let Some(session) = &self.session {
            return Ok(Arc::clone(session));
        }
        let session = self.sessions.bind(&self.request).await;
        self.session = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Promotes the exchange's session to persistent: generates a fresh id
    /// and schedules the session cookie on this response. Requires unsent
    /// headers; no-op if the session is already persistent.
    pub async fn make_session_persistent(&mut self) -> Result<(), EmbernetError> {
        let session = self.session().await?;
        self.sessions.make_persistent(&session, &mut self.response)
    }

    /// Destroys the session's persistent record and schedules the deletion
    /// cookie. Requires unsent headers; no-op if not persistent.
    pub async fn destroy_session(&mut self) -> Result<(), EmbernetError> {
        let session = self.session().await?;
        self.sessions
            .destroy_persistent(&session, &mut self.response)
            .await
    }

    /// Stores a per-request attribute, typically from middleware for the
    /// handler to pick up.
    pub fn set_attribute<V: Serialize>(&mut self, key: impl Into<String>, value: V) {
        if let Ok(value) = serde_json::to_value(value) {
            self.attributes.insert(key.into(), value);
        }
    }

    /// Reads a per-request attribute back.
    pub fn attribute<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Whether the transport has cancelled this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs the registered body parser for the request's content type.
    ///
    /// Returns `NotFound` when no parser claims the content type and
    /// `BodyParse` when the parser rejects the payload.
    pub fn parse_body(&self) -> Result<serde_json::Value, EmbernetError> {
        let content_type = self.request.content_type().ok_or_else(|| {
            EmbernetError::new(EmbernetErrorKind::NotFound, "request has no content type")
        })?;
        let parser = self.parsers.lookup(&content_type).ok_or_else(|| {
            EmbernetError::new(
                EmbernetErrorKind::NotFound,
                format!("no body parser registered for '{}'", content_type),
            )
        })?;
        parser.parse(&self.request)
    }

    pub(crate) fn session_if_bound(&self) -> Option<Arc<Session>> {
        self.session.as_ref().map(Arc::clone)
    }

    pub(crate) fn into_views(self) -> (HttpRequest, HttpResponse, Option<Arc<Session>>) {
        (self.request, self.response, self.session)
    }
}

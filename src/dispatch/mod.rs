//! The per-request dispatch funnel: match, filter by requirements, rank,
//! run the middleware chain, invoke the handler, then close the exchange
//! with CORS and session cookies applied at header-send time.

use crate::{
    body::BodyParserRegistry,
    cors::CorsPolicy,
    exchange::{CancelSignal, Exchange},
    helpers,
    middlewares::{self, GlobalMiddlewares},
    req::HttpRequest,
    requirement::{RequirementCatalogue, ValueSource},
    res::{response_status::StatusCode, HttpResponse},
    router::{EndpointHandler, EndpointMapping, RouteRegistry},
    session::{manager::SessionManager, storage::SessionJob, Session},
    types::{Scheme, SchemeFamily},
    websocket,
};
use bytes::Bytes;
use futures::FutureExt;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use std::sync::Arc;

pub(crate) struct Dispatcher {
    pub(crate) registry: Arc<RouteRegistry>,
    pub(crate) catalogue: Arc<RequirementCatalogue>,
    pub(crate) globals: Arc<GlobalMiddlewares>,
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) parsers: Arc<BodyParserRegistry>,
    pub(crate) cors: CorsPolicy,
    pub(crate) max_body_bytes: usize,
    pub(crate) shutdown: CancelSignal,
}

enum Selection {
    Selected {
        mapping: Arc<EndpointMapping>,
        captures: Vec<(String, String)>,
    },
    NotFound,
    MethodNotAllowed,
}

impl Dispatcher {
    /// Entry point for one transport request.
    pub(crate) async fn handle<B>(
        &self,
        request: hyper::Request<B>,
        ip: String,
        cancel: CancelSignal,
    ) -> hyper::Response<Full<Bytes>>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if helpers::is_websocket_upgrade(request.headers()) {
            self.dispatch_upgrade(request, ip, cancel).await
        } else {
            self.dispatch_http(request, ip, cancel).await
        }
    }

    async fn dispatch_http<B>(
        &self,
        request: hyper::Request<B>,
        ip: String,
        cancel: CancelSignal,
    ) -> hyper::Response<Full<Bytes>>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();

        let bytes = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) if err.is::<http_body_util::LengthLimitError>() => {
                return self.finish(
                    HttpRequest::new(),
                    self.error_response(StatusCode::PayloadTooLarge, "Payload Too Large"),
                );
            }
            Err(err) => {
                // A transport failure mid-body is fatal to the exchange.
                tracing::debug!(error = %err, "request body read failed");
                return self.finish(
                    HttpRequest::new(),
                    self.error_response(StatusCode::BadRequest, ""),
                );
            }
        };

        let request = match HttpRequest::from_parts(&parts, bytes, Scheme::Http, ip) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, "request bind failed");
                return self.finish(
                    HttpRequest::new(),
                    self.error_response(StatusCode::BadRequest, "Bad Request"),
                );
            }
        };

        let (mapping, captures) = match self.select(&request) {
            Selection::Selected { mapping, captures } => (mapping, captures),
            Selection::NotFound => {
                return self.finish(
                    request,
                    self.error_response(StatusCode::NotFound, "Not Found"),
                );
            }
            Selection::MethodNotAllowed => {
                return self.finish(
                    request,
                    self.error_response(StatusCode::MethodNotAllowed, "Method Not Allowed"),
                );
            }
        };

        let mut request = request;
        for (name, value) in &captures {
            request.set_param(name, value);
        }

        let mut response = HttpResponse::new();
        response.cors = self.cors.clone();
        let mut exchange = Exchange::bind(
            request,
            response,
            Arc::clone(&self.sessions),
            Arc::clone(&self.parsers),
            cancel.clone(),
        );

        let globals = self.globals.snapshot(SchemeFamily::Http);
        let callback =
            middlewares::run_http_chain(&globals, &mapping.middlewares, &mut exchange).await;

        if cancel.is_cancelled() {
            // The transport gave up on this request; drain state and stop.
            let (request, response, session) = exchange.into_views();
            self.schedule_save(session);
            return self.finish(request, response);
        }

        if callback.is_cancelled() {
            let (request, mut response, session) = exchange.into_views();
            if !response.is_written() {
                let _ = response.try_set_status(StatusCode::Forbidden);
                if let Some(reason) = callback.cancel_reason() {
                    response = response.text(reason.to_string());
                }
            }
            self.schedule_save(session);
            return self.finish(request, response);
        }

        let EndpointHandler::Http(handler) = &mapping.handler else {
            tracing::error!(
                pattern = mapping.pattern().template(),
                "http dispatch selected a socket mapping"
            );
            return self.finish(
                exchange.into_views().0,
                self.error_response(StatusCode::InternalServerError, ""),
            );
        };

        // Snapshot the views so a panicking handler cannot take down a
        // middleware-written response.
        let recovery_request = exchange.request.clone();
        let recovery_response = exchange.response.clone();
        let recovery_session = exchange.session_if_bound();

        match std::panic::AssertUnwindSafe((handler)(exchange))
            .catch_unwind()
            .await
        {
            Ok(exchange) => {
                let (request, response, session) = exchange.into_views();
                self.schedule_save(session);
                self.finish(request, response)
            }
            Err(panic) => {
                let correlation = uuid::Uuid::new_v4();
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "opaque panic payload".to_string());
                tracing::error!(
                    correlation = %correlation,
                    panic = %detail,
                    path = %recovery_request.path,
                    "handler panicked"
                );
                self.schedule_save(recovery_session);
                let mut response = recovery_response;
                if !response.is_written() {
                    let _ = response.try_set_status(StatusCode::InternalServerError);
                }
                self.finish(recovery_request, response)
            }
        }
    }

    async fn dispatch_upgrade<B>(
        &self,
        mut request: hyper::Request<B>,
        ip: String,
        cancel: CancelSignal,
    ) -> hyper::Response<Full<Bytes>>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let key = request
            .headers()
            .get("sec-websocket-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let Some(key) = key else {
            return self.finish(
                HttpRequest::new(),
                self.error_response(StatusCode::BadRequest, "missing Sec-WebSocket-Key"),
            );
        };

        let on_upgrade = hyper::upgrade::on(&mut request);
        let (parts, _body) = request.into_parts();
        let request = match HttpRequest::from_parts(&parts, Bytes::new(), Scheme::Ws, ip) {
            Ok(request) => request,
            Err(_) => {
                return self.finish(
                    HttpRequest::new(),
                    self.error_response(StatusCode::BadRequest, "Bad Request"),
                );
            }
        };

        let (mapping, captures) = match self.select(&request) {
            Selection::Selected { mapping, captures } => (mapping, captures),
            _ => {
                return self.finish(
                    request,
                    self.error_response(StatusCode::NotFound, "Not Found"),
                );
            }
        };

        let mut request = request;
        for (name, value) in &captures {
            request.set_param(name, value);
        }

        let mut response = HttpResponse::new();
        response.cors = self.cors.clone();
        let mut exchange = Exchange::bind(
            request,
            response,
            Arc::clone(&self.sessions),
            Arc::clone(&self.parsers),
            cancel.clone(),
        );

        let globals = self.globals.snapshot(SchemeFamily::Ws);
        let callback =
            middlewares::run_http_chain(&globals, &mapping.middlewares, &mut exchange).await;

        if cancel.is_cancelled() {
            // The transport is gone; there is nothing left to upgrade.
            let (request, response, _session) = exchange.into_views();
            return self.finish(request, response);
        }

        if callback.is_cancelled() {
            let (request, mut response, _session) = exchange.into_views();
            if !response.is_written() {
                let _ = response.try_set_status(StatusCode::Forbidden);
                if let Some(reason) = callback.cancel_reason() {
                    response = response.text(reason.to_string());
                }
            }
            return self.finish(request, response);
        }

        let session = match exchange.session().await {
            Ok(session) => Some(session),
            Err(_) => None,
        };
        let (request, _response, _) = exchange.into_views();

        let accept = helpers::websocket_accept_key(&key);
        let catalogue = Arc::clone(&self.catalogue);
        let socket_globals = globals.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    websocket::run_socket(
                        upgraded,
                        mapping,
                        request,
                        session,
                        socket_globals,
                        catalogue,
                        cancel,
                        shutdown,
                    )
                    .await;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "websocket upgrade failed");
                }
            }
        });

        hyper::Response::builder()
            .status(hyper::StatusCode::SWITCHING_PROTOCOLS)
            .header(hyper::header::UPGRADE, "websocket")
            .header(hyper::header::CONNECTION, "Upgrade")
            .header("Sec-WebSocket-Accept", accept)
            .body(Full::new(Bytes::new()))
            .unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::new())))
    }

    /// Match and filter: every matching mapping is evaluated against the
    /// family's requirement descriptors in registration order; a mapping
    /// survives iff every descriptor it declares accepts the request.
    /// Survivors are ranked by priority, then literal segments, then
    /// placeholder count, then insertion order.
    fn select(&self, request: &HttpRequest) -> Selection {
        let candidates = self.registry.lookup(request.scheme, &request.path);
        if candidates.is_empty() {
            return Selection::NotFound;
        }

        let descriptors = self.catalogue.applicable(request.scheme.family());
        let source = ValueSource {
            request,
            frame: None,
        };

        let mut survivors: Vec<(Arc<EndpointMapping>, Vec<(String, String)>)> = Vec::new();
        let mut method_only_failure = false;
        for (mapping, captures) in candidates {
            let mut failed: Vec<&'static str> = Vec::new();
            for descriptor in &descriptors {
                if let Some(info) = mapping.requirement(descriptor.name()) {
                    if !descriptor.applies(&source, info) {
                        failed.push(descriptor.name());
                    }
                }
            }
            if failed.is_empty() {
                survivors.push((mapping, captures));
            } else if failed == ["method"] {
                method_only_failure = true;
            }
        }

        if survivors.is_empty() {
            return if method_only_failure {
                Selection::MethodNotAllowed
            } else {
                Selection::NotFound
            };
        }

        survivors.sort_by(|(a, _), (b, _)| {
            b.priority
                .cmp(&a.priority)
                .then(b.pattern.literal_segments().cmp(&a.pattern.literal_segments()))
                .then(a.pattern.arity().cmp(&b.pattern.arity()))
                .then(a.seq.cmp(&b.seq))
        });
        let (mapping, captures) = survivors.remove(0);
        Selection::Selected { mapping, captures }
    }

    /// Closes the exchange: CORS at header-send, then the already-buffered
    /// session cookies, then the body.
    fn finish(
        &self,
        request: HttpRequest,
        mut response: HttpResponse,
    ) -> hyper::Response<Full<Bytes>> {
        let policy = response.cors.clone();
        if let Err(err) = policy.apply(&request, &mut response) {
            tracing::error!(error = %err, "cors application failed");
        }
        if let Err(err) = response.mark_headers_sent() {
            tracing::error!(error = %err, "response already flushed");
        }
        response.mark_body_flushing();
        response.mark_closed();
        response.into_hyper_response()
    }

    fn error_response(&self, status: StatusCode, body: &str) -> HttpResponse {
        let mut response = HttpResponse::new();
        response.cors = self.cors.clone();
        let _ = response.try_set_status(status);
        if body.is_empty() {
            response
        } else {
            response.text(body.to_string())
        }
    }

    /// Detaches the end-of-exchange save so persistence completes even when
    /// the client goes away.
    fn schedule_save(&self, session: Option<Arc<Session>>) {
        let Some(session) = session else { return };
        if !session.is_persistent() || !session.is_dirty() {
            return;
        }
        tokio::spawn(async move {
            session
                .storage()
                .perform(&session, SessionJob::Save)
                .await;
            if let Some(err) = session.storage().take_last_error() {
                tracing::error!(error = %err, "end-of-exchange session save failed");
            }
        });
    }
}

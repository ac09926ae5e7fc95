use crate::{
    body::BodyParserRegistry,
    cors::CorsPolicy,
    dispatch::Dispatcher,
    error::{EmbernetError, EmbernetErrorKind},
    exchange::{CancelSignal, Exchange},
    middlewares::{self, logger::LoggerConfig, logger::RequestLogger, GlobalMiddlewares, Middleware},
    requirement::{RequirementCatalogue, RequirementDescriptor, RequirementInfo, RequirementKind},
    router::{pattern::PathPattern, EndpointHandler, EndpointId, RouteRegistry},
    session::manager::{SessionConfig, SessionManager},
    types::{
        box_handler, box_socket_handler, HttpMethods, Priority, RequestBodyType, SchemeFamily,
    },
    websocket::{Frame, FrameOpcode, SocketExchange},
};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Initialization-time server configuration.
///
/// All global mutable state of the server (the default session driver, the
/// reference cookie template, the CORS policy) lives here and is passed in
/// on construction; there are no process-wide singletons.
pub struct ServerConfig {
    /// Session subsystem configuration.
    pub session: SessionConfig,

    /// The CORS policy applied to every HTTP exchange.
    pub cors: CorsPolicy,

    /// Upper bound for buffered request bodies; larger payloads are
    /// answered with `413`.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            cors: CorsPolicy::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Describes one endpoint registration: pattern, methods, priority,
/// requirements and mapping-local middlewares.
///
/// ## Example
///
/// ```
/// use embernet::{app::EndpointSpec, types::Priority};
///
/// let spec = EndpointSpec::get("/users/{id:int}")
///     .priority(Priority::High)
///     .require_header("X-Auth");
/// ```
pub struct EndpointSpec {
    pattern: String,
    family: SchemeFamily,
    methods: Vec<HttpMethods>,
    priority: Priority,
    requirements: Vec<(String, RequirementInfo)>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl EndpointSpec {
    /// An HTTP-family endpoint with no method restriction.
    pub fn http(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            family: SchemeFamily::Http,
            methods: Vec::new(),
            priority: Priority::default(),
            requirements: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// A WebSocket-family endpoint.
    pub fn socket(pattern: impl Into<String>) -> Self {
        Self {
            family: SchemeFamily::Ws,
            ..Self::http(pattern)
        }
    }

    /// An HTTP endpoint restricted to `GET`.
    pub fn get(pattern: impl Into<String>) -> Self {
        Self::http(pattern).method(HttpMethods::GET)
    }

    /// An HTTP endpoint restricted to `POST`.
    pub fn post(pattern: impl Into<String>) -> Self {
        Self::http(pattern).method(HttpMethods::POST)
    }

    /// An HTTP endpoint restricted to `PUT`.
    pub fn put(pattern: impl Into<String>) -> Self {
        Self::http(pattern).method(HttpMethods::PUT)
    }

    /// An HTTP endpoint restricted to `DELETE`.
    pub fn delete(pattern: impl Into<String>) -> Self {
        Self::http(pattern).method(HttpMethods::DELETE)
    }

    /// An HTTP endpoint restricted to `PATCH`.
    pub fn patch(pattern: impl Into<String>) -> Self {
        Self::http(pattern).method(HttpMethods::PATCH)
    }

    /// Adds a method to the endpoint's method set.
    pub fn method(mut self, method: HttpMethods) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Sets the ranking priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Declares a raw requirement. Declaring the same name twice merges the
    /// value lists, preserving order and dropping duplicates.
    pub fn require(
        mut self,
        name: impl Into<String>,
        kind: RequirementKind,
        values: Vec<String>,
    ) -> Self {
        let name = name.into();
        let info = RequirementInfo::new(kind, values);
        match self
            .requirements
            .iter_mut()
            .find(|(existing, _)| existing == &name)
        {
            Some((_, existing)) => existing.merge(&info),
            None => self.requirements.push((name, info)),
        }
        self
    }

    /// Requires a header to be present.
    pub fn require_header(self, name: impl Into<String>) -> Self {
        self.require("headers-present", RequirementKind::Flag, vec![name.into()])
    }

    /// Requires a cookie to be present.
    pub fn require_cookie(self, name: impl Into<String>) -> Self {
        self.require("cookie-present", RequirementKind::Flag, vec![name.into()])
    }

    /// Requires a query parameter to be present.
    pub fn require_query(self, name: impl Into<String>) -> Self {
        self.require(
            "query-parameter-present",
            RequirementKind::Flag,
            vec![name.into()],
        )
    }

    /// Accepts only the given request content type.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.require(
            "content-type",
            RequirementKind::Storing,
            vec![content_type.into()],
        )
    }

    /// Accepts only requests for the given host.
    pub fn domain(self, domain: impl Into<String>) -> Self {
        self.require("domain", RequirementKind::Storing, vec![domain.into()])
    }

    /// Accepts only the given body classification.
    pub fn body_type(self, body_type: RequestBodyType) -> Self {
        self.require(
            "body-type",
            RequirementKind::Storing,
            vec![body_type.to_string()],
        )
    }

    /// Accepts only frames with the given opcode (WebSocket family).
    pub fn opcode(self, opcode: FrameOpcode) -> Self {
        self.require(
            "websocket-opcode",
            RequirementKind::Storing,
            vec![opcode.to_string()],
        )
    }

    /// Appends a mapping-local middleware.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    fn into_parts(
        mut self,
    ) -> (
        String,
        SchemeFamily,
        Priority,
        Vec<(String, RequirementInfo)>,
        Vec<Arc<dyn Middleware>>,
    ) {
        if !self.methods.is_empty() {
            let values = self.methods.iter().map(|m| m.to_string()).collect();
            let info = RequirementInfo::new(RequirementKind::Storing, values);
            match self
                .requirements
                .iter_mut()
                .find(|(name, _)| name == "method")
            {
                Some((_, existing)) => existing.merge(&info),
                None => self.requirements.insert(0, ("method".to_string(), info)),
            }
        }
        (
            self.pattern,
            self.family,
            self.priority,
            self.requirements,
            self.middlewares,
        )
    }
}

/// The embeddable application server.
///
/// `Server` is the library's front door: register endpoints and global
/// middlewares, configure sessions and CORS through [`ServerConfig`], then
/// either drive it with [`listen`](Server::listen) inside the host process
/// or embed it behind an existing transport.
///
/// ## Example
///
/// ```no_run
/// use embernet::app::Server;
///
/// #[tokio::main]
/// async fn main() {
///     let server = Server::new();
///     server
///         .get("/hello", |ex| async move { ex.respond(|res| res.ok().text("hi")) })
///         .unwrap();
///     server.listen(3000, || println!("listening on 3000")).await;
/// }
/// ```
pub struct Server {
    registry: Arc<RouteRegistry>,
    catalogue: RequirementCatalogue,
    globals: Arc<GlobalMiddlewares>,
    sessions: Arc<SessionManager>,
    parsers: Arc<BodyParserRegistry>,
    cors: CorsPolicy,
    max_body_bytes: usize,
    shutdown: CancelSignal,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server from an explicit configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(RouteRegistry::new()),
            catalogue: RequirementCatalogue::with_builtins(),
            globals: Arc::new(GlobalMiddlewares::new()),
            sessions: Arc::new(SessionManager::new(config.session)),
            parsers: Arc::new(BodyParserRegistry::new()),
            cors: config.cors,
            max_body_bytes: config.max_body_bytes,
            shutdown: CancelSignal::new(),
        }
    }

    /// The server-wide shutdown signal. [`listen`](Server::listen) raises it
    /// on ctrl-c; embedders driving their own transport can raise it
    /// themselves so in-flight exchanges and open sockets observe the
    /// shutdown.
    pub fn shutdown_signal(&self) -> CancelSignal {
        self.shutdown.clone()
    }

    /// Registers an endpoint described by `spec`.
    ///
    /// Fails with `InvalidPattern` when the template does not compile, with
    /// `InvalidInput` when a declared requirement name is unknown to the
    /// catalogue, and with `DuplicateEndpoint` on an exact duplicate.
    pub fn endpoint<F, Fut>(&self, spec: EndpointSpec, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        let (pattern, family, priority, requirements, declared) = spec.into_parts();
        if family != SchemeFamily::Http {
            return Err(EmbernetError::new(
                EmbernetErrorKind::InvalidInput,
                "socket endpoints take a socket handler; use Server::socket",
            ));
        }
        self.register_mapping(
            pattern,
            family,
            priority,
            requirements,
            declared,
            EndpointHandler::Http(box_handler(handler)),
        )
    }

    /// Registers a WebSocket endpoint described by `spec`.
    pub fn socket_endpoint<F, Fut>(
        &self,
        spec: EndpointSpec,
        handler: F,
    ) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(SocketExchange, Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SocketExchange> + Send + 'static,
    {
        let (pattern, family, priority, requirements, declared) = spec.into_parts();
        if family != SchemeFamily::Ws {
            return Err(EmbernetError::new(
                EmbernetErrorKind::InvalidInput,
                "http endpoints take an http handler; use Server::endpoint",
            ));
        }
        self.register_mapping(
            pattern,
            family,
            priority,
            requirements,
            declared,
            EndpointHandler::Socket(box_socket_handler(handler)),
        )
    }

    /// Registers a `GET` endpoint.
    ///
    /// ## Example
    ///
    /// ```
    /// use embernet::app::Server;
    ///
    /// let server = Server::new();
    /// server
    ///     .get("/hello", |ex| async move { ex.respond(|res| res.ok().text("hi")) })
    ///     .unwrap();
    /// ```
    pub fn get<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        self.endpoint(EndpointSpec::get(pattern), handler)
    }

    /// Registers a `POST` endpoint.
    pub fn post<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        self.endpoint(EndpointSpec::post(pattern), handler)
    }

    /// Registers a `PUT` endpoint.
    pub fn put<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        self.endpoint(EndpointSpec::put(pattern), handler)
    }

    /// Registers a `DELETE` endpoint.
    pub fn delete<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        self.endpoint(EndpointSpec::delete(pattern), handler)
    }

    /// Registers a `PATCH` endpoint.
    pub fn patch<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Exchange> + Send + 'static,
    {
        self.endpoint(EndpointSpec::patch(pattern), handler)
    }

    /// Registers a WebSocket endpoint with no frame restriction.
    pub fn socket<F, Fut>(&self, pattern: &str, handler: F) -> Result<EndpointId, EmbernetError>
    where
        F: Fn(SocketExchange, Frame) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SocketExchange> + Send + 'static,
    {
        self.socket_endpoint(EndpointSpec::socket(pattern), handler)
    }

    /// Removes every mapping registered under `id`.
    pub fn unregister(&self, id: EndpointId) {
        self.registry.unregister(id);
    }

    /// Appends a global middleware. Globals run unconditionally before
    /// every mapping-local chain of the families they apply to.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.globals.register(middleware);
    }

    /// Installs the built-in request logger as a global middleware.
    ///
    /// ## Example
    ///
    /// ```
    /// use embernet::app::Server;
    ///
    /// let server = Server::new();
    /// server.use_logger(None);
    /// ```
    pub fn use_logger(&self, config: Option<LoggerConfig>) {
        self.use_middleware(Arc::new(RequestLogger::new(config)));
    }

    /// Registers a custom requirement descriptor. The catalogue is
    /// append-only; a name collision fails with `DuplicateRequirement`.
    pub fn register_requirement(
        &mut self,
        descriptor: Arc<dyn RequirementDescriptor>,
    ) -> Result<(), EmbernetError> {
        self.catalogue.register(descriptor)
    }

    /// The body parser registry consumed during dispatch.
    pub fn body_parsers(&self) -> &BodyParserRegistry {
        &self.parsers
    }

    /// The session manager owning identity, cache and lifecycle.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// The route registry.
    pub fn registry(&self) -> &Arc<RouteRegistry> {
        &self.registry
    }

    /// Replaces the server-wide CORS policy.
    pub fn set_cors(&mut self, policy: CorsPolicy) {
        self.cors = policy;
    }

    fn register_mapping(
        &self,
        pattern: String,
        family: SchemeFamily,
        priority: Priority,
        requirements: Vec<(String, RequirementInfo)>,
        declared: Vec<Arc<dyn Middleware>>,
        handler: EndpointHandler,
    ) -> Result<EndpointId, EmbernetError> {
        for (name, _) in &requirements {
            if self.catalogue.lookup(name).is_none() {
                return Err(EmbernetError::new(
                    EmbernetErrorKind::InvalidInput,
                    format!("unknown requirement '{}'", name),
                ));
            }
        }
        let pattern = PathPattern::compile(&pattern)?;
        let resolved = middlewares::resolve_chain(&declared, family, &self.globals);
        self.registry
            .register(family, pattern, priority, requirements, resolved, handler)
    }

    pub(crate) fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::new(Dispatcher {
            registry: Arc::clone(&self.registry),
            catalogue: Arc::new(self.catalogue.clone()),
            globals: Arc::clone(&self.globals),
            sessions: Arc::clone(&self.sessions),
            parsers: Arc::clone(&self.parsers),
            cors: self.cors.clone(),
            max_body_bytes: self.max_body_bytes,
            shutdown: self.shutdown.clone(),
        })
    }

    /// Starts the accept loop on `127.0.0.1:<port>` and serves until the
    /// process receives ctrl-c.
    ///
    /// Every request on a connection shares that connection's cancellation
    /// signal: it is raised when the transport dies under an in-flight
    /// exchange and when the server shuts down, at which point the
    /// connection is drained gracefully instead of running unbounded.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// use embernet::app::Server;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let server = Server::new();
    ///     server.listen(3000, || println!("server running on port 3000")).await;
    /// }
    /// ```
    pub async fn listen<F: FnOnce()>(&self, port: u16, cb: F) {
        let dispatcher = self.dispatcher();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, %addr, "failed to bind listener");
                return;
            }
        };

        cb();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    self.shutdown.cancel();
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::debug!(error = %err, "accept failed");
                            continue;
                        }
                    };
                    let dispatcher = Arc::clone(&dispatcher);
                    let shutdown = self.shutdown.clone();
                    tokio::spawn(async move {
                        Self::serve_connection(dispatcher, shutdown, stream, peer).await;
                    });
                }
            }
        }
    }

    /// Drives one accepted connection, wiring the per-connection
    /// cancellation signal to the transport's fate.
    async fn serve_connection(
        dispatcher: Arc<Dispatcher>,
        shutdown: CancelSignal,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) {
        let io = TokioIo::new(stream);
        let ip = peer.ip().to_string();
        let cancel = CancelSignal::new();
        let service_cancel = cancel.clone();
        let service = service_fn(move |request| {
            let dispatcher = Arc::clone(&dispatcher);
            let ip = ip.clone();
            let cancel = service_cancel.clone();
            async move { Ok::<_, Infallible>(dispatcher.handle(request, ip, cancel).await) }
        });

        let conn = hyper::server::conn::http1::Builder::new()
            .serve_connection(io, service)
            .with_upgrades();
        let mut conn = std::pin::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    // The transport died under the exchange; anything still
                    // holding this connection's signal observes it.
                    cancel.cancel();
                    tracing::debug!(error = %err, "connection closed with error");
                }
            }
            _ = shutdown.cancelled() => {
                cancel.cancel();
                conn.as_mut().graceful_shutdown();
                if let Err(err) = conn.as_mut().await {
                    tracing::debug!(error = %err, "connection closed during shutdown");
                }
            }
        }
    }
}

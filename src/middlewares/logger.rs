use crate::{
    exchange::Exchange,
    middlewares::{CallbackInfo, Middleware},
};
use async_trait::async_trait;

/// Configuration for the request logger middleware.
///
/// ## Fields
///
/// * `method` - whether to log the method
/// * `path` - whether to log the path
/// * `ip` - whether to log the client address
#[derive(Clone)]
pub struct LoggerConfig {
    /// Whether to log the method.
    pub method: bool,

    /// Whether to log the path.
    pub path: bool,

    /// Whether to log the client address.
    pub ip: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            method: true,
            path: true,
            ip: false,
        }
    }
}

/// Built-in request logger, usually installed as a global middleware.
///
/// Emits one `tracing` info event per dispatched exchange.
///
/// ## Example
///
/// ```
/// use embernet::{app::Server, middlewares::logger::RequestLogger};
/// use std::sync::Arc;
///
/// let server = Server::new();
/// server.use_middleware(Arc::new(RequestLogger::new(None)));
/// ```
pub struct RequestLogger {
    config: LoggerConfig,
}

impl RequestLogger {
    /// Creates the logger with the given configuration, or defaults.
    pub fn new(config: Option<LoggerConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    fn name(&self) -> &str {
        "request-logger"
    }

    async fn handle(&self, _callback: &mut CallbackInfo, exchange: &mut Exchange) {
        let request = exchange.request();
        match (self.config.method, self.config.path, self.config.ip) {
            (true, true, true) => {
                tracing::info!(method = %request.method, path = %request.path, ip = %request.ip, "request")
            }
            (true, true, false) => {
                tracing::info!(method = %request.method, path = %request.path, "request")
            }
            (true, false, _) => tracing::info!(method = %request.method, "request"),
            (false, true, _) => tracing::info!(path = %request.path, "request"),
            _ => {}
        }
    }
}

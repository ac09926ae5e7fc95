#![warn(missing_docs)]

//! # embernet
//!
//! Embernet is an embeddable HTTP + WebSocket application server for use as
//! a library inside a long-running host process. It dispatches requests and
//! frames to registered endpoint handlers through a ranked route registry,
//! enforces per-endpoint declarative requirements, runs an ordered
//! cancellable middleware chain around every handler, maintains per-client
//! sessions behind a pluggable storage driver, and applies a deterministic
//! CORS policy to every HTTP exchange.
//!
//! ## Modules
//!
//! - [`app`] - The server struct, its configuration and the accept loop.
//! - [`router`] - The route registry and compiled path patterns.
//! - [`requirement`] - The requirement catalogue and its built-in predicates.
//! - [`middlewares`] - The middleware engine and built-in middlewares.
//! - [`exchange`] - The per-request context handed to handlers.
//! - [`req`] / [`res`] - The request and response views.
//! - [`session`] - Sessions, drivers, storage queue and the manager.
//! - [`cors`] - The CORS policy value object.
//! - [`websocket`] - Frames and the per-connection socket context.
//! - [`body`] - The body-parser registry lookup contract.
//! - [`types`] - Core enums and handler type aliases.

/// The server struct and its methods for configuring and running the
/// application.
///
/// See [`app::Server`] for details.
pub mod app;

/// The body-parser registry lookup contract consumed during dispatch.
pub mod body;

/// The CORS policy value object and its per-exchange header writer.
pub mod cors;

/// The per-request dispatch funnel.
mod dispatch;

/// Error types for the embernet crate.
///
/// Provides the [`error::EmbernetError`] struct and the
/// [`error::EmbernetErrorKind`] enum classifying registration-time,
/// exchange-time and session errors.
pub mod error;

/// The per-request context binding the request view, response view, session
/// and attributes.
pub mod exchange;

/// Utility functions shared across the crate.
mod helpers;

/// The middleware engine: the [`middlewares::Middleware`] trait, the shared
/// cancellable [`middlewares::CallbackInfo`] and built-in middlewares.
pub mod middlewares;

/// The HTTP request view and utilities for extracting data from requests.
///
/// See [`req::HttpRequest`] for details.
pub mod req;

/// The requirement catalogue: named predicates filtering candidate mappings
/// during dispatch.
pub mod requirement;

/// The HTTP response view and its methods for building responses.
///
/// See [`res::HttpResponse`] for details.
pub mod res;

/// The route registry and compiled route patterns.
pub mod router;

/// Sessions: the session object, pluggable drivers, the serialized storage
/// queue and the cookie-bound manager.
pub mod session;

/// Core types, enums and handler aliases used throughout the crate.
pub mod types;

/// WebSocket frames and the per-connection socket context.
pub mod websocket;

/// Common context types for handler functions.
///
/// Re-exports [`req::HttpRequest`], [`res::HttpResponse`] and
/// [`exchange::Exchange`] for convenience.
pub mod context {
    pub use super::exchange::Exchange;
    pub use super::req::HttpRequest;
    pub use super::res::HttpResponse;
}

/// Internal test module for framework testing.
#[cfg(test)]
mod tests;

use crate::{
    cors::CorsPolicy,
    error::EmbernetError,
    types::{ResponseContentBody, ResponseContentType},
};
use bytes::Bytes;
use http_body_util::Full;

/// Contains the response headers struct and its methods.
pub mod response_headers;

/// Contains the response status enum and its methods.
pub mod response_status;

/// Contains the response cookie types and their serialization.
pub mod response_cookie;

use response_cookie::{CookieOptions, ResponseCookie};
use response_headers::ResponseHeaders;
use response_status::StatusCode;

/// Lifecycle of one HTTP exchange, as seen from the response side.
///
/// Transitions are one-way: `Open → HeadersSent → BodyFlushing → Closed`.
/// Once headers are sent, status/header/cookie mutation fails with a
/// `HeadersAlreadySent` error and leaves the response untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Headers not yet flushed; the response is freely mutable.
    Open,
    /// Status line and headers are on the wire.
    HeadersSent,
    /// The body is streaming out.
    BodyFlushing,
    /// The exchange is finished and the connection returned to the
    /// transport pool.
    Closed,
}

/// Represents an HTTP response being sent to the client.
///
/// The response view buffers the status code, headers, cookies and body
/// until the dispatcher flushes them, and enforces the exchange state
/// machine on every mutation.
///
/// # Examples
///
/// Basic usage:
/// ```rust
/// use embernet::context::HttpResponse;
///
/// let res = HttpResponse::new();
/// res.ok().text("Hello, World!");
/// ```
///
/// JSON response:
/// ```rust
/// use embernet::context::HttpResponse;
/// use serde_json::json;
///
/// let res = HttpResponse::new();
/// res.ok().json(json!({
///     "message": "Success",
///     "code": 200
/// }));
/// ```
#[derive(Debug, Clone)]
pub struct HttpResponse {
    // Response body content
    pub(crate) body: ResponseContentBody,

    // Content type of the response
    pub(crate) content_type: ResponseContentType,

    // Status code specified by the handler or middleware
    pub(crate) status_code: StatusCode,

    /// Response headers.
    pub headers: ResponseHeaders,

    // Scheduled Set-Cookie entries
    pub(crate) cookies: Vec<ResponseCookie>,

    // Cookies to be removed with deletion markers
    pub(crate) remove_cookies: Vec<(String, CookieOptions)>,

    // Exchange lifecycle, one-way
    pub(crate) state: ExchangeState,

    // CORS policy owned by this response, applied at header-send time
    pub(crate) cors: CorsPolicy,

    // Whether any user code touched status, body, headers or cookies
    pub(crate) written: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpResponse {
    /// Creates a fresh `200` response with an empty body in the `Open`
    /// state.
    pub fn new() -> Self {
        HttpResponse {
            body: ResponseContentBody::EMPTY,
            content_type: ResponseContentType::TEXT,
            status_code: StatusCode::Ok,
            headers: ResponseHeaders::new(),
            cookies: Vec::new(),
            remove_cookies: Vec::new(),
            state: ExchangeState::Open,
            cors: CorsPolicy::default(),
            written: false,
        }
    }

    // Consuming builders, the surface handlers normally use. They only
    // apply while the exchange is `Open`; afterwards they warn and leave
    // the response unchanged (the checked `try_*` mutators below surface
    // the error instead).

    /// Sets the status code.
    pub fn status(mut self, code: u16) -> Self {
        self.write_status(StatusCode::from_u16(code));
        self
    }

    /// Sets status `200 OK`.
    pub fn ok(mut self) -> Self {
        self.write_status(StatusCode::Ok);
        self
    }

    /// Sets status `201 Created`.
    pub fn created(mut self) -> Self {
        self.write_status(StatusCode::Created);
        self
    }

    /// Sets status `204 No Content`.
    pub fn no_content(mut self) -> Self {
        self.write_status(StatusCode::NoContent);
        self
    }

    /// Sets status `400 Bad Request`.
    pub fn bad_request(mut self) -> Self {
        self.write_status(StatusCode::BadRequest);
        self
    }

    /// Sets status `401 Unauthorized`.
    pub fn unauthorized(mut self) -> Self {
        self.write_status(StatusCode::Unauthorized);
        self
    }

    /// Sets status `403 Forbidden`.
    pub fn forbidden(mut self) -> Self {
        self.write_status(StatusCode::Forbidden);
        self
    }

    /// Sets status `404 Not Found`.
    pub fn not_found(mut self) -> Self {
        self.write_status(StatusCode::NotFound);
        self
    }

    /// Sets status `405 Method Not Allowed`.
    pub fn method_not_allowed(mut self) -> Self {
        self.write_status(StatusCode::MethodNotAllowed);
        self
    }

    /// Sets status `500 Internal Server Error`.
    pub fn internal_server_error(mut self) -> Self {
        self.write_status(StatusCode::InternalServerError);
        self
    }

    /// Sets a `302` redirect to `location`.
    pub fn redirect<T: AsRef<str>>(mut self, location: T) -> Self {
        self.write_status(StatusCode::Redirect);
        if self.guard_open("redirect") {
            self.headers.insert("Location", location.as_ref());
        }
        self
    }

    /// Sets a `301` redirect to `location`.
    pub fn permanent_redirect<T: AsRef<str>>(mut self, location: T) -> Self {
        self.write_status(StatusCode::PermanentRedirect);
        if self.guard_open("redirect") {
            self.headers.insert("Location", location.as_ref());
        }
        self
    }

    /// Sets a plain-text body.
    pub fn text<T: Into<String>>(mut self, text: T) -> Self {
        self.write_body(
            ResponseContentBody::new_text(text),
            ResponseContentType::TEXT,
        );
        self
    }

    /// Sets an HTML body.
    pub fn html<T: Into<String>>(mut self, html: T) -> Self {
        self.write_body(
            ResponseContentBody::new_html(html),
            ResponseContentType::HTML,
        );
        self
    }

    /// Sets a JSON body from any serializable value.
    pub fn json<T: serde::Serialize>(mut self, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => {
                self.write_body(ResponseContentBody::JSON(json), ResponseContentType::JSON);
            }
            Err(err) => {
                tracing::warn!("response json serialization failed: {}", err);
                self.write_status(StatusCode::InternalServerError);
            }
        }
        self
    }

    /// Sets a raw binary body.
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.write_body(
            ResponseContentBody::BINARY(bytes),
            ResponseContentType::BINARY,
        );
        self
    }

    /// Sets a header, replacing previous values of the same name.
    pub fn set_header<K: AsRef<str>, V: AsRef<str>>(mut self, key: K, value: V) -> Self {
        if self.guard_open("set_header") {
            self.headers.insert(key, value);
            self.written = true;
        }
        self
    }

    /// Schedules a cookie with the given attributes (defaults when `None`).
    pub fn set_cookie<N, V>(mut self, name: N, value: V, options: Option<CookieOptions>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        if self.guard_open("set_cookie") {
            self.push_cookie(name.into(), value.into(), options.unwrap_or_default());
        }
        self
    }

    /// Schedules a deletion marker for the named cookie.
    pub fn clear_cookie<N: Into<String>>(mut self, name: N) -> Self {
        if self.guard_open("clear_cookie") {
            self.remove_cookies.push((name.into(), CookieOptions::default()));
            self.written = true;
        }
        self
    }

    // Checked mutators. These are what the engine, the session manager and
    // the CORS writer use; they surface `HeadersAlreadySent` instead of
    // warning.

    /// Sets the status code, failing once headers are sent.
    pub fn try_set_status(&mut self, code: StatusCode) -> Result<(), EmbernetError> {
        self.ensure_open("set_status")?;
        self.status_code = code;
        self.written = true;
        Ok(())
    }

    /// Inserts a header, failing once headers are sent.
    pub fn try_insert_header(&mut self, key: &str, value: &str) -> Result<(), EmbernetError> {
        self.ensure_open("insert_header")?;
        self.headers.insert(key, value);
        self.written = true;
        Ok(())
    }

    /// Schedules a cookie, failing once headers are sent.
    pub fn try_set_cookie(
        &mut self,
        name: &str,
        value: &str,
        options: CookieOptions,
    ) -> Result<(), EmbernetError> {
        self.ensure_open("set_cookie")?;
        self.push_cookie(name.to_string(), value.to_string(), options);
        Ok(())
    }

    /// Schedules a deletion marker, failing once headers are sent.
    pub fn try_remove_cookie(
        &mut self,
        name: &str,
        template: CookieOptions,
    ) -> Result<(), EmbernetError> {
        self.ensure_open("remove_cookie")?;
        self.remove_cookies.push((name.to_string(), template));
        self.written = true;
        Ok(())
    }

    // State machine.

    /// The current exchange state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// True once the status line and headers are on the wire.
    pub fn headers_sent(&self) -> bool {
        self.state != ExchangeState::Open
    }

    /// The current status code.
    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    /// The CORS policy owned by this response.
    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    /// Mutable access to the CORS policy, for middleware that adjusts it
    /// per-request.
    pub fn cors_mut(&mut self) -> &mut CorsPolicy {
        &mut self.cors
    }

    /// Marks the headers as flushed. One-way; fails when called twice.
    pub(crate) fn mark_headers_sent(&mut self) -> Result<(), EmbernetError> {
        self.ensure_open("send_headers")?;
        self.state = ExchangeState::HeadersSent;
        Ok(())
    }

    pub(crate) fn mark_body_flushing(&mut self) {
        if self.state == ExchangeState::HeadersSent {
            self.state = ExchangeState::BodyFlushing;
        }
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = ExchangeState::Closed;
    }

    /// Whether any user code wrote status, body, headers or cookies. The
    /// engine consults this before substituting default bodies.
    pub(crate) fn is_written(&self) -> bool {
        self.written
    }

    fn ensure_open(&self, op: &str) -> Result<(), EmbernetError> {
        if self.state == ExchangeState::Open {
            Ok(())
        } else {
            Err(EmbernetError::headers_already_sent(op))
        }
    }

    fn guard_open(&self, op: &str) -> bool {
        if self.state == ExchangeState::Open {
            true
        } else {
            tracing::warn!("{} ignored: response headers already sent", op);
            false
        }
    }

    fn write_status(&mut self, code: StatusCode) {
        if self.guard_open("set_status") {
            self.status_code = code;
            self.written = true;
        }
    }

    fn write_body(&mut self, body: ResponseContentBody, content_type: ResponseContentType) {
        if self.guard_open("write_body") {
            self.body = body;
            self.content_type = content_type;
            self.written = true;
        }
    }

    fn push_cookie(&mut self, name: String, value: String, options: CookieOptions) {
        // One scheduled cookie per name; a later write wins.
        self.cookies.retain(|cookie| cookie.name != name);
        self.cookies.push(ResponseCookie {
            name,
            value,
            options,
        });
        self.written = true;
    }

    /// Serializes the buffered response for the transport. Consumes the
    /// view; the state machine has already passed `HeadersSent` by the time
    /// this runs.
    pub(crate) fn into_hyper_response(self) -> hyper::Response<Full<Bytes>> {
        let mut builder = hyper::Response::builder().status(self.status_code.as_u16());

        if let Some(headers) = builder.headers_mut() {
            for (name, value) in self.headers.as_header_map().iter() {
                headers.append(name.clone(), value.clone());
            }
            if !self.body.is_empty() && !headers.contains_key(hyper::header::CONTENT_TYPE) {
                if let Ok(value) = hyper::header::HeaderValue::from_str(self.content_type.mime()) {
                    headers.insert(hyper::header::CONTENT_TYPE, value);
                }
            }
            for cookie in &self.cookies {
                if let Ok(value) = hyper::header::HeaderValue::from_str(&cookie.to_header_value()) {
                    headers.append(hyper::header::SET_COOKIE, value);
                }
            }
            for (name, template) in &self.remove_cookies {
                let marker = ResponseCookie::removal(name, template);
                if let Ok(value) = hyper::header::HeaderValue::from_str(&marker.to_header_value()) {
                    headers.append(hyper::header::SET_COOKIE, value);
                }
            }
        }

        let bytes = Bytes::from(self.body.into_bytes());
        builder
            .body(Full::new(bytes))
            .unwrap_or_else(|_| hyper::Response::new(Full::new(Bytes::new())))
    }
}

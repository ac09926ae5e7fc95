use crate::{
    error::{EmbernetError, EmbernetErrorKind},
    helpers,
    types::{HttpMethods, RequestBodyType, Scheme},
};
use ahash::AHashMap;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::str::FromStr;

/// The request body snapshot taken at bind time.
///
/// The snapshot is immutable; its classification is derived from the
/// Content-Type header, never from sniffing the bytes.
#[derive(Debug, Clone)]
pub struct RequestBody {
    content: Bytes,
    body_type: RequestBodyType,
}

impl RequestBody {
    pub(crate) fn new(content: Bytes, content_type: Option<&str>) -> Self {
        let body_type = if content.is_empty() {
            RequestBodyType::EMPTY
        } else {
            match content_type.and_then(|raw| raw.parse::<mime::Mime>().ok()) {
                Some(m) if m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON) => {
                    RequestBodyType::JSON
                }
                Some(m) if m == mime::APPLICATION_WWW_FORM_URLENCODED => RequestBodyType::FORM,
                Some(m) if m.type_() == mime::TEXT => RequestBodyType::TEXT,
                Some(_) => RequestBodyType::BINARY,
                None => RequestBodyType::TEXT,
            }
        };
        Self { content, body_type }
    }

    pub(crate) fn empty() -> Self {
        Self {
            content: Bytes::new(),
            body_type: RequestBodyType::EMPTY,
        }
    }

    /// The raw snapshot bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.content
    }

    /// The derived classification.
    pub fn body_type(&self) -> RequestBodyType {
        self.body_type
    }
}

/// The immutable per-request view: method, path, headers, cookies, query
/// parameters, bound route captures and the body snapshot.
///
/// ## Examples
///
/// ```
/// use embernet::context::HttpRequest;
///
/// let req = HttpRequest::new();
/// println!("method: {}", req.method);
/// println!("path: {}", req.path);
/// ```
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// The HTTP method used for the request.
    pub method: HttpMethods,

    /// The requested endpoint path, without the query string.
    pub path: String,

    /// The scheme the exchange arrived on.
    pub scheme: Scheme,

    /// The IP address of the client making the request.
    pub ip: String,

    /// Route captures bound by placeholder name during dispatch.
    params: AHashMap<String, String>,

    /// Query parameters from the request URL.
    query_params: AHashMap<String, String>,

    /// The request's headers, keyed lowercase, multiple values joined.
    headers: AHashMap<String, String>,

    /// The request's cookies.
    cookies: AHashMap<String, String>,

    /// The body snapshot.
    body: RequestBody,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    /// Creates an empty GET request view. Useful as a starting point in
    /// tests and demos; real views are produced by the exchange binder.
    pub fn new() -> Self {
        HttpRequest {
            method: HttpMethods::GET,
            path: String::from("/"),
            scheme: Scheme::Http,
            ip: String::new(),
            params: AHashMap::new(),
            query_params: AHashMap::new(),
            headers: AHashMap::new(),
            cookies: AHashMap::new(),
            body: RequestBody::empty(),
        }
    }

    /// Binds a view from the transport's request parts and the collected
    /// body snapshot.
    pub(crate) fn from_parts(
        parts: &hyper::http::request::Parts,
        body: Bytes,
        scheme: Scheme,
        ip: String,
    ) -> Result<Self, EmbernetError> {
        let method = HttpMethods::parse(parts.method.as_str()).ok_or_else(|| {
            EmbernetError::new(
                EmbernetErrorKind::InvalidInput,
                format!("unsupported method '{}'", parts.method),
            )
        })?;

        let mut headers: AHashMap<String, String> = AHashMap::new();
        for (name, value) in parts.headers.iter() {
            let Ok(value) = value.to_str() else { continue };
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        let cookies = headers
            .get("cookie")
            .map(|raw| helpers::parse_cookie_header(raw))
            .unwrap_or_default();

        let query_params = parts
            .uri
            .query()
            .map(helpers::parse_query_string)
            .unwrap_or_default();

        let content_type = headers.get("content-type").map(String::as_str);
        let body = RequestBody::new(body, content_type);

        Ok(HttpRequest {
            method,
            path: parts.uri.path().to_string(),
            scheme,
            ip,
            params: AHashMap::new(),
            query_params,
            headers,
            cookies,
            body,
        })
    }

    /// Returns a header value by name (case-insensitive).
    ///
    /// ## Example
    ///
    /// ```
    /// let req = embernet::context::HttpRequest::new();
    /// assert!(req.get_header("x-auth").is_err());
    /// ```
    pub fn get_header(&self, header_name: &str) -> Result<&str, EmbernetError> {
        let header_name = header_name.to_lowercase();
        match self.headers.get(&header_name) {
            Some(value) => Ok(value),
            None => Err(EmbernetError::new(
                EmbernetErrorKind::NotFound,
                format!("header '{}' doesn't exist", header_name),
            )),
        }
    }

    /// Returns a cookie value by name.
    pub fn get_cookie(&self, cookie_name: &str) -> Result<&str, EmbernetError> {
        match self.cookies.get(cookie_name) {
            Some(value) => Ok(value),
            None => Err(EmbernetError::new(
                EmbernetErrorKind::NotFound,
                format!("cookie '{}' doesn't exist", cookie_name),
            )),
        }
    }

    /// Returns a query parameter value by name.
    pub fn get_query(&self, query_name: &str) -> Result<&str, EmbernetError> {
        match self.query_params.get(query_name) {
            Some(value) => Ok(value),
            None => Err(EmbernetError::new(
                EmbernetErrorKind::NotFound,
                format!("query parameter '{}' doesn't exist", query_name),
            )),
        }
    }

    /// Returns a raw route capture by placeholder name.
    pub fn get_param(&self, param_name: &str) -> Result<&str, EmbernetError> {
        match self.params.get(param_name) {
            Some(value) => Ok(value),
            None => Err(EmbernetError::new(
                EmbernetErrorKind::NotFound,
                format!("route param '{}' doesn't exist", param_name),
            )),
        }
    }

    /// Returns a route capture parsed into `T`.
    ///
    /// ## Example
    ///
    /// For a mapping registered as `/users/{id:int}` and a request to
    /// `/users/42`:
    ///
    /// ```no_run
    /// # let req = embernet::context::HttpRequest::new();
    /// let id: i64 = req.param("id").unwrap();
    /// ```
    pub fn param<T: FromStr>(&self, param_name: &str) -> Result<T, EmbernetError> {
        let raw = self.get_param(param_name)?;
        raw.parse::<T>().map_err(|_| {
            EmbernetError::new(
                EmbernetErrorKind::InvalidInput,
                format!(
                    "failed to parse route param '{}' from '{}'",
                    param_name, raw
                ),
            )
        })
    }

    /// The Content-Type of the request as `type/subtype`, lowercased and
    /// stripped of parameters.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get("content-type")
            .and_then(|raw| raw.parse::<mime::Mime>().ok())
            .map(|m| m.essence_str().to_ascii_lowercase())
    }

    /// The Host header value, if the client sent one.
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host").map(String::as_str)
    }

    /// The derived body classification.
    pub fn body_type(&self) -> RequestBodyType {
        self.body.body_type()
    }

    /// The raw body snapshot.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Deserializes a JSON body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, EmbernetError> {
        serde_json::from_slice(self.body.bytes()).map_err(EmbernetError::from)
    }

    /// Returns the body as UTF-8 text.
    pub fn text(&self) -> Result<String, EmbernetError> {
        String::from_utf8(self.body.bytes().to_vec()).map_err(EmbernetError::from)
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    pub fn form_data(&self) -> Result<AHashMap<String, String>, EmbernetError> {
        let text = self.text()?;
        Ok(helpers::parse_query_string(&text))
    }

    /// True when the request was made with `X-Requested-With:
    /// XMLHttpRequest`.
    pub fn xhr(&self) -> bool {
        self.get_header("x-requested-with")
            .map(|v| v.eq_ignore_ascii_case("xmlhttprequest"))
            .unwrap_or(false)
    }

    /// True for the TLS member of either scheme family.
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme, Scheme::Https | Scheme::Wss)
    }

    /// Iterates all headers as (lowercase name, joined value) pairs.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates all cookies.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cookies.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates all bound route captures.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn set_param(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn set_header(&mut self, key: &str, value: &str) {
        self.headers
            .insert(key.to_ascii_lowercase(), value.to_string());
    }

    pub(crate) fn set_cookie(&mut self, key: &str, value: &str) {
        self.cookies.insert(key.to_string(), value.to_string());
    }

    pub(crate) fn set_method(&mut self, method: HttpMethods) {
        self.method = method;
    }
}

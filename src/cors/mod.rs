use crate::{error::EmbernetError, req::HttpRequest, res::HttpResponse, types::HttpMethods};

/// Declarative cross-origin policy, materialized into response headers once
/// per exchange.
///
/// The default instance denies everything; embedders widen it through the
/// public fields or the builder-style methods and install it on the server
/// config. Each response view owns its copy, so per-request middleware may
/// adjust it without affecting other exchanges.
///
/// ## Example
///
/// ```
/// use embernet::cors::CorsPolicy;
///
/// let mut policy = CorsPolicy::default();
/// policy.allowed_origins = vec!["https://app.example".into()];
/// policy.allowed_methods = vec!["GET".into(), "POST".into()];
/// policy.max_age = 600;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CorsPolicy {
    /// Emit `Access-Control-Allow-Origin: *` regardless of the request.
    pub allow_all_origins: bool,
    /// Allow the full method list of the HTTP family.
    pub allow_all_methods: bool,
    /// Echo the request's `Access-Control-Request-Headers` (or `*`).
    pub allow_all_headers: bool,
    /// Whether to emit `Access-Control-Allow-Credentials` at all.
    pub credentials_override: bool,
    /// The credentials value emitted when the override is set.
    pub allow_credentials: bool,
    /// Values for `Access-Control-Expose-Headers`; emitted iff non-empty.
    pub exposed_headers: Vec<String>,
    /// Origins allowed when `allow_all_origins` is off.
    pub allowed_origins: Vec<String>,
    /// Methods allowed when `allow_all_methods` is off.
    pub allowed_methods: Vec<String>,
    /// Headers allowed when `allow_all_headers` is off.
    pub allowed_headers: Vec<String>,
    /// Seconds for `Access-Control-Max-Age`; −1 means unset.
    pub max_age: i64,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_all_origins: false,
            allow_all_methods: false,
            allow_all_headers: false,
            credentials_override: false,
            allow_credentials: false,
            exposed_headers: Vec::new(),
            allowed_origins: Vec::new(),
            allowed_methods: Vec::new(),
            allowed_headers: Vec::new(),
            max_age: -1,
        }
    }
}

impl CorsPolicy {
    /// A policy that answers `*` for origins, the full method list and any
    /// requested headers.
    pub fn permissive() -> Self {
        Self {
            allow_all_origins: true,
            allow_all_methods: true,
            allow_all_headers: true,
            ..Self::default()
        }
    }

    /// Replaces every field of this policy, including list contents, with
    /// the other policy's values.
    pub fn update(&mut self, other: &CorsPolicy) {
        *self = other.clone();
    }

    /// Resets to the default-deny instance.
    pub fn disable(&mut self) {
        *self = CorsPolicy::default();
    }

    /// Writes the policy onto the response. Exactly one header per axis,
    /// never duplicated; calling twice with the same request yields the
    /// same headers. Fails with `HeadersAlreadySent` once the response
    /// headers are flushed.
    pub fn apply(
        &self,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> Result<(), EmbernetError> {
        // Allow-Origin
        if self.allow_all_origins {
            response.try_insert_header("Access-Control-Allow-Origin", "*")?;
        } else if !self.allowed_origins.is_empty() {
            let request_origin = request.get_header("origin").ok();
            let echoed = match request_origin {
                Some(origin) if self.origin_allowed(origin) => origin.to_string(),
                _ => self.allowed_origins[0].clone(),
            };
            response.try_insert_header("Access-Control-Allow-Origin", &echoed)?;
        }

        // Allow-Methods
        if self.allow_all_methods {
            let all = HttpMethods::all()
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            response.try_insert_header("Access-Control-Allow-Methods", &all)?;
        } else if !self.allowed_methods.is_empty() {
            response
                .try_insert_header("Access-Control-Allow-Methods", &self.allowed_methods.join(", "))?;
        }

        // Allow-Headers
        if self.allow_all_headers {
            let echoed = request
                .get_header("access-control-request-headers")
                .unwrap_or("*");
            response.try_insert_header("Access-Control-Allow-Headers", echoed)?;
        } else if !self.allowed_headers.is_empty() {
            response
                .try_insert_header("Access-Control-Allow-Headers", &self.allowed_headers.join(", "))?;
        }

        // Expose-Headers
        if !self.exposed_headers.is_empty() {
            response.try_insert_header(
                "Access-Control-Expose-Headers",
                &self.exposed_headers.join(", "),
            )?;
        }

        // Allow-Credentials
        if self.credentials_override {
            let value = if self.allow_credentials { "true" } else { "false" };
            response.try_insert_header("Access-Control-Allow-Credentials", value)?;
        }

        // Max-Age
        if self.max_age >= 0 {
            response.try_insert_header("Access-Control-Max-Age", &self.max_age.to_string())?;
        }

        Ok(())
    }

    /// Origin comparison: case-insensitive, scheme stripped from both sides.
    fn origin_allowed(&self, origin: &str) -> bool {
        let bare = strip_scheme(origin);
        self.allowed_origins
            .iter()
            .any(|allowed| strip_scheme(allowed).eq_ignore_ascii_case(bare))
    }
}

fn strip_scheme(origin: &str) -> &str {
    match origin.find("://") {
        Some(index) => &origin[index + 3..],
        None => origin,
    }
}

use std::fmt::Display;

/// Represents the status code of an HTTP response.
///
/// This enum provides a type-safe representation of HTTP status codes with
/// commonly used variants and support for custom codes, with bidirectional
/// conversion between numeric codes and variants.
///
/// # Examples
///
/// ```
/// use embernet::res::response_status::StatusCode;
///
/// let success = StatusCode::Ok;
/// let not_found = StatusCode::NotFound;
/// let custom = StatusCode::Custom(418);
///
/// println!("{}", success);    // "200 OK"
/// println!("{}", not_found);  // "404 Not Found"
/// println!("{}", custom);     // "418 Custom"
///
/// assert_eq!(StatusCode::from_u16(404), StatusCode::NotFound);
/// assert_eq!(StatusCode::Ok.as_u16(), 200);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK: the request succeeded.
    Ok,

    /// 201 Created: the request succeeded and a new resource was created.
    Created,

    /// 202 Accepted: the request has been received but not yet acted upon.
    Accepted,

    /// 204 No Content: nothing to send back, headers may still be useful.
    NoContent,

    /// 301 Moved Permanently.
    PermanentRedirect,

    /// 302 Found (temporary redirect).
    Redirect,

    /// 400 Bad Request: client error the server will not process.
    BadRequest,

    /// 401 Unauthorized: the client must authenticate itself first.
    Unauthorized,

    /// 403 Forbidden: the client's identity is known but access is denied.
    Forbidden,

    /// 404 Not Found: no resource matches the request.
    NotFound,

    /// 405 Method Not Allowed: the path exists but not under this method.
    MethodNotAllowed,

    /// 409 Conflict: the request conflicts with current server state.
    Conflict,

    /// 413 Payload Too Large.
    PayloadTooLarge,

    /// 429 Too Many Requests.
    TooManyRequests,

    /// 500 Internal Server Error: generic server-side failure.
    InternalServerError,

    /// 501 Not Implemented.
    NotImplemented,

    /// 502 Bad Gateway.
    BadGateway,

    /// 503 Service Unavailable.
    ServiceUnavailable,

    /// Any status code without a named variant.
    Custom(u16),
}

impl StatusCode {
    /// The numeric status code.
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::Accepted => 202,
            StatusCode::NoContent => 204,
            StatusCode::PermanentRedirect => 301,
            StatusCode::Redirect => 302,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::Conflict => 409,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::TooManyRequests => 429,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::BadGateway => 502,
            StatusCode::ServiceUnavailable => 503,
            StatusCode::Custom(code) => *code,
        }
    }

    /// Maps a numeric code onto a variant, falling back to `Custom`.
    pub fn from_u16(code: u16) -> StatusCode {
        match code {
            200 => StatusCode::Ok,
            201 => StatusCode::Created,
            202 => StatusCode::Accepted,
            204 => StatusCode::NoContent,
            301 => StatusCode::PermanentRedirect,
            302 => StatusCode::Redirect,
            400 => StatusCode::BadRequest,
            401 => StatusCode::Unauthorized,
            403 => StatusCode::Forbidden,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            409 => StatusCode::Conflict,
            413 => StatusCode::PayloadTooLarge,
            429 => StatusCode::TooManyRequests,
            500 => StatusCode::InternalServerError,
            501 => StatusCode::NotImplemented,
            502 => StatusCode::BadGateway,
            503 => StatusCode::ServiceUnavailable,
            other => StatusCode::Custom(other),
        }
    }

    /// The standard reason phrase, or "Custom" for unnamed codes.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::Accepted => "Accepted",
            StatusCode::NoContent => "No Content",
            StatusCode::PermanentRedirect => "Moved Permanently",
            StatusCode::Redirect => "Found",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::Conflict => "Conflict",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::TooManyRequests => "Too Many Requests",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::BadGateway => "Bad Gateway",
            StatusCode::ServiceUnavailable => "Service Unavailable",
            StatusCode::Custom(_) => "Custom",
        }
    }

    /// True for 2xx codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.as_u16())
    }

    /// True for 4xx codes.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }

    /// True for 5xx codes.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.as_u16())
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

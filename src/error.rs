use std::fmt::Display;

/// Classifies every error the crate surfaces to its embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbernetErrorKind {
    /// An endpoint registration collided with an existing mapping (same
    /// family, pattern, method set, priority and requirement set).
    DuplicateEndpoint,
    /// A requirement descriptor was registered under an already-taken name.
    DuplicateRequirement,
    /// A route template did not compile: unknown placeholder type, repeated
    /// placeholder name, or malformed segment.
    InvalidPattern,
    /// A status, header or cookie mutation arrived after the response headers
    /// were already sent.
    HeadersAlreadySent,
    /// A session driver failed to load, save, destroy or migrate a record.
    SessionIo,
    /// A registered body parser rejected the request payload.
    BodyParse,
    /// Filesystem or socket error outside the session subsystem.
    IO,
    /// Malformed input that is not a pattern or a body: bad UTF-8, bad
    /// header values, unknown requirement names at registration.
    InvalidInput,
    /// A lookup found nothing.
    NotFound,
}

impl Display for EmbernetErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbernetErrorKind::DuplicateEndpoint => write!(f, "duplicate endpoint"),
            EmbernetErrorKind::DuplicateRequirement => write!(f, "duplicate requirement"),
            EmbernetErrorKind::InvalidPattern => write!(f, "invalid pattern"),
            EmbernetErrorKind::HeadersAlreadySent => write!(f, "headers already sent"),
            EmbernetErrorKind::SessionIo => write!(f, "session io error"),
            EmbernetErrorKind::BodyParse => write!(f, "body parse error"),
            EmbernetErrorKind::IO => write!(f, "io error"),
            EmbernetErrorKind::InvalidInput => write!(f, "invalid input"),
            EmbernetErrorKind::NotFound => write!(f, "not found"),
        }
    }
}

/// The error type used across registration, dispatch and the session
/// subsystem.
///
/// Configuration-time kinds (`DuplicateEndpoint`, `DuplicateRequirement`,
/// `InvalidPattern`) propagate out of the `register*` calls and abort the
/// registration. `HeadersAlreadySent` is a programming error raised to the
/// caller of the offending mutator. The remaining kinds are surfaced where
/// the relevant subsystem documents them; none of them ever put a stack
/// trace into a client response.
#[derive(Debug, Clone)]
pub struct EmbernetError {
    /// What went wrong, coarsely.
    pub kind: EmbernetErrorKind,
    /// Human-readable detail, safe to log.
    pub message: String,
}

impl EmbernetError {
    /// Builds an error from a kind and message.
    pub fn new(kind: EmbernetErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn duplicate_endpoint(detail: impl Into<String>) -> Self {
        Self::new(EmbernetErrorKind::DuplicateEndpoint, detail)
    }

    pub(crate) fn duplicate_requirement(name: &str) -> Self {
        Self::new(
            EmbernetErrorKind::DuplicateRequirement,
            format!("requirement '{}' is already registered", name),
        )
    }

    pub(crate) fn invalid_pattern(detail: impl Into<String>) -> Self {
        Self::new(EmbernetErrorKind::InvalidPattern, detail)
    }

    pub(crate) fn headers_already_sent(op: &str) -> Self {
        Self::new(
            EmbernetErrorKind::HeadersAlreadySent,
            format!("{} after response headers were sent", op),
        )
    }

    pub(crate) fn session_io(detail: impl Into<String>) -> Self {
        Self::new(EmbernetErrorKind::SessionIo, detail)
    }
}

impl Display for EmbernetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for EmbernetError {}

impl From<std::io::Error> for EmbernetError {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: EmbernetErrorKind::IO,
            message: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for EmbernetError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self {
            kind: EmbernetErrorKind::InvalidInput,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EmbernetError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            kind: EmbernetErrorKind::BodyParse,
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for EmbernetError {
    fn from(err: regex::Error) -> Self {
        Self {
            kind: EmbernetErrorKind::InvalidPattern,
            message: err.to_string(),
        }
    }
}

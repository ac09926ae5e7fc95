use crate::{
    error::EmbernetError,
    req::HttpRequest,
    types::SchemeFamily,
    websocket::Frame,
};
use ahash::AHashMap;
use std::sync::Arc;

/// How a requirement's declared values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    /// Presence predicate: every declared value names something that must
    /// exist on the request (a header, a cookie, a query parameter).
    Flag,
    /// Value predicate: the extracted request value must be one of the
    /// declared values.
    Storing,
}

/// The values an endpoint declared for one requirement, extracted at
/// registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementInfo {
    kind: RequirementKind,
    values: Vec<String>,
}

impl RequirementInfo {
    /// Builds an info record from a kind and its declared values.
    pub fn new(kind: RequirementKind, values: Vec<String>) -> Self {
        Self { kind, values }
    }

    /// The declared values, in declaration order.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The kind the owning descriptor declared.
    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    /// Merges another info record declared under the same name: values are
    /// concatenated preserving order, duplicates dropped.
    pub fn merge(&mut self, other: &RequirementInfo) {
        for value in &other.values {
            if !self.values.contains(value) {
                self.values.push(value.clone());
            }
        }
    }
}

/// The request-side fields a requirement predicate may inspect.
///
/// For HTTP dispatch `frame` is `None`; on the WebSocket path each inbound
/// frame is re-evaluated with `frame` set.
pub struct ValueSource<'a> {
    /// The bound, immutable request view.
    pub request: &'a HttpRequest,
    /// The inbound frame, on the WebSocket message path.
    pub frame: Option<&'a Frame>,
}

/// A named predicate evaluated against every candidate mapping during
/// dispatch.
///
/// A descriptor is vacuously satisfied by mappings that do not declare it;
/// the dispatcher only calls [`applies`](RequirementDescriptor::applies) for
/// mappings that do.
pub trait RequirementDescriptor: Send + Sync {
    /// The unique catalogue name, e.g. `"content-type"`.
    fn name(&self) -> &'static str;

    /// How declared values are interpreted.
    fn kind(&self) -> RequirementKind;

    /// Whether this descriptor participates in dispatch for `family`.
    fn applies_to(&self, family: SchemeFamily) -> bool;

    /// Evaluates the predicate for one mapping's declared values.
    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool;
}

/// Append-only store of requirement descriptors: name → (extractor,
/// comparator). Stateless after initialization.
#[derive(Clone)]
pub struct RequirementCatalogue {
    entries: Vec<Arc<dyn RequirementDescriptor>>,
    by_name: AHashMap<&'static str, usize>,
}

impl Default for RequirementCatalogue {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl RequirementCatalogue {
    /// An empty catalogue. Most embedders want
    /// [`with_builtins`](RequirementCatalogue::with_builtins) instead.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: AHashMap::new(),
        }
    }

    /// A catalogue preloaded with the built-in descriptors, in their fixed
    /// evaluation order: `method`, `content-type`, `headers-present`,
    /// `cookie-present`, `query-parameter-present`, `body-type`, `domain`,
    /// `websocket-opcode`.
    pub fn with_builtins() -> Self {
        let mut catalogue = Self::new();
        let builtins: Vec<Arc<dyn RequirementDescriptor>> = vec![
            Arc::new(MethodRequirement),
            Arc::new(ContentTypeRequirement),
            Arc::new(HeadersPresentRequirement),
            Arc::new(CookiePresentRequirement),
            Arc::new(QueryParameterPresentRequirement),
            Arc::new(BodyTypeRequirement),
            Arc::new(DomainRequirement),
            Arc::new(SocketOpcodeRequirement),
        ];
        for descriptor in builtins {
            catalogue
                .register(descriptor)
                .expect("built-in requirement names are distinct");
        }
        catalogue
    }

    /// Registers a descriptor. The catalogue is append-only; registering a
    /// name twice fails with `DuplicateRequirement`, whether or not the
    /// implementation differs.
    pub fn register(
        &mut self,
        descriptor: Arc<dyn RequirementDescriptor>,
    ) -> Result<(), EmbernetError> {
        let name = descriptor.name();
        if self.by_name.contains_key(name) {
            return Err(EmbernetError::duplicate_requirement(name));
        }
        self.entries.push(descriptor);
        self.by_name.insert(name, self.entries.len() - 1);
        Ok(())
    }

    /// Looks a descriptor up by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RequirementDescriptor>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.entries[index]))
    }

    /// The descriptors participating in dispatch for `family`, in
    /// registration order.
    pub fn applicable(&self, family: SchemeFamily) -> Vec<Arc<dyn RequirementDescriptor>> {
        self.entries
            .iter()
            .filter(|descriptor| descriptor.applies_to(family))
            .map(Arc::clone)
            .collect()
    }
}

// Built-in descriptors.

struct MethodRequirement;

impl RequirementDescriptor for MethodRequirement {
    fn name(&self) -> &'static str {
        "method"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Storing
    }

    fn applies_to(&self, family: SchemeFamily) -> bool {
        family == SchemeFamily::Http
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        let method = source.request.method.to_string();
        info.values().iter().any(|value| value == &method)
    }
}

struct ContentTypeRequirement;

impl RequirementDescriptor for ContentTypeRequirement {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Storing
    }

    fn applies_to(&self, family: SchemeFamily) -> bool {
        family == SchemeFamily::Http
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        let Some(essence) = source.request.content_type() else {
            return false;
        };
        info.values()
            .iter()
            .any(|value| value.eq_ignore_ascii_case(&essence))
    }
}

struct HeadersPresentRequirement;

impl RequirementDescriptor for HeadersPresentRequirement {
    fn name(&self) -> &'static str {
        "headers-present"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Flag
    }

    fn applies_to(&self, _family: SchemeFamily) -> bool {
        true
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        info.values()
            .iter()
            .all(|name| source.request.get_header(name).is_ok())
    }
}

struct CookiePresentRequirement;

impl RequirementDescriptor for CookiePresentRequirement {
    fn name(&self) -> &'static str {
        "cookie-present"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Flag
    }

    fn applies_to(&self, _family: SchemeFamily) -> bool {
        true
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        info.values()
            .iter()
            .all(|name| source.request.get_cookie(name).is_ok())
    }
}

struct QueryParameterPresentRequirement;

impl RequirementDescriptor for QueryParameterPresentRequirement {
    fn name(&self) -> &'static str {
        "query-parameter-present"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Flag
    }

    fn applies_to(&self, _family: SchemeFamily) -> bool {
        true
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        info.values()
            .iter()
            .all(|name| source.request.get_query(name).is_ok())
    }
}

struct BodyTypeRequirement;

impl RequirementDescriptor for BodyTypeRequirement {
    fn name(&self) -> &'static str {
        "body-type"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Storing
    }

    fn applies_to(&self, family: SchemeFamily) -> bool {
        family == SchemeFamily::Http
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        let body_type = source.request.body_type().to_string();
        info.values()
            .iter()
            .any(|value| value.eq_ignore_ascii_case(&body_type))
    }
}

struct DomainRequirement;

impl RequirementDescriptor for DomainRequirement {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Storing
    }

    fn applies_to(&self, _family: SchemeFamily) -> bool {
        true
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        let Some(host) = source.request.host() else {
            return false;
        };
        // Compare without any port suffix.
        let domain = host.split(':').next().unwrap_or(host);
        info.values()
            .iter()
            .any(|value| value.eq_ignore_ascii_case(domain))
    }
}

struct SocketOpcodeRequirement;

impl RequirementDescriptor for SocketOpcodeRequirement {
    fn name(&self) -> &'static str {
        "websocket-opcode"
    }

    fn kind(&self) -> RequirementKind {
        RequirementKind::Storing
    }

    fn applies_to(&self, family: SchemeFamily) -> bool {
        family == SchemeFamily::Ws
    }

    fn applies(&self, source: &ValueSource<'_>, info: &RequirementInfo) -> bool {
        // Vacuous at upgrade time; evaluated for real once frames flow.
        let Some(frame) = source.frame else {
            return true;
        };
        let opcode = frame.opcode.to_string();
        info.values()
            .iter()
            .any(|value| value.eq_ignore_ascii_case(&opcode))
    }
}

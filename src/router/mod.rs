use crate::{
    error::EmbernetError,
    middlewares::Middleware,
    requirement::RequirementInfo,
    types::{Handler, HttpMethods, Priority, Scheme, SchemeFamily, SocketHandler},
};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Compiled route templates with typed placeholders.
pub mod pattern;

pub use pattern::PathPattern;

/// Opaque handle for one registered endpoint, used for unregistration.
///
/// Ids are monotonic; removing an endpoint never renumbers the survivors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(pub(crate) u64);

/// The user code an endpoint mapping dispatches to.
#[derive(Clone)]
pub(crate) enum EndpointHandler {
    Http(Handler),
    Socket(SocketHandler),
}

/// One registered route: compiled pattern, priority, requirements, resolved
/// middleware chain and the handler itself.
pub struct EndpointMapping {
    pub(crate) id: EndpointId,
    pub(crate) seq: u64,
    pub(crate) family: SchemeFamily,
    pub(crate) pattern: PathPattern,
    pub(crate) priority: Priority,
    pub(crate) requirements: Vec<(String, RequirementInfo)>,
    pub(crate) middlewares: Vec<Arc<dyn Middleware>>,
    pub(crate) handler: EndpointHandler,
}

impl EndpointMapping {
    /// The id this mapping was registered under.
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// The compiled route pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// The mapping's priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The declared requirement for `name`, if any.
    pub fn requirement(&self, name: &str) -> Option<&RequirementInfo> {
        self.requirements
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, info)| info)
    }

    /// The method set declared through the `method` requirement. Empty means
    /// any method.
    pub fn methods(&self) -> Vec<HttpMethods> {
        self.requirement("method")
            .map(|info| {
                info.values()
                    .iter()
                    .filter_map(|value| HttpMethods::parse(value))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Key used for exact-duplicate rejection: pattern, priority and the
    /// full requirement set (the method set lives inside the requirements).
    fn duplicate_key(&self) -> (String, Priority, Vec<(String, Vec<String>)>) {
        let mut requirements: Vec<(String, Vec<String>)> = self
            .requirements
            .iter()
            .map(|(name, info)| (name.clone(), info.values().to_vec()))
            .collect();
        requirements.sort();
        (self.pattern.template().to_string(), self.priority, requirements)
    }
}

struct PatternEntry {
    pattern: PathPattern,
    mappings: Vec<Arc<EndpointMapping>>,
}

#[derive(Default)]
struct FamilyTable {
    entries: Vec<PatternEntry>,
    by_template: AHashMap<String, usize>,
}

impl FamilyTable {
    fn entry_for(&mut self, pattern: &PathPattern) -> usize {
        if let Some(&index) = self.by_template.get(pattern.template()) {
            return index;
        }
        self.entries.push(PatternEntry {
            pattern: pattern.clone(),
            mappings: Vec::new(),
        });
        let index = self.entries.len() - 1;
        self.by_template
            .insert(pattern.template().to_string(), index);
        index
    }
}

struct RegistryInner {
    http: FamilyTable,
    ws: FamilyTable,
    by_endpoint: AHashMap<u64, Vec<(SchemeFamily, String)>>,
    next_id: u64,
    next_seq: u64,
}

/// Stores endpoint mappings keyed by scheme family, with a compiled pattern
/// index per family and a reverse index for unregistration.
///
/// Lookups take a read lock and run concurrently; registration and
/// unregistration take the write lock.
pub struct RouteRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                http: FamilyTable::default(),
                ws: FamilyTable::default(),
                by_endpoint: AHashMap::new(),
                next_id: 1,
                next_seq: 1,
            }),
        }
    }

    /// Inserts a mapping, assigning its id and insertion sequence.
    ///
    /// Fails with `DuplicateEndpoint` when a mapping with the same family,
    /// pattern, priority and requirement set already exists. Multiple
    /// mappings may share a pattern as long as their requirement sets
    /// differ (typically by method).
    pub(crate) fn register(
        &self,
        family: SchemeFamily,
        pattern: PathPattern,
        priority: Priority,
        requirements: Vec<(String, RequirementInfo)>,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: EndpointHandler,
    ) -> Result<EndpointId, EmbernetError> {
        let mut inner = self.inner.write();
        let id = EndpointId(inner.next_id);
        let seq = inner.next_seq;

        let mapping = Arc::new(EndpointMapping {
            id,
            seq,
            family,
            pattern,
            priority,
            requirements,
            middlewares,
            handler,
        });

        let table = match family {
            SchemeFamily::Http => &mut inner.http,
            SchemeFamily::Ws => &mut inner.ws,
        };
        let index = table.entry_for(&mapping.pattern);
        let entry = &mut table.entries[index];

        let key = mapping.duplicate_key();
        if entry
            .mappings
            .iter()
            .any(|existing| existing.duplicate_key() == key)
        {
            return Err(EmbernetError::duplicate_endpoint(format!(
                "endpoint '{}' with the same priority and requirements is already registered",
                mapping.pattern.template()
            )));
        }
        entry.mappings.push(Arc::clone(&mapping));

        let template = mapping.pattern.template().to_string();
        inner
            .by_endpoint
            .entry(id.0)
            .or_default()
            .push((family, template));
        inner.next_id += 1;
        inner.next_seq += 1;
        Ok(id)
    }

    /// Removes every mapping registered under `id`. Surviving mappings keep
    /// their ids and sequence numbers.
    pub fn unregister(&self, id: EndpointId) {
        let mut inner = self.inner.write();
        let Some(owned) = inner.by_endpoint.remove(&id.0) else {
            return;
        };
        for (family, template) in owned {
            let table = match family {
                SchemeFamily::Http => &mut inner.http,
                SchemeFamily::Ws => &mut inner.ws,
            };
            if let Some(&index) = table.by_template.get(&template) {
                table.entries[index]
                    .mappings
                    .retain(|mapping| mapping.id != id);
            }
        }
    }

    /// Every mapping in the scheme's family whose pattern matches `path`,
    /// paired with its captured placeholder values, in pattern-then-FIFO
    /// order.
    pub(crate) fn lookup(
        &self,
        scheme: Scheme,
        path: &str,
    ) -> Vec<(Arc<EndpointMapping>, Vec<(String, String)>)> {
        let inner = self.inner.read();
        let table = match scheme.family() {
            SchemeFamily::Http => &inner.http,
            SchemeFamily::Ws => &inner.ws,
        };
        let mut matched = Vec::new();
        for entry in &table.entries {
            if let Some(captures) = entry.pattern.matches(path) {
                for mapping in &entry.mappings {
                    matched.push((Arc::clone(mapping), captures.clone()));
                }
            }
        }
        matched
    }

    /// Number of mappings currently registered in `family`.
    pub fn len(&self, family: SchemeFamily) -> usize {
        let inner = self.inner.read();
        let table = match family {
            SchemeFamily::Http => &inner.http,
            SchemeFamily::Ws => &inner.ws,
        };
        table.entries.iter().map(|entry| entry.mappings.len()).sum()
    }

    /// True when no mapping is registered in `family`.
    pub fn is_empty(&self, family: SchemeFamily) -> bool {
        self.len(family) == 0
    }
}

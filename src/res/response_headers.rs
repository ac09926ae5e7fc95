use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;

/// HTTP response headers with case-insensitive names.
///
/// `ResponseHeaders` wraps a [`HeaderMap`] and accepts string-ish names and
/// values; entries that do not parse as valid header names or values are
/// silently dropped, matching what the transport would do.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    inner: HeaderMap,
}

impl ResponseHeaders {
    /// Creates a new empty header collection.
    pub fn new() -> Self {
        Self {
            inner: HeaderMap::new(),
        }
    }

    /// Inserts a single header value, replacing any existing values.
    pub fn insert<K, V>(&mut self, key: K, value: V)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_ref().as_bytes()),
            HeaderValue::from_bytes(value.as_ref().as_bytes()),
        ) {
            self.inner.insert(name, value);
        }
    }

    /// Appends a header value, preserving existing values.
    pub fn append<K, V>(&mut self, key: K, value: V)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_ref().as_bytes()),
            HeaderValue::from_bytes(value.as_ref().as_bytes()),
        ) {
            self.inner.append(name, value);
        }
    }

    /// Gets the first value for a header.
    pub fn get<K>(&self, key: K) -> Option<&str>
    where
        K: AsRef<str>,
    {
        let name = HeaderName::from_bytes(key.as_ref().as_bytes()).ok()?;
        self.inner.get(&name)?.to_str().ok()
    }

    /// Gets all values for a header.
    pub fn get_all<K>(&self, key: K) -> Vec<&str>
    where
        K: AsRef<str>,
    {
        match HeaderName::from_bytes(key.as_ref().as_bytes()) {
            Ok(name) => self
                .inner
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Checks whether a header exists.
    pub fn contains_key<K>(&self, key: K) -> bool
    where
        K: AsRef<str>,
    {
        HeaderName::from_bytes(key.as_ref().as_bytes())
            .map(|name| self.inner.contains_key(&name))
            .unwrap_or(false)
    }

    /// Removes all values for a header.
    pub fn remove<K>(&mut self, key: K)
    where
        K: AsRef<str>,
    {
        if let Ok(name) = HeaderName::from_bytes(key.as_ref().as_bytes()) {
            self.inner.remove(&name);
        }
    }

    /// Number of header values stored.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no header is set.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates all (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|value| (k.as_str(), value)))
    }

    pub(crate) fn as_header_map(&self) -> &HeaderMap {
        &self.inner
    }
}

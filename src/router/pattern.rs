use crate::error::EmbernetError;
use regex::Regex;

/// A compiled route template.
///
/// Templates mix literal segments with typed placeholders:
///
/// ```text
/// /users/{id:int}/posts/{slug}
/// ```
///
/// Placeholder types are `string` (the default, one non-empty segment),
/// `int` (decimal digits), `uuid` (hyphenated hex form), and the escape
/// hatch `{name:regex:<pattern>}` for a custom segment pattern. The compiled
/// form is a regular expression anchored at both ends with one named capture
/// per placeholder, plus the counts used for ranking ties during dispatch.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    capture_names: Vec<String>,
    literal_segments: usize,
}

impl PathPattern {
    /// Compiles a route template.
    ///
    /// Fails with an `InvalidPattern` error when a placeholder type is
    /// unknown, a placeholder name repeats, a segment mixes literal text
    /// with a placeholder, or the template does not start with `/`.
    ///
    /// ## Example
    ///
    /// ```
    /// use embernet::router::PathPattern;
    ///
    /// let pattern = PathPattern::compile("/users/{id:int}").unwrap();
    /// let captures = pattern.matches("/users/42").unwrap();
    /// assert_eq!(captures[0], ("id".to_string(), "42".to_string()));
    /// assert!(pattern.matches("/users/abc").is_none());
    /// ```
    pub fn compile(template: &str) -> Result<Self, EmbernetError> {
        if !template.starts_with('/') {
            return Err(EmbernetError::invalid_pattern(format!(
                "route template '{}' must start with '/'",
                template
            )));
        }

        let mut pattern = String::from("^");
        let mut capture_names: Vec<String> = Vec::new();
        let mut literal_segments = 0usize;

        for segment in template.split('/').skip(1) {
            pattern.push('/');
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                let placeholder = &segment[1..segment.len() - 1];
                let (name, segment_pattern) = Self::placeholder(template, placeholder)?;
                if capture_names.iter().any(|existing| existing == name) {
                    return Err(EmbernetError::invalid_pattern(format!(
                        "placeholder '{}' occurs more than once in '{}'",
                        name, template
                    )));
                }
                pattern.push_str(&format!("(?P<{}>{})", name, segment_pattern));
                capture_names.push(name.to_string());
            } else if segment.contains('{') || segment.contains('}') {
                return Err(EmbernetError::invalid_pattern(format!(
                    "segment '{}' in '{}' mixes literal text with a placeholder",
                    segment, template
                )));
            } else {
                if !segment.is_empty() {
                    literal_segments += 1;
                }
                pattern.push_str(&regex::escape(segment));
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)?;
        Ok(Self {
            template: template.to_string(),
            regex,
            capture_names,
            literal_segments,
        })
    }

    /// Splits `name[:type[:pattern]]` and resolves the segment pattern.
    fn placeholder<'a>(
        template: &str,
        placeholder: &'a str,
    ) -> Result<(&'a str, String), EmbernetError> {
        let (name, type_spec) = match placeholder.split_once(':') {
            Some((name, type_spec)) => (name, type_spec),
            None => (placeholder, "string"),
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            || name.chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            return Err(EmbernetError::invalid_pattern(format!(
                "invalid placeholder name '{}' in '{}'",
                name, template
            )));
        }

        let segment_pattern = match type_spec {
            "string" => "[^/]+".to_string(),
            "int" => "[0-9]+".to_string(),
            "uuid" => "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}"
                .to_string(),
            custom => match custom.strip_prefix("regex:") {
                Some(inner) if !inner.is_empty() => format!("(?:{})", inner),
                _ => {
                    return Err(EmbernetError::invalid_pattern(format!(
                        "unknown placeholder type '{}' in '{}'",
                        type_spec, template
                    )));
                }
            },
        };

        Ok((name, segment_pattern))
    }

    /// Matches a request path against the compiled template.
    ///
    /// Returns one `(name, value)` pair per placeholder, in template order,
    /// with each value being exactly the substring the template extracts.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.regex.captures(path)?;
        Some(
            self.capture_names
                .iter()
                .map(|name| {
                    let value = captures
                        .name(name)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default();
                    (name.clone(), value)
                })
                .collect(),
        )
    }

    /// The original template string.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Number of placeholders in the template.
    pub fn arity(&self) -> usize {
        self.capture_names.len()
    }

    /// Number of literal (non-placeholder) segments, the second ranking key.
    pub fn literal_segments(&self) -> usize {
        self.literal_segments
    }

    /// Placeholder names in template order.
    pub fn capture_names(&self) -> &[String] {
        &self.capture_names
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for PathPattern {}

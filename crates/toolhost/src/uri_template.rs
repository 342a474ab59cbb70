//! URI templates for resource addressing (`weather://{location}`).
//!
//! A template is a literal string with `{name}` placeholders. A plain
//! placeholder matches one or more characters up to the next `/`; a
//! reserved placeholder `{+name}` may also span `/`.

use regex::Regex;

use crate::types::{HostError, HostResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable { name: String, reserved: bool },
}

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    source: String,
    segments: Vec<Segment>,
    pattern: Regex,
}

impl UriTemplate {
    /// Parse and compile a template.
    pub fn parse(template: &str) -> HostResult<Self> {
        let invalid = |reason: &str| HostError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        if template.is_empty() {
            return Err(invalid("template must not be empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        if n == '{' {
                            return Err(invalid("nested '{'"));
                        }
                        name.push(n);
                    }
                    if !closed {
                        return Err(invalid("unterminated '{'"));
                    }
                    let (name, reserved) = match name.strip_prefix('+') {
                        Some(rest) => (rest.to_string(), true),
                        None => (name, false),
                    };
                    if name.is_empty()
                        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                    {
                        return Err(invalid("variable names must be non-empty [A-Za-z0-9_]"));
                    }
                    if segments
                        .iter()
                        .any(|s| matches!(s, Segment::Variable { name: n, .. } if *n == name))
                    {
                        return Err(invalid("duplicate variable name"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    } else if matches!(segments.last(), Some(Segment::Variable { .. })) {
                        return Err(invalid("adjacent variables are ambiguous"));
                    }
                    segments.push(Segment::Variable { name, reserved });
                }
                '}' => return Err(invalid("unmatched '}'")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let mut pattern = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Variable { name, reserved } => {
                    let class = if *reserved { ".+" } else { "[^/]+" };
                    pattern.push_str(&format!("(?P<{name}>{class})"));
                }
            }
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            source: template.to_string(),
            segments,
            pattern,
        })
    }

    /// The template text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Variable names in the order they appear.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Whether the template has no variables (a fixed URI).
    pub fn is_static(&self) -> bool {
        self.variables().next().is_none()
    }

    /// Match a concrete URI, returning `(variable, value)` pairs in template order.
    pub fn matches(&self, uri: &str) -> Option<Vec<(String, String)>> {
        let caps = self.pattern.captures(uri)?;
        Some(
            self.variables()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

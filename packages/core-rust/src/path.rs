//! REST route templates.
//!
//! A template such as `/people/{userId}+/{groupId}/{personId}+` compiles into
//! a sequence of [`Segment`]s. Templates registered for the same service and
//! verb are kept in a sorted set; the [`Ord`] impl ranks the most specific
//! template first so that lookup can take the first accepting match.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Separator between values of a plural path segment or list parameter.
pub const LIST_SEPARATOR: char = ',';

/// Parameter multimap: name -> one or more string values.
pub type ParamMap = BTreeMap<String, Vec<String>>;

/// One `/`-delimited piece of a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A literal that must match exactly.
    Const(String),
    /// `{name}`: captures exactly one value.
    Single(String),
    /// `{name}+`: captures a comma-separated list of values.
    Plural(String),
}

/// Errors from compiling a template string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated parameter segment `{segment}`")]
    UnterminatedParameter { segment: String },
    #[error("empty parameter name in segment `{segment}`")]
    EmptyParameterName { segment: String },
    #[error("plural parameter `{name}` must be the last occurrence of that name")]
    PluralNotLast { name: String },
}

/// A compiled route template.
///
/// The first segment names the service. The ranking attributes
/// ([`const_count`](Self::const_count), [`last_const_index`](Self::last_const_index))
/// describe the segments after it.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
    const_count: usize,
    last_const_index: Option<usize>,
}

impl PathTemplate {
    /// Compiles `template`. Empty pieces (leading, trailing, or doubled `/`)
    /// are ignored.
    ///
    /// A name may appear more than once; the last capture wins. A plural
    /// `{name}+` must be the last occurrence of its name.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] for an unterminated `{`, an empty parameter
    /// name, or a plural parameter followed by another use of its name.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut const_count = 0;
        let mut last_const_index = None;

        for (index, part) in template.split('/').filter(|p| !p.is_empty()).enumerate() {
            let segment = if let Some(inner) = part.strip_prefix('{') {
                let (name, plural) = if let Some(name) = inner.strip_suffix("}+") {
                    (name, true)
                } else if let Some(name) = inner.strip_suffix('}') {
                    (name, false)
                } else {
                    return Err(TemplateError::UnterminatedParameter {
                        segment: part.to_string(),
                    });
                };
                if name.is_empty() {
                    return Err(TemplateError::EmptyParameterName {
                        segment: part.to_string(),
                    });
                }
                let after_plural = segments
                    .iter()
                    .any(|s| matches!(s, Segment::Plural(n) if n == name));
                if after_plural {
                    return Err(TemplateError::PluralNotLast {
                        name: name.to_string(),
                    });
                }
                if plural {
                    Segment::Plural(name.to_string())
                } else {
                    Segment::Single(name.to_string())
                }
            } else {
                if index > 0 {
                    const_count += 1;
                    last_const_index = Some(index - 1);
                }
                Segment::Const(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
            const_count,
            last_const_index,
        })
    }

    /// The template string as registered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of literal segments after the service segment.
    #[must_use]
    pub fn const_count(&self) -> usize {
        self.const_count
    }

    /// Position of the last literal segment, counted from the segment after
    /// the service segment. `None` when only the service is literal.
    #[must_use]
    pub fn last_const_index(&self) -> Option<usize> {
        self.last_const_index
    }

    /// Names of all single and plural parameters, in template order.
    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Single(n) | Segment::Plural(n) => Some(n.as_str()),
            Segment::Const(_) => None,
        })
    }

    /// Matches the request path segments against this template.
    ///
    /// Returns `Ok(None)` when the literals do not line up. Parameter
    /// positions missing from the request, and request segments past the end
    /// of the template, are simply absent from the returned map. Empty
    /// request segments capture nothing.
    ///
    /// # Errors
    ///
    /// A list value supplied for a single parameter is a malformed request.
    pub fn accept(&self, request: &[&str]) -> Result<Option<ParamMap>, ProtocolError> {
        if !self.segments.is_empty() {
            let last = self.last_const_index.map_or(0, |i| i + 1);
            if request.len() <= last {
                return Ok(None);
            }
            let literals_match = self.segments[..=last]
                .iter()
                .zip(request)
                .all(|(segment, value)| match segment {
                    Segment::Const(literal) => literal == value,
                    _ => true,
                });
            if !literals_match {
                return Ok(None);
            }
        }

        let mut params = ParamMap::new();
        for (segment, value) in self.segments.iter().zip(request) {
            if value.is_empty() {
                continue;
            }
            match segment {
                Segment::Const(_) => {}
                Segment::Single(name) => {
                    if value.contains(LIST_SEPARATOR) {
                        return Err(ProtocolError::bad_request(format!(
                            "Cannot expect plural value {value} for singular field {name}"
                        )));
                    }
                    params.insert(name.clone(), vec![(*value).to_string()]);
                }
                Segment::Plural(name) => {
                    let values = value
                        .split(LIST_SEPARATOR)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                        .collect();
                    params.insert(name.clone(), values);
                }
            }
        }
        Ok(Some(params))
    }
}

/// Splits a concrete request path on `/`, dropping a single leading empty
/// piece.
#[must_use]
pub fn split_request_path(path: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = path.split('/').collect();
    if parts.first() == Some(&"") {
        parts.remove(0);
    }
    parts
}

impl FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// More literals first, then the earlier last literal, then the raw string.
impl Ord for PathTemplate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .const_count
            .cmp(&self.const_count)
            .then_with(|| self.last_const_index.cmp(&other.last_const_index))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for PathTemplate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PathTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathTemplate {}

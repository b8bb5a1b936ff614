//! Route matching logic.
//!
//! # Responsibilities
//! - Match the request path against a segment pattern
//! - Match the request method against an allow-list
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Path matching is case-sensitive and segment-exact, trailing slash included
//! - Empty method list = any method
//! - No regex to guarantee O(n) matching

use axum::http::Method;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, method: &Method, path: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("must start with '/'")]
    MissingLeadingSlash,
    #[error("parameter name is empty")]
    EmptyParam,
    #[error("catch-all must be the last segment")]
    CatchAllNotLast,
}

/// A path pattern such as `/characters/{character_id}/` or `/{*path}`.
///
/// `{name}` matches exactly one segment, `{*name}` matches the remainder of
/// the path (possibly empty) and may only appear last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let rest = pattern
            .strip_prefix('/')
            .ok_or(PatternError::MissingLeadingSlash)?;

        let raw: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => match inner.strip_prefix('*') {
                    Some(name) => {
                        if i + 1 != raw.len() {
                            return Err(PatternError::CatchAllNotLast);
                        }
                        if name.is_empty() {
                            return Err(PatternError::EmptyParam);
                        }
                        Segment::CatchAll(name.to_string())
                    }
                    None if inner.is_empty() => return Err(PatternError::EmptyParam),
                    None => Segment::Param(inner.to_string()),
                },
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    pub fn is_match(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        let mut parts = rest.split('/');

        for segment in &self.segments {
            match segment {
                Segment::CatchAll(_) => return true,
                Segment::Param(_) => match parts.next() {
                    Some(p) if !p.is_empty() => {}
                    _ => return false,
                },
                Segment::Literal(lit) => match parts.next() {
                    Some(p) if p == lit => {}
                    _ => return false,
                },
            }
        }
        parts.next().is_none()
    }
}

/// Matches the request path.
#[derive(Debug, Clone)]
pub struct PathPatternMatcher {
    pattern: PathPattern,
}

impl PathPatternMatcher {
    pub fn new(pattern: PathPattern) -> Self {
        Self { pattern }
    }
}

impl Matcher for PathPatternMatcher {
    fn matches(&self, _method: &Method, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

/// Matches the request method against an allow-list.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    /// Unknown method names are dropped; validation rejects them earlier.
    pub fn new<S: AsRef<str>>(methods: &[S]) -> Self {
        let methods = methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.as_ref().to_ascii_uppercase().as_bytes()).ok())
            .collect();
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, method: &Method, _path: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, method: &Method, path: &str) -> bool {
        self.matchers.iter().all(|m| m.matches(method, path))
    }
}

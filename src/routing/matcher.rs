//! Route matching primitives.
//!
//! # Responsibilities
//! - Match request methods against a method set (empty/`*` = any)
//! - Match request paths against filter patterns (exact, prefix wildcard, catch-all)
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Method names are normalized to upper case when parsed
//! - No regex to guarantee O(n) matching

use axum::http::Method;
use std::fmt;

use crate::routing::RouteError;

/// Set of HTTP methods a route entry accepts.
///
/// An empty set matches every method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet {
    methods: Vec<Method>,
}

impl MethodSet {
    /// A set matching every method.
    pub fn any() -> Self {
        Self::default()
    }

    /// A set matching exactly the given methods.
    pub fn of<I: IntoIterator<Item = Method>>(methods: I) -> Self {
        let mut set = Self::default();
        for method in methods {
            if !set.methods.contains(&method) {
                set.methods.push(method);
            }
        }
        set.methods.sort_by_key(method_order);
        set
    }

    /// Parse method names; `*` anywhere in the list yields [`MethodSet::any`].
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, RouteError> {
        let mut methods = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if name == "*" {
                return Ok(Self::any());
            }
            let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                .map_err(|_| RouteError::InvalidMethod(name.to_string()))?;
            methods.push(method);
        }
        Ok(Self::of(methods))
    }

    pub fn is_any(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.is_any() || self.methods.contains(method)
    }

    /// Explicit methods in canonical order (empty for [`MethodSet::any`]).
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }
}

impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return f.write_str("*");
        }
        f.write_str(&format_allow_header(&self.methods))
    }
}

/// Path pattern used by filter bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// `*` or `/*`: every path.
    Any,
    /// `/prefix/*`: the prefix itself and everything below it.
    Prefix(String),
    /// A literal path.
    Exact(String),
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteError> {
        let pattern = pattern.trim();
        if pattern == "*" || pattern == "/*" {
            return Ok(Self::Any);
        }
        if !pattern.starts_with('/') {
            return Err(RouteError::InvalidPattern(pattern.to_string()));
        }
        match pattern.find('*') {
            None => Ok(Self::Exact(normalize_path(pattern))),
            Some(pos) if pos == pattern.len() - 1 && pattern.ends_with("/*") => {
                Ok(Self::Prefix(normalize_path(&pattern[..pos - 1])))
            }
            Some(_) => Err(RouteError::InvalidPattern(pattern.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(exact) => exact == path,
            Self::Prefix(prefix) => {
                path == prefix
                    || (path.starts_with(prefix.as_str())
                        && path.as_bytes().get(prefix.len()) == Some(&b'/'))
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("/*"),
            Self::Prefix(prefix) => write!(f, "{}/*", prefix),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

/// Strip a trailing slash (except for the root path) and collapse empty paths to `/`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Sort order for HTTP methods, used to produce consistent `Allow` headers:
/// GET, HEAD, POST, PUT, DELETE, PATCH, OPTIONS, TRACE, CONNECT, extensions.
pub fn method_order(method: &Method) -> u8 {
    match *method {
        Method::GET => 0,
        Method::HEAD => 1,
        Method::POST => 2,
        Method::PUT => 3,
        Method::DELETE => 4,
        Method::PATCH => 5,
        Method::OPTIONS => 6,
        Method::TRACE => 7,
        Method::CONNECT => 8,
        _ => 9,
    }
}

/// Format methods as an HTTP `Allow` header value.
pub fn format_allow_header(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_set_parse() {
        let set = MethodSet::parse(&["post", "GET", "GET"]).unwrap();
        assert_eq!(set.methods(), &[Method::GET, Method::POST]);
        assert!(set.contains(&Method::POST));
        assert!(!set.contains(&Method::PUT));

        let any = MethodSet::parse(&["GET", "*"]).unwrap();
        assert!(any.is_any());
        assert!(any.contains(&Method::DELETE));

        assert!(MethodSet::parse(&["GE T"]).is_err());
    }

    #[test]
    fn test_empty_method_set_matches_all() {
        let set = MethodSet::parse::<&str>(&[]).unwrap();
        assert!(set.contains(&Method::PATCH));
        assert_eq!(set.to_string(), "*");
    }

    #[test]
    fn test_prefix_pattern() {
        let pattern = PathPattern::parse("/api/*").unwrap();
        assert!(pattern.matches("/api"));
        assert!(pattern.matches("/api/v1/users"));
        assert!(!pattern.matches("/apikeys"));
        assert!(!pattern.matches("/other"));
    }

    #[test]
    fn test_catch_all_and_exact_patterns() {
        assert_eq!(PathPattern::parse("*").unwrap(), PathPattern::Any);
        assert!(PathPattern::parse("/*").unwrap().matches("/anything/here"));

        let exact = PathPattern::parse("/login/").unwrap();
        assert!(exact.matches("/login"));
        assert!(!exact.matches("/login/form"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("api/*").is_err());
        assert!(PathPattern::parse("/a/*/b").is_err());
        assert!(PathPattern::parse("/a*").is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a/b/"), "/a/b");
        assert_eq!(normalize_path("a"), "/a");
    }
}

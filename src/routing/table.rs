//! Immutable route table.
//!
//! # Responsibilities
//! - Index exact bindings by path, then method
//! - Keep filter bindings in a fixed execution order
//! - Resolve a request into (filter chain, terminal target)
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Colliding exact bindings are a build error, never a silent overwrite
//! - Filters sorted by ascending index, ties by registration order
//! - Exact bindings decide 404 vs 405 when present for the path

use axum::http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dispatch::Handler;
use crate::negotiation::BeanType;
use crate::routing::matcher::{method_order, normalize_path, MethodSet, PathPattern};
use crate::routing::RouteError;

/// Methods the boundary layer answers for any known path.
pub const IMPLICIT_METHODS: [Method; 3] = [Method::HEAD, Method::OPTIONS, Method::TRACE];

/// One binding handed over by the handler-discovery layer.
#[derive(Clone)]
pub enum RouteEntry {
    Exact(ExactBinding),
    Filter(FilterBinding),
}

impl RouteEntry {
    /// Bind `path` and `methods` to a primary handler.
    pub fn exact(path: &str, methods: MethodSet, handler: Arc<dyn Handler>) -> Self {
        Self::Exact(ExactBinding {
            path: normalize_path(path),
            methods,
            handler,
            consumes: None,
            produces: None,
        })
    }

    /// Bind a filter pattern at the given ordering index.
    pub fn filter(
        pattern: &str,
        methods: MethodSet,
        index: i32,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, RouteError> {
        Ok(Self::Filter(FilterBinding {
            pattern: PathPattern::parse(pattern)?,
            methods,
            index,
            handler,
        }))
    }

    /// Declare the bean type the request body is decoded into. No-op for filters.
    pub fn consuming(mut self, bean: BeanType) -> Self {
        if let Self::Exact(binding) = &mut self {
            binding.consumes = Some(bean);
        }
        self
    }

    /// Declare the bean type the handler produces. No-op for filters.
    pub fn producing(mut self, bean: BeanType) -> Self {
        if let Self::Exact(binding) = &mut self {
            binding.produces = Some(bean);
        }
        self
    }
}

/// A primary handler bound to a literal path.
#[derive(Clone)]
pub struct ExactBinding {
    pub path: String,
    pub methods: MethodSet,
    pub handler: Arc<dyn Handler>,
    pub consumes: Option<BeanType>,
    pub produces: Option<BeanType>,
}

impl fmt::Debug for ExactBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExactBinding")
            .field("path", &self.path)
            .field("methods", &self.methods.to_string())
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish()
    }
}

/// A filter bound to a path pattern.
#[derive(Clone)]
pub struct FilterBinding {
    pub pattern: PathPattern,
    pub methods: MethodSet,
    pub index: i32,
    pub handler: Arc<dyn Handler>,
}

impl fmt::Debug for FilterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterBinding")
            .field("pattern", &self.pattern.to_string())
            .field("methods", &self.methods.to_string())
            .field("index", &self.index)
            .finish()
    }
}

/// Exact bindings registered for one path.
#[derive(Default)]
struct PathBindings {
    by_method: Vec<(Method, Arc<ExactBinding>)>,
    any: Option<Arc<ExactBinding>>,
}

impl PathBindings {
    fn get(&self, method: &Method) -> Option<&Arc<ExactBinding>> {
        self.by_method
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, b)| b)
            .or(self.any.as_ref())
    }

    fn allowed(&self) -> Vec<Method> {
        self.by_method.iter().map(|(m, _)| m.clone()).collect()
    }
}

/// What the dispatcher runs after the filter chain.
#[derive(Debug)]
pub enum Target<'a> {
    Handler(&'a ExactBinding),
    NotFound,
    /// Path is known but not for this method; `allowed` includes the implicit methods.
    MethodNotAllowed { allowed: Vec<Method> },
}

/// Result of resolving one request against a [`RouteTable`].
#[derive(Debug)]
pub struct Resolution<'a> {
    /// Matching filters in execution order.
    pub filters: Vec<&'a FilterBinding>,
    pub target: Target<'a>,
}

/// Immutable snapshot of an application's bindings.
#[derive(Default)]
pub struct RouteTable {
    exact: HashMap<String, PathBindings>,
    filters: Vec<FilterBinding>,
}

impl RouteTable {
    /// Build a table from route entries.
    pub fn build(entries: Vec<RouteEntry>) -> Result<Self, RouteError> {
        let mut exact: HashMap<String, PathBindings> = HashMap::new();
        let mut filters = Vec::new();

        for entry in entries {
            match entry {
                RouteEntry::Exact(binding) => {
                    let binding = Arc::new(binding);
                    let slot = exact.entry(binding.path.clone()).or_default();
                    if binding.methods.is_any() {
                        if slot.any.is_some() {
                            return Err(RouteError::DuplicateBinding {
                                path: binding.path.clone(),
                                method: "*".to_string(),
                            });
                        }
                        slot.any = Some(binding);
                        continue;
                    }
                    for method in binding.methods.methods() {
                        if slot.by_method.iter().any(|(m, _)| m == method) {
                            return Err(RouteError::DuplicateBinding {
                                path: binding.path.clone(),
                                method: method.to_string(),
                            });
                        }
                        slot.by_method.push((method.clone(), Arc::clone(&binding)));
                    }
                }
                RouteEntry::Filter(filter) => filters.push(filter),
            }
        }

        // sort_by_key is stable: equal indexes keep registration order
        filters.sort_by_key(|f| f.index);
        for bindings in exact.values_mut() {
            bindings.by_method.sort_by_key(|(m, _)| method_order(m));
        }

        Ok(Self { exact, filters })
    }

    /// Resolve a request path (application-relative) and method.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let path = normalize_path(path);

        // HEAD is answered as GET, so GET filters guard it too
        let is_head = *method == Method::HEAD;
        let filters: Vec<&FilterBinding> = self
            .filters
            .iter()
            .filter(|f| {
                f.pattern.matches(&path)
                    && (f.methods.contains(method) || (is_head && f.methods.contains(&Method::GET)))
            })
            .collect();

        let target = match self.exact.get(&path) {
            Some(bindings) => match bindings.get(method) {
                Some(binding) => Target::Handler(binding),
                None if is_head => match bindings.get(&Method::GET) {
                    Some(binding) => Target::Handler(binding),
                    None => Target::MethodNotAllowed {
                        allowed: with_implicit(bindings.allowed()),
                    },
                },
                None => Target::MethodNotAllowed {
                    allowed: with_implicit(bindings.allowed()),
                },
            },
            None if filters.is_empty() => self.filter_only_target(&path),
            None => Target::NotFound,
        };

        Resolution { filters, target }
    }

    /// Classify a path with no exact binding and no filter accepting the method.
    fn filter_only_target(&self, path: &str) -> Target<'_> {
        let mut allowed = Vec::new();
        let mut matched = false;
        for filter in self.filters.iter().filter(|f| f.pattern.matches(path)) {
            matched = true;
            for method in filter.methods.methods() {
                if !allowed.contains(method) {
                    allowed.push(method.clone());
                }
            }
        }
        if matched {
            Target::MethodNotAllowed {
                allowed: with_implicit(allowed),
            }
        } else {
            Target::NotFound
        }
    }

    /// Union of methods explicitly bound to `path`, or `None` if the path is unknown.
    pub fn allowed_methods(&self, path: &str) -> Option<Vec<Method>> {
        self.exact
            .get(&normalize_path(path))
            .map(|b| with_implicit(b.allowed()))
    }

    pub fn filters(&self) -> &[FilterBinding] {
        &self.filters
    }

    /// Number of distinct exact paths.
    pub fn path_count(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.filters.is_empty()
    }
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("paths", &self.exact.len())
            .field("filters", &self.filters)
            .finish()
    }
}

/// Add the boundary's implicit methods. HEAD is only advertised where GET is bound.
fn with_implicit(mut methods: Vec<Method>) -> Vec<Method> {
    let has_get = methods.contains(&Method::GET);
    for method in IMPLICIT_METHODS {
        if method == Method::HEAD && !has_get {
            continue;
        }
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    methods.sort_by_key(method_order);
    methods
}

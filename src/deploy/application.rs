//! A built, immutable application version.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::dispatch::SessionHandler;
use crate::routing::{normalize_path, RouteTable};

/// Where an application version was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationSource {
    /// Assembled in code and handed to `publish` directly.
    Programmatic,
    Directory(PathBuf),
    Archive(PathBuf),
}

impl ApplicationSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Programmatic => "programmatic",
            Self::Directory(_) => "directory",
            Self::Archive(_) => "archive",
        }
    }
}

/// One version of an application: its routes, WebSocket endpoints and content root.
///
/// Never mutated once published; a new version replaces the reference.
pub struct Application {
    name: Arc<str>,
    base_dir: PathBuf,
    routes: Arc<RouteTable>,
    sockets: HashMap<String, Arc<dyn SessionHandler>>,
    source: ApplicationSource,
    version: u64,
    published_at: u64,
}

impl Application {
    /// An empty application with no routes.
    pub fn new(name: &str, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: Arc::from(name),
            base_dir: base_dir.into(),
            routes: Arc::new(RouteTable::default()),
            sockets: HashMap::new(),
            source: ApplicationSource::Programmatic,
            version: 0,
            published_at: 0,
        }
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    /// Bind a WebSocket endpoint to an application-relative path.
    pub fn with_socket(mut self, path: &str, handler: Arc<dyn SessionHandler>) -> Self {
        self.sockets.insert(normalize_path(path), handler);
        self
    }

    pub fn with_source(mut self, source: ApplicationSource) -> Self {
        self.source = source;
        self
    }

    pub(crate) fn stamped(mut self, version: u64, published_at: u64) -> Self {
        self.version = version;
        self.published_at = published_at;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn socket(&self, path: &str) -> Option<&Arc<dyn SessionHandler>> {
        self.sockets.get(&normalize_path(path))
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn source(&self) -> &ApplicationSource {
        &self.source
    }

    /// Publish sequence number; 0 until published.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Publish time in milliseconds since the epoch; 0 until published.
    pub fn published_at(&self) -> u64 {
        self.published_at
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.name)
            .field("base_dir", &self.base_dir)
            .field("routes", &self.routes)
            .field("sockets", &self.sockets.keys().collect::<Vec<_>>())
            .field("source", &self.source)
            .field("version", &self.version)
            .finish()
    }
}

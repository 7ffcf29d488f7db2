//! Builds an [`Application`] from a directory.
//!
//! The directory may carry an `app.toml` manifest binding paths to handler
//! names from a [`HandlerCatalog`]:
//!
//! ```toml
//! [[route]]
//! path = "/items"
//! methods = ["GET", "POST"]
//! handler = "echo"
//! consumes = "Item"
//! produces = "Item"
//!
//! [[filter]]
//! pattern = "/*"
//! index = 10
//! handler = "access-log"
//!
//! [[socket]]
//! path = "/chat"
//! handler = "ws-echo"
//! ```
//!
//! A directory without a manifest becomes a static-content-only application.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::deploy::application::{Application, ApplicationSource};
use crate::deploy::catalog::HandlerCatalog;
use crate::deploy::DeploymentError;
use crate::negotiation::BeanType;
use crate::routing::{MethodSet, RouteEntry, RouteTable};

pub const MANIFEST_FILE: &str = "app.toml";

/// Turns an on-disk application directory into a built application.
pub trait ApplicationLoader: Send + Sync {
    fn load(&self, name: &str, base_dir: &Path) -> Result<Application, DeploymentError>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default, rename = "route")]
    routes: Vec<RouteManifest>,
    #[serde(default, rename = "filter")]
    filters: Vec<FilterManifest>,
    #[serde(default, rename = "socket")]
    sockets: Vec<SocketManifest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteManifest {
    path: String,
    /// Empty or `["*"]` binds every method.
    #[serde(default)]
    methods: Vec<String>,
    handler: String,
    consumes: Option<String>,
    produces: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterManifest {
    pattern: String,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default)]
    index: i32,
    handler: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SocketManifest {
    path: String,
    handler: String,
}

/// Loader reading `app.toml` and resolving handler names in a catalog.
pub struct ManifestLoader {
    catalog: Arc<HandlerCatalog>,
}

impl ManifestLoader {
    pub fn new(catalog: Arc<HandlerCatalog>) -> Self {
        Self { catalog }
    }

    fn read_manifest(name: &str, base_dir: &Path) -> Result<Manifest, DeploymentError> {
        let path = base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            tracing::debug!(application = %name, "No manifest, serving static content only");
            return Ok(Manifest::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DeploymentError::io("read application manifest", e))?;
        toml::from_str(&content).map_err(|e| DeploymentError::build(name, e))
    }
}

impl ApplicationLoader for ManifestLoader {
    fn load(&self, name: &str, base_dir: &Path) -> Result<Application, DeploymentError> {
        if !base_dir.is_dir() {
            return Err(DeploymentError::build(
                name,
                format!("'{}' is not a directory", base_dir.display()),
            ));
        }
        let manifest = Self::read_manifest(name, base_dir)?;
        let unknown = |kind: &str, handler: &str| {
            DeploymentError::build(name, format!("unknown {} '{}'", kind, handler))
        };

        let mut entries = Vec::with_capacity(manifest.routes.len() + manifest.filters.len());
        for route in &manifest.routes {
            let handler = self
                .catalog
                .handler(&route.handler)
                .ok_or_else(|| unknown("handler", &route.handler))?;
            let methods = MethodSet::parse(route.methods.as_slice())
                .map_err(|e| DeploymentError::build(name, e))?;
            let mut entry = RouteEntry::exact(&route.path, methods, handler);
            if let Some(bean) = &route.consumes {
                entry = entry.consuming(BeanType::named(bean.clone()));
            }
            if let Some(bean) = &route.produces {
                entry = entry.producing(BeanType::named(bean.clone()));
            }
            entries.push(entry);
        }
        for filter in &manifest.filters {
            let handler = self
                .catalog
                .handler(&filter.handler)
                .ok_or_else(|| unknown("handler", &filter.handler))?;
            let methods = MethodSet::parse(filter.methods.as_slice())
                .map_err(|e| DeploymentError::build(name, e))?;
            entries.push(
                RouteEntry::filter(&filter.pattern, methods, filter.index, handler)
                    .map_err(|e| DeploymentError::build(name, e))?,
            );
        }

        let routes = RouteTable::build(entries).map_err(|e| DeploymentError::build(name, e))?;
        let mut application = Application::new(name, base_dir)
            .with_routes(routes)
            .with_source(ApplicationSource::Directory(base_dir.to_path_buf()));
        for socket in &manifest.sockets {
            let handler = self
                .catalog
                .socket(&socket.handler)
                .ok_or_else(|| unknown("socket handler", &socket.handler))?;
            application = application.with_socket(&socket.path, handler);
        }

        tracing::debug!(
            application = %name,
            routes = manifest.routes.len(),
            filters = manifest.filters.len(),
            sockets = manifest.sockets.len(),
            "Application built"
        );
        Ok(application)
    }
}

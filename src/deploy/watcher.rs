//! Drop-directory watcher for hot deployment.
//!
//! Any `<name>.tar` appearing in the drop directory is published as
//! application `<name>` and removed once the publish succeeds. Producers
//! should write elsewhere and rename into the directory so that a partially
//! written archive is never picked up.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::deploy::manager::{DeploySource, DeploymentManager};

/// Watches a directory and publishes archives dropped into it.
pub struct DropWatcher {
    directory: PathBuf,
    manager: Arc<DeploymentManager>,
}

impl DropWatcher {
    pub fn new(directory: &Path, manager: Arc<DeploymentManager>) -> Self {
        Self {
            directory: directory.to_path_buf(),
            manager,
        }
    }

    /// Publish archives already present in the directory.
    pub fn scan(&self) -> std::io::Result<Vec<String>> {
        std::fs::create_dir_all(&self.directory)?;
        let mut archives: Vec<PathBuf> = std::fs::read_dir(&self.directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        archives.sort();
        Ok(archives
            .iter()
            .filter_map(|path| publish_dropped(&self.manager, path))
            .collect())
    }

    /// Start watching in notify's background thread.
    ///
    /// The returned watcher must be kept alive for as long as events should
    /// be processed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let manager = Arc::clone(&self.manager);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_create() || event.kind.is_modify() {
                        for path in &event.paths {
                            publish_dropped(&manager, path);
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "Drop directory watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.directory.display(), "Drop directory watcher started");
        Ok(watcher)
    }
}

/// Publish one dropped archive, returning the application name on success.
pub fn publish_dropped(manager: &DeploymentManager, path: &Path) -> Option<String> {
    if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("tar") {
        return None;
    }
    let name = path.file_stem().and_then(|s| s.to_str())?.to_string();

    tracing::info!(application = %name, path = %path.display(), "Archive dropped, publishing");
    match manager.publish_source(&name, DeploySource::Archive(path.to_path_buf())) {
        Ok(application) => {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove dropped archive");
            }
            tracing::info!(application = %name, version = application.version(), "Dropped archive published");
            Some(name)
        }
        Err(e) => {
            tracing::error!(application = %name, error = %e, "Failed to publish dropped archive");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use crate::deploy::{HandlerCatalog, ManifestLoader, Registry, TarExtractor};

    fn manager(root: &Path) -> Arc<DeploymentManager> {
        Arc::new(DeploymentManager::new(
            Arc::new(Registry::new("root")),
            Arc::new(ManifestLoader::new(Arc::new(HandlerCatalog::with_builtins()))),
            Arc::new(TarExtractor),
            DeployConfig {
                directory: root.join("apps"),
                work_directory: root.join("work"),
                backup_directory: root.join("backups"),
                ..DeployConfig::default()
            },
        ))
    }

    fn empty_tar(path: &Path) {
        let mut builder = tar::Builder::new(std::fs::File::create(path).unwrap());
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "README", &[][..]).unwrap();
        builder.finish().unwrap();
    }

    #[test]
    fn test_scan_publishes_and_removes_archives() {
        let root = tempfile::tempdir().unwrap();
        let drop_dir = root.path().join("drop");
        std::fs::create_dir_all(&drop_dir).unwrap();
        empty_tar(&drop_dir.join("blog.tar"));
        std::fs::write(drop_dir.join("notes.txt"), "ignored").unwrap();

        let manager = manager(root.path());
        let watcher = DropWatcher::new(&drop_dir, Arc::clone(&manager));
        assert_eq!(watcher.scan().unwrap(), vec!["blog".to_string()]);

        assert!(manager.registry().current("blog").is_some());
        assert!(!drop_dir.join("blog.tar").exists());
        assert!(drop_dir.join("notes.txt").exists());
        assert!(root.path().join("apps/blog.tar").is_file());
    }

    #[test]
    fn test_failed_publish_keeps_dropped_file() {
        let root = tempfile::tempdir().unwrap();
        let dropped = root.path().join("broken.tar");
        std::fs::write(&dropped, vec![b'x'; 1024]).unwrap();

        let manager = manager(root.path());
        assert!(publish_dropped(&manager, &dropped).is_none());
        assert!(dropped.exists());
    }
}

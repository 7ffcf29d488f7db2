//! Deployment manager: publish, rollback, unpublish and delete.
//!
//! # Responsibilities
//! - Build applications from directories and archives
//! - Keep the on-disk layout and per-name backup history in step
//! - Swap new versions into the registry only after a full build
//!
//! # On-disk layout
//! ```text
//! <directory>/<name>.tar                 live archive
//! <directory>/<name>/                    directory deployment
//! <backup_directory>/<name>/<millis>.tar backups, newest = largest stamp
//! <work_directory>/<name>/<millis>/      extracted archive contents
//! ```
//!
//! # Design Decisions
//! - Operations are synchronous; callers on the async runtime use `spawn_blocking`
//! - The slot lock is held for a whole operation on one name, never across names
//! - Extract and build happen before any file is moved, so a failure leaves
//!   the live version and backups as they were

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::DeployConfig;
use crate::deploy::application::{Application, ApplicationSource};
use crate::deploy::backup::{BackupEntry, BackupHistory};
use crate::deploy::extract::ArchiveExtractor;
use crate::deploy::loader::ApplicationLoader;
use crate::deploy::registry::{Registry, RegistrySlot, SlotState};
use crate::deploy::DeploymentError;
use crate::observability::metrics;
use crate::statistics::now_millis;

/// Source handed to [`DeploymentManager::publish_source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploySource {
    Directory(PathBuf),
    Archive(PathBuf),
}

/// Summary of one registered application.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    pub name: String,
    pub published: bool,
    pub version: Option<u64>,
    pub published_at: Option<u64>,
    pub source: Option<&'static str>,
    pub routes: usize,
    pub backups: usize,
}

/// Outcome of [`DeploymentManager::recover`].
#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub published: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Orchestrates all deployment operations against a [`Registry`].
pub struct DeploymentManager {
    registry: Arc<Registry>,
    loader: Arc<dyn ApplicationLoader>,
    extractor: Arc<dyn ArchiveExtractor>,
    config: DeployConfig,
    next_version: AtomicU64,
}

impl DeploymentManager {
    pub fn new(
        registry: Arc<Registry>,
        loader: Arc<dyn ApplicationLoader>,
        extractor: Arc<dyn ArchiveExtractor>,
        config: DeployConfig,
    ) -> Self {
        Self {
            registry,
            loader,
            extractor,
            config,
            next_version: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Register a new, unpublished application.
    ///
    /// `base_dir` defaults to `<directory>/<name>`.
    pub fn create_application(
        &self,
        name: &str,
        base_dir: Option<PathBuf>,
    ) -> Result<Application, DeploymentError> {
        validate_name(name)?;
        let (_, created) = self.registry.get_or_insert(name, self.config.max_backups);
        if !created {
            return Err(DeploymentError::AlreadyExists(name.to_string()));
        }
        tracing::info!(application = %name, "Application created");
        Ok(Application::new(
            name,
            base_dir.unwrap_or_else(|| self.config.directory.join(name)),
        ))
    }

    /// Install a built application as the live version for its name.
    pub fn publish(&self, application: Application) -> Result<Arc<Application>, DeploymentError> {
        let name = application.name().to_string();
        let result = validate_name(&name).and_then(|_| {
            self.with_slot(&name, true, |slot, _| Ok(self.install(slot, application)))
        });
        self.observe("publish", &name, result)
    }

    /// Build an application from a directory or archive and publish it.
    ///
    /// Archive publishes move the previous live archive into the backup
    /// history; directory publishes record no backup.
    pub fn publish_source(
        &self,
        name: &str,
        source: DeploySource,
    ) -> Result<Arc<Application>, DeploymentError> {
        let result = validate_name(name).and_then(|_| {
            self.with_slot(name, true, |slot, state| match &source {
                DeploySource::Directory(dir) => {
                    let application = self.loader.load(name, dir)?;
                    Ok(self.install(slot, application))
                }
                DeploySource::Archive(archive) => self.publish_archive(slot, state, archive),
            })
        });
        self.observe("publish", name, result)
    }

    /// Restore the newest backup as the live version.
    ///
    /// The backup is rebuilt before the swap; on failure it stays in the history.
    pub fn rollback(&self, name: &str) -> Result<Arc<Application>, DeploymentError> {
        let result = self.with_slot(name, false, |slot, state| {
            let entry = state
                .backups
                .pop_newest()
                .ok_or_else(|| DeploymentError::NoBackup(name.to_string()))?;

            let work = self.fresh_work_dir(name);
            let application = match self.build_from_archive(name, &entry.archive, &work) {
                Ok(application) => application,
                Err(e) => {
                    remove_dir_quietly(&work);
                    state.backups.restore(entry);
                    return Err(e);
                }
            };

            let deployed = self.archive_path(name);
            if let Err(e) = fs::rename(&entry.archive, &deployed) {
                remove_dir_quietly(&work);
                state.backups.restore(entry);
                return Err(DeploymentError::io("restore backup archive", e));
            }

            tracing::info!(
                application = %name,
                backup = entry.published_at,
                remaining = state.backups.len(),
                "Rolled back to backup"
            );
            Ok(self.install(slot, application.with_source(ApplicationSource::Archive(deployed))))
        });
        self.observe("rollback", name, result)
    }

    /// Take the application offline, keeping its files and backups.
    ///
    /// Returns the version that was live, if any.
    pub fn unpublish(&self, name: &str) -> Result<Option<Arc<Application>>, DeploymentError> {
        let result = self.with_slot(name, false, |slot, _| {
            let previous = slot.clear();
            tracing::info!(
                application = %name,
                version = previous.as_ref().map_or(0, |a| a.version()),
                "Application unpublished"
            );
            Ok(previous)
        });
        self.observe("unpublish", name, result)
    }

    /// Unpublish and permanently remove an application, its files and backups.
    pub fn delete(&self, name: &str) -> Result<(), DeploymentError> {
        let result = self.with_slot(name, false, |slot, state| {
            slot.clear();

            // The live archive goes last so a failed delete can be retried or recovered
            let backup_dir = self.config.backup_directory.join(name);
            let removed = [
                self.config.work_directory.join(name),
                backup_dir.clone(),
                self.config.directory.join(name),
                self.archive_path(name),
            ]
            .iter()
            .try_for_each(|path| remove_path(path));
            if let Err(e) = removed {
                let capacity = state.backups.capacity();
                state.backups = BackupHistory::load_from_dir(name, &backup_dir, capacity)
                    .map(|(history, _)| history)
                    .unwrap_or_else(|_| BackupHistory::new(capacity));
                return Err(e);
            }

            let dropped = state.backups.clear();
            state.deleted = true;
            self.registry.remove(slot);
            tracing::info!(application = %name, backups = dropped.len(), "Application deleted");
            Ok(())
        });
        self.observe("delete", name, result)
    }

    /// Backup history for `name`, newest first.
    pub fn backups(&self, name: &str) -> Result<Vec<BackupEntry>, DeploymentError> {
        self.with_slot(name, false, |_, state| Ok(state.backups.entries().cloned().collect()))
    }

    /// Status of every registered application, sorted by name.
    ///
    /// Takes no slot lock, so it never waits on a running deployment.
    pub fn statuses(&self) -> Vec<ApplicationStatus> {
        self.registry
            .slots()
            .iter()
            .map(|slot| {
                let current = slot.current();
                ApplicationStatus {
                    name: slot.name().to_string(),
                    published: current.is_some(),
                    version: current.as_ref().map(|a| a.version()),
                    published_at: current.as_ref().map(|a| a.published_at()),
                    source: current.as_ref().map(|a| a.source().kind()),
                    routes: current.as_ref().map_or(0, |a| a.routes().path_count()),
                    backups: slot.backup_count(),
                }
            })
            .collect()
    }

    /// Republish everything found in the deploy directory and reload backup
    /// histories. Failures are reported per application, not fatal.
    pub fn recover(&self) -> Result<RecoveryReport, DeploymentError> {
        for dir in [
            &self.config.directory,
            &self.config.work_directory,
            &self.config.backup_directory,
        ] {
            fs::create_dir_all(dir)
                .map_err(|e| DeploymentError::io("create deploy directories", e))?;
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.config.directory)
            .map_err(|e| DeploymentError::io("scan deploy directory", e))?
        {
            paths.push(entry.map_err(|e| DeploymentError::io("scan deploy directory", e))?.path());
        }
        paths.sort();

        let mut report = RecoveryReport::default();
        let archives = paths.iter().filter(|p| is_archive(p));
        for archive in archives {
            let Some(name) = file_stem(archive) else { continue };
            let result = validate_name(&name).and_then(|_| self.recover_archive(&name, archive));
            record_recovery(&mut report, name, result);
        }
        for dir in paths.iter().filter(|p| p.is_dir()) {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if self.registry.current(&name).is_some() {
                continue;
            }
            let result = validate_name(&name).and_then(|_| {
                self.with_slot(&name, true, |slot, _| {
                    let application = self.loader.load(&name, dir)?;
                    Ok(self.install(slot, application))
                })
            });
            record_recovery(&mut report, name, result);
        }

        tracing::info!(
            published = report.published.len(),
            failed = report.failed.len(),
            "Deployment recovery complete"
        );
        Ok(report)
    }

    fn recover_archive(
        &self,
        name: &str,
        archive: &Path,
    ) -> Result<Arc<Application>, DeploymentError> {
        self.with_slot(name, true, |slot, state| {
            let (history, excess) = BackupHistory::load_from_dir(
                name,
                &self.config.backup_directory.join(name),
                self.config.max_backups,
            )
            .map_err(|e| DeploymentError::io("load backup history", e))?;
            for entry in excess {
                remove_file_quietly(&entry.archive);
            }
            state.backups = history;

            remove_dir_quietly(&self.config.work_directory.join(name));
            let work = self.fresh_work_dir(name);
            let application = self
                .build_from_archive(name, archive, &work)
                .inspect_err(|_| remove_dir_quietly(&work))?;
            Ok(self.install(
                slot,
                application.with_source(ApplicationSource::Archive(archive.to_path_buf())),
            ))
        })
    }

    fn publish_archive(
        &self,
        slot: &Arc<RegistrySlot>,
        state: &mut SlotState,
        archive: &Path,
    ) -> Result<Arc<Application>, DeploymentError> {
        let name = slot.name();
        let deployed = self.archive_path(name);

        let work = self.fresh_work_dir(name);
        let application = self
            .build_from_archive(name, archive, &work)
            .inspect_err(|_| remove_dir_quietly(&work))?
            .with_source(ApplicationSource::Archive(deployed.clone()));

        if is_same_file(archive, &deployed) {
            return Ok(self.install(slot, application));
        }

        let staged = match self.stage_backup(name, &deployed) {
            Ok(staged) => staged,
            Err(e) => {
                remove_dir_quietly(&work);
                return Err(e);
            }
        };

        let copied = fs::create_dir_all(&self.config.directory)
            .and_then(|_| fs::copy(archive, &deployed));
        if let Err(e) = copied {
            if let Some(entry) = &staged {
                if let Err(restore) = fs::rename(&entry.archive, &deployed) {
                    tracing::error!(application = %name, error = %restore, "Failed to restore staged archive");
                }
            }
            remove_dir_quietly(&work);
            return Err(DeploymentError::io("copy archive into deploy directory", e));
        }

        if let Some(entry) = staged {
            if let Some(evicted) = state.backups.push(entry) {
                tracing::debug!(application = %name, backup = evicted.published_at, "Backup evicted");
                remove_file_quietly(&evicted.archive);
            }
        }
        Ok(self.install(slot, application))
    }

    /// Move the live archive aside into the backup directory.
    fn stage_backup(
        &self,
        name: &str,
        deployed: &Path,
    ) -> Result<Option<BackupEntry>, DeploymentError> {
        if !deployed.is_file() {
            return Ok(None);
        }
        let dir = self.config.backup_directory.join(name);
        fs::create_dir_all(&dir).map_err(|e| DeploymentError::io("create backup directory", e))?;

        let mut stamp = now_millis();
        while dir.join(format!("{}.tar", stamp)).exists() {
            stamp += 1;
        }
        let backup = dir.join(format!("{}.tar", stamp));
        fs::rename(deployed, &backup)
            .map_err(|e| DeploymentError::io("move archive to backups", e))?;
        Ok(Some(BackupEntry {
            application: name.to_string(),
            archive: backup,
            published_at: stamp,
        }))
    }

    fn build_from_archive(
        &self,
        name: &str,
        archive: &Path,
        work: &Path,
    ) -> Result<Application, DeploymentError> {
        self.extractor.extract(archive, work)?;
        self.loader.load(name, work)
    }

    fn install(&self, slot: &RegistrySlot, application: Application) -> Arc<Application> {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let application = Arc::new(application.stamped(version, now_millis()));
        let previous = slot.install(Arc::clone(&application));
        tracing::info!(
            application = %slot.name(),
            version,
            replaced = previous.as_ref().map_or(0, |a| a.version()),
            source = application.source().kind(),
            "Application published"
        );
        application
    }

    /// Run `op` under the slot lock for `name`, retrying if the slot was
    /// deleted while waiting for the lock.
    fn with_slot<T>(
        &self,
        name: &str,
        create: bool,
        op: impl FnOnce(&Arc<RegistrySlot>, &mut SlotState) -> Result<T, DeploymentError>,
    ) -> Result<T, DeploymentError> {
        loop {
            let slot = if create {
                self.registry.get_or_insert(name, self.config.max_backups).0
            } else {
                self.registry
                    .slot(name)
                    .ok_or_else(|| DeploymentError::NotFound(name.to_string()))?
            };
            let mut state = slot.lock();
            if state.deleted {
                continue;
            }
            let result = op(&slot, &mut state);
            slot.set_backup_count(state.backups.len());
            return result;
        }
    }

    fn observe<T>(
        &self,
        operation: &'static str,
        name: &str,
        result: Result<T, DeploymentError>,
    ) -> Result<T, DeploymentError> {
        match &result {
            Ok(_) => metrics::record_deployment(operation, "success"),
            Err(e) => {
                metrics::record_deployment(operation, "failure");
                tracing::warn!(application = %name, operation, error = %e, "Deployment operation failed");
            }
        }
        result
    }

    fn archive_path(&self, name: &str) -> PathBuf {
        self.config.directory.join(format!("{}.tar", name))
    }

    fn fresh_work_dir(&self, name: &str) -> PathBuf {
        let base = self.config.work_directory.join(name);
        let mut stamp = now_millis();
        while base.join(stamp.to_string()).exists() {
            stamp += 1;
        }
        base.join(stamp.to_string())
    }
}

/// Names become path segments and directory names.
fn validate_name(name: &str) -> Result<(), DeploymentError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DeploymentError::InvalidName(name.to_string()))
    }
}

fn record_recovery(
    report: &mut RecoveryReport,
    name: String,
    result: Result<Arc<Application>, DeploymentError>,
) {
    match result {
        Ok(_) => report.published.push(name),
        Err(e) => {
            tracing::error!(application = %name, error = %e, "Failed to recover application");
            report.failed.push((name, e.to_string()));
        }
    }
}

fn is_archive(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("tar")
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn remove_path(path: &Path) -> Result<(), DeploymentError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DeploymentError::io("remove application files", e)),
    }
}

fn remove_dir_quietly(path: &Path) {
    if let Err(e) = fs::remove_dir_all(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove directory");
        }
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

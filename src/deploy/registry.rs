//! Application registry: the swap point read by the dispatcher.
//!
//! # Design Decisions
//! - The name → slot map is an `ArcSwap` snapshot; writers clone and store
//!   under a mutex, readers do a single atomic load
//! - Each slot's live version is an `ArcSwapOption`, so a publish is one
//!   pointer store and in-flight requests keep the version they loaded
//! - The slot mutex serializes deployment operations for one name only;
//!   status reads use the published backup count and never take it

use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::deploy::application::Application;
use crate::deploy::backup::BackupHistory;
use crate::routing::normalize_path;

/// Mutable per-name state guarded by the slot lock.
#[derive(Debug)]
pub struct SlotState {
    pub backups: BackupHistory,
    /// Set once the slot has been removed from the registry.
    pub deleted: bool,
}

/// One registered application name.
pub struct RegistrySlot {
    name: Arc<str>,
    current: ArcSwapOption<Application>,
    state: Mutex<SlotState>,
    backup_count: AtomicUsize,
}

impl RegistrySlot {
    fn new(name: &str, backup_capacity: usize) -> Self {
        Self {
            name: Arc::from(name),
            current: ArcSwapOption::empty(),
            state: Mutex::new(SlotState {
                backups: BackupHistory::new(backup_capacity),
                deleted: false,
            }),
            backup_count: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The live version, if published.
    pub fn current(&self) -> Option<Arc<Application>> {
        self.current.load_full()
    }

    pub fn is_published(&self) -> bool {
        self.current.load().is_some()
    }

    /// Install `application` as the live version, returning the one it replaced.
    pub(crate) fn install(&self, application: Arc<Application>) -> Option<Arc<Application>> {
        self.current.swap(Some(application))
    }

    pub(crate) fn clear(&self) -> Option<Arc<Application>> {
        self.current.swap(None)
    }

    /// Backup history length as of the last completed operation.
    pub fn backup_count(&self) -> usize {
        self.backup_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_backup_count(&self, count: usize) {
        self.backup_count.store(count, Ordering::Release);
    }

    /// Acquire the per-name operation lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps application names to their live versions.
pub struct Registry {
    slots: ArcSwap<HashMap<String, Arc<RegistrySlot>>>,
    writer: Mutex<()>,
    default_application: String,
}

impl Registry {
    pub fn new(default_application: impl Into<String>) -> Self {
        Self {
            slots: ArcSwap::from_pointee(HashMap::new()),
            writer: Mutex::new(()),
            default_application: default_application.into(),
        }
    }

    pub fn default_application(&self) -> &str {
        &self.default_application
    }

    pub fn slot(&self, name: &str) -> Option<Arc<RegistrySlot>> {
        self.slots.load().get(name).cloned()
    }

    /// Get the slot for `name`, creating it if absent. The flag is true if created.
    pub(crate) fn get_or_insert(
        &self,
        name: &str,
        backup_capacity: usize,
    ) -> (Arc<RegistrySlot>, bool) {
        if let Some(slot) = self.slot(name) {
            return (slot, false);
        }
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.slots.load_full();
        if let Some(slot) = snapshot.get(name) {
            return (Arc::clone(slot), false);
        }
        let slot = Arc::new(RegistrySlot::new(name, backup_capacity));
        let mut next = HashMap::clone(&snapshot);
        next.insert(name.to_string(), Arc::clone(&slot));
        self.slots.store(Arc::new(next));
        (slot, true)
    }

    /// Remove `slot` if it is still the one registered under its name.
    pub(crate) fn remove(&self, slot: &Arc<RegistrySlot>) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.slots.load_full();
        if snapshot
            .get(slot.name())
            .is_some_and(|registered| Arc::ptr_eq(registered, slot))
        {
            let mut next = HashMap::clone(&snapshot);
            next.remove(slot.name());
            self.slots.store(Arc::new(next));
        }
    }

    /// Live version of `name`.
    pub fn current(&self, name: &str) -> Option<Arc<Application>> {
        self.slots.load().get(name).and_then(|slot| slot.current())
    }

    /// Map a request path to the application serving it and the
    /// application-relative path.
    ///
    /// The first path segment names the application; requests for unknown or
    /// unpublished names go to the default application with the full path.
    pub fn lookup(&self, path: &str) -> Option<(Arc<Application>, String)> {
        let slots = self.slots.load();
        let trimmed = path.trim_start_matches('/');
        let (first, rest) = match trimmed.find('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
            None => (trimmed, "/"),
        };
        if !first.is_empty() {
            if let Some(application) = slots.get(first).and_then(|slot| slot.current()) {
                return Some((application, normalize_path(rest)));
            }
        }
        slots
            .get(&self.default_application)
            .and_then(|slot| slot.current())
            .map(|application| (application, normalize_path(path)))
    }

    /// All registered slots, sorted by name.
    pub fn slots(&self) -> Vec<Arc<RegistrySlot>> {
        let mut slots: Vec<_> = self.slots.load().values().cloned().collect();
        slots.sort_by(|a, b| a.name().cmp(b.name()));
        slots
    }

    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.load().is_empty()
    }
}

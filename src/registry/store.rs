//! Resource registry implementation
//!
//! The process-wide table that reference-counts open drivers by label.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::error::{MediaError, Result};

use super::driver::Driver;
use super::entry::{ReleaseOutcome, ResourceEntry};

static GLOBAL: OnceLock<Arc<ResourceRegistry>> = OnceLock::new();

/// Reference-counted table of open drivers
///
/// Acquire and release are O(1) amortized and fully serialized.
pub struct ResourceRegistry {
    refs: Mutex<HashMap<String, ResourceEntry>>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            refs: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry used by sources unless told otherwise
    pub fn global() -> Arc<ResourceRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ResourceRegistry::new())))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ResourceEntry>> {
        self.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a reference to the resource under `label`
    ///
    /// `opener` only runs when this is the first reference. If it fails, the
    /// error is returned and no entry is created.
    pub fn acquire<F>(&self, label: &str, opener: F) -> Result<Arc<dyn Driver>>
    where
        F: FnOnce() -> Result<Arc<dyn Driver>>,
    {
        let mut refs = self.lock();

        if let Some(entry) = refs.get_mut(label) {
            entry.count += 1;
            tracing::debug!(label = %label, count = entry.count, "Resource referenced");
            return Ok(Arc::clone(&entry.driver));
        }

        let driver = opener()?;
        refs.insert(label.to_string(), ResourceEntry::new(Arc::clone(&driver)));

        tracing::info!(label = %label, "Resource opened");

        Ok(driver)
    }

    /// Take a reference to `driver`, opening it if nobody holds its label yet
    pub fn acquire_driver(&self, driver: Arc<dyn Driver>) -> Result<Arc<dyn Driver>> {
        let label = driver.label().to_string();
        self.acquire(&label, || {
            driver
                .open()
                .map_err(|e| MediaError::driver(driver.label(), e))?;
            Ok(driver)
        })
    }

    /// Drop one reference to the resource under `label`
    ///
    /// Closes and removes the entry when the count reaches zero. A close
    /// failure is returned as an error, but the entry is removed regardless.
    pub fn release(&self, label: &str) -> Result<ReleaseOutcome> {
        let mut refs = self.lock();

        let entry = refs
            .get_mut(label)
            .ok_or_else(|| MediaError::UnknownResource(label.to_string()))?;

        entry.count -= 1;
        if entry.count > 0 {
            tracing::debug!(label = %label, count = entry.count, "Resource still in use");
            return Ok(ReleaseOutcome::InUse(entry.count));
        }

        let entry = refs
            .remove(label)
            .ok_or_else(|| MediaError::UnknownResource(label.to_string()))?;

        entry
            .driver
            .close()
            .map_err(|e| MediaError::driver(label, e))?;

        tracing::info!(
            label = %label,
            open_secs = entry.opened_at.elapsed().as_secs(),
            "Resource closed"
        );

        Ok(ReleaseOutcome::Released)
    }

    /// Current reference count for `label` (0 if not open)
    pub fn ref_count(&self, label: &str) -> usize {
        self.lock().get(label).map(|e| e.count()).unwrap_or(0)
    }

    /// Whether a resource is open under `label`
    pub fn contains(&self, label: &str) -> bool {
        self.lock().contains_key(label)
    }

    /// Number of open resources
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no resources are open
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

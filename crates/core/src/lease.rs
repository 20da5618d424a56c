use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::error::DispatchError;

/// Something on the engine's side that two operations must not mutate at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resource {
    /// The engine's shadow directory, shared by every freeze.
    Shadow,
    Backup { kind: String, name: String },
}

impl Resource {
    pub fn backup(kind: &str, name: &str) -> Self {
        Resource::Backup {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Shadow => write!(f, "shadow directory"),
            Resource::Backup { kind, name } if kind.is_empty() => write!(f, "backup '{name}'"),
            Resource::Backup { kind, name } => write!(f, "backup '{kind}/{name}'"),
        }
    }
}

/// In-process table of held resources. Acquisition never waits: a conflict
/// fails the caller immediately.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    held: Arc<Mutex<HashSet<Resource>>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims every resource or none of them.
    pub fn acquire(
        &self,
        resources: impl IntoIterator<Item = Resource>,
    ) -> Result<LeaseGuard, DispatchError> {
        let mut wanted: Vec<Resource> = Vec::new();
        for resource in resources {
            if !wanted.contains(&resource) {
                wanted.push(resource);
            }
        }

        let mut held = lock(&self.held);
        if let Some(busy) = wanted.iter().find(|r| held.contains(*r)) {
            return Err(DispatchError::Busy(busy.to_string()));
        }
        for resource in &wanted {
            held.insert(resource.clone());
        }
        drop(held);

        if !wanted.is_empty() {
            debug!(resources = ?wanted, "leases acquired");
        }
        Ok(LeaseGuard {
            held: Arc::clone(&self.held),
            resources: wanted,
        })
    }

    pub fn is_held(&self, resource: &Resource) -> bool {
        lock(&self.held).contains(resource)
    }
}

/// Releases its resources when dropped.
#[derive(Debug)]
pub struct LeaseGuard {
    held: Arc<Mutex<HashSet<Resource>>>,
    resources: Vec<Resource>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        let mut held = lock(&self.held);
        for resource in &self.resources {
            held.remove(resource);
        }
    }
}

fn lock(held: &Mutex<HashSet<Resource>>) -> MutexGuard<'_, HashSet<Resource>> {
    // The set stays consistent even if a holder panicked mid-operation.
    held.lock().unwrap_or_else(PoisonError::into_inner)
}

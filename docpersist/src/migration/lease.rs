use crate::errors::{ErrorKind, PersistError, PersistResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Tracks which collections have a migration running in this process.
#[derive(Clone, Default)]
pub(crate) struct MigrationLeases {
    active: Arc<DashMap<String, String>>,
}

impl MigrationLeases {
    pub(crate) fn new() -> Self {
        MigrationLeases::default()
    }

    /// Claims `collection` for the run `run_id`.
    ///
    /// Fails with [`ErrorKind::MigrationInProgress`] while another run holds it.
    pub(crate) fn acquire(&self, collection: &str, run_id: &str) -> PersistResult<MigrationLease> {
        match self.active.entry(collection.to_string()) {
            Entry::Occupied(holder) => {
                log::error!(
                    "Migration of collection {} is already running as {}",
                    collection,
                    holder.get()
                );
                Err(PersistError::new(
                    &format!(
                        "Migration of collection {} is already running as {}",
                        collection,
                        holder.get()
                    ),
                    ErrorKind::MigrationInProgress,
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(run_id.to_string());
                Ok(MigrationLease {
                    active: self.active.clone(),
                    collection: collection.to_string(),
                    run_id: run_id.to_string(),
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn holder(&self, collection: &str) -> Option<String> {
        self.active.get(collection).map(|holder| holder.value().clone())
    }
}

/// A claim on a collection, released when dropped.
pub(crate) struct MigrationLease {
    active: Arc<DashMap<String, String>>,
    collection: String,
    run_id: String,
}

impl Drop for MigrationLease {
    fn drop(&mut self) {
        self.active
            .remove_if(&self.collection, |_, holder| *holder == self.run_id);
        log::debug!("Released migration lease on {} held by {}", self.collection, self.run_id);
    }
}

use super::{Repository, RepositoryConfig};
use crate::errors::{PersistError, PersistResult};
use crate::migration::DecodeOptions;
use crate::store::StoreDriver;
use std::sync::Arc;
use std::time::Duration;

/// Fluent builder for a [`Repository`].
///
/// The first invalid setting is remembered and reported by
/// [`build`](Self::build); later settings are ignored once one failed.
///
/// # Examples
///
/// ```rust
/// use docpersist::repository::RepositoryBuilder;
/// use docpersist::store::memory::InMemoryStore;
/// use std::sync::Arc;
///
/// let repository = RepositoryBuilder::new(Arc::new(InMemoryStore::new()))
///     .schema_version("2.0")
///     .build()
///     .unwrap();
/// assert_eq!(repository.config().schema_version(), "2.0");
///
/// let invalid = RepositoryBuilder::new(Arc::new(InMemoryStore::new()))
///     .schema_tag_field("_id")
///     .build();
/// assert!(invalid.is_err());
/// ```
pub struct RepositoryBuilder {
    error: Option<PersistError>,
    driver: Arc<dyn StoreDriver>,
    config: RepositoryConfig,
}

impl RepositoryBuilder {
    pub fn new(driver: Arc<dyn StoreDriver>) -> Self {
        RepositoryBuilder {
            error: None,
            driver,
            config: RepositoryConfig::new(),
        }
    }

    pub fn schema_tag_field(mut self, field: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_schema_tag_field(field) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn schema_version(mut self, version: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_schema_version(version) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn creation_time_field(mut self, field: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_creation_time_field(field) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn decode_options(mut self, options: DecodeOptions) -> Self {
        self.config.set_decode_options(options);
        self
    }

    pub fn migration_step_timeout(mut self, timeout: Duration) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_migration_step_timeout(timeout) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn build(self) -> PersistResult<Repository> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Repository::new(self.driver, self.config))
    }
}

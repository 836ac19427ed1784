use crate::common::{DOC_CREATION_TS, DOC_ID, DOC_SCHEMA};
use crate::errors::{ErrorKind, PersistError, PersistResult};
use crate::migration::DecodeOptions;
use std::time::Duration;

/// Schema version stamped when none is configured.
pub const INITIAL_SCHEMA_VERSION: &str = "1.0";

/// Settings of a [`Repository`](super::Repository).
///
/// Built through [`RepositoryBuilder`](super::RepositoryBuilder), which
/// validates every value as it is set.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    schema_tag_field: String,
    schema_version: String,
    creation_time_field: String,
    decode_options: DecodeOptions,
    migration_step_timeout: Option<Duration>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            schema_tag_field: DOC_SCHEMA.to_string(),
            schema_version: INITIAL_SCHEMA_VERSION.to_string(),
            creation_time_field: DOC_CREATION_TS.to_string(),
            decode_options: DecodeOptions::default(),
            migration_step_timeout: None,
        }
    }
}

impl RepositoryConfig {
    pub fn new() -> Self {
        RepositoryConfig::default()
    }

    /// Name of the reserved field holding a document's schema version.
    pub fn schema_tag_field(&self) -> &str {
        &self.schema_tag_field
    }

    /// Version stamped on every document this repository writes.
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Name of the creation metadata field, never touched by updates.
    pub fn creation_time_field(&self) -> &str {
        &self.creation_time_field
    }

    /// Decode flags used by migrations whose model does not set its own.
    pub fn decode_options(&self) -> &DecodeOptions {
        &self.decode_options
    }

    pub fn migration_step_timeout(&self) -> Option<Duration> {
        self.migration_step_timeout
    }

    pub(crate) fn set_schema_tag_field(&mut self, field: &str) -> PersistResult<()> {
        let field = field.trim();
        if field.is_empty() {
            log::error!("Schema tag field cannot be empty");
            return Err(PersistError::new(
                "Schema tag field cannot be empty",
                ErrorKind::ConfigError,
            ));
        }
        if field == DOC_ID {
            log::error!("Schema tag field cannot be the identifier field");
            return Err(PersistError::new(
                "Schema tag field cannot be the identifier field",
                ErrorKind::ConfigError,
            ));
        }
        if field == self.creation_time_field {
            log::error!("Schema tag field cannot be the creation time field");
            return Err(PersistError::new(
                "Schema tag field cannot be the creation time field",
                ErrorKind::ConfigError,
            ));
        }
        self.schema_tag_field = field.to_string();
        Ok(())
    }

    pub(crate) fn set_schema_version(&mut self, version: &str) -> PersistResult<()> {
        let version = version.trim();
        if version.is_empty() {
            log::error!("Schema version cannot be empty");
            return Err(PersistError::new(
                "Schema version cannot be empty",
                ErrorKind::ConfigError,
            ));
        }
        self.schema_version = version.to_string();
        Ok(())
    }

    pub(crate) fn set_creation_time_field(&mut self, field: &str) -> PersistResult<()> {
        let field = field.trim();
        if field.is_empty() {
            log::error!("Creation time field cannot be empty");
            return Err(PersistError::new(
                "Creation time field cannot be empty",
                ErrorKind::ConfigError,
            ));
        }
        if field == DOC_ID || field == self.schema_tag_field {
            log::error!("Creation time field cannot be a reserved field");
            return Err(PersistError::new(
                "Creation time field cannot be a reserved field",
                ErrorKind::ConfigError,
            ));
        }
        self.creation_time_field = field.to_string();
        Ok(())
    }

    pub(crate) fn set_decode_options(&mut self, options: DecodeOptions) {
        self.decode_options = options;
    }

    pub(crate) fn set_migration_step_timeout(&mut self, timeout: Duration) -> PersistResult<()> {
        if timeout.is_zero() {
            log::error!("Migration step timeout must be positive");
            return Err(PersistError::new(
                "Migration step timeout must be positive",
                ErrorKind::ConfigError,
            ));
        }
        self.migration_step_timeout = Some(timeout);
        Ok(())
    }
}

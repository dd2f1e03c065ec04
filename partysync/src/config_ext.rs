//! Extension de partyconfig pour la synchronisation de party

use std::path::PathBuf;

use tracing::Level;

use crate::coordinator::CoordinatorSettings;
use crate::errors::{Result, SyncError};
use crate::logs::{string_to_level, LoggingOptions};
use crate::model::UserId;

/// Trait d'extension pour partyconfig::Config
pub trait PartySyncConfigExt {
    /// Directory of the persisted party record, created when missing
    fn party_store_dir(&self) -> Result<PathBuf>;

    /// Site matching and local identity for the coordinator
    fn coordinator_settings(&self) -> Result<CoordinatorSettings>;

    fn logging_options(&self) -> LoggingOptions;
}

impl PartySyncConfigExt for partyconfig::Config {
    fn party_store_dir(&self) -> Result<PathBuf> {
        let dir = self
            .get_managed_dir(&["party", "store", "directory"], "party")
            .map_err(|e| SyncError::store(e.to_string()))?;
        Ok(PathBuf::from(dir))
    }

    fn coordinator_settings(&self) -> Result<CoordinatorSettings> {
        let user_id = self
            .get_user_id()
            .map_err(|e| SyncError::store(format!("cannot read local user id: {e}")))?;
        Ok(CoordinatorSettings {
            site_host_fragment: self.get_site_host_fragment(),
            user_id: UserId::new(user_id),
        })
    }

    fn logging_options(&self) -> LoggingOptions {
        let defaults = LoggingOptions::default();
        LoggingOptions {
            buffer_capacity: self.get_log_cache_size().unwrap_or(defaults.buffer_capacity),
            enable_console: self.get_log_enable_console().unwrap_or(defaults.enable_console),
            min_level: self
                .get_log_min_level()
                .ok()
                .and_then(|level| string_to_level(&level))
                .unwrap_or(Level::INFO),
        }
    }
}

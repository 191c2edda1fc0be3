//! Shared, lock-guarded access to configuration and state.
//!
//! Both monitoring loops and the dispatcher go through this type. Each store
//! sits behind its own mutex, so at most one writer touches a given file at a
//! time. Poisoned locks are recovered rather than propagated.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::{ConfigStore, FailsafeConfig, RuleId};
use crate::error::Result;
use crate::state::{Activation, FailsafeState, StateStore};
use crate::storage::StoragePaths;

pub struct FailsafeContext {
    paths: StoragePaths,
    config: Mutex<ConfigStore>,
    state: Mutex<StateStore>,
}

impl FailsafeContext {
    /// Loads configuration and state for `paths`.
    ///
    /// State is kept in memory only when `general.persistence_enabled` is off.
    pub fn open(paths: StoragePaths) -> Self {
        let config = ConfigStore::load(&paths.config_file());
        let state = if config.config().general.persistence_enabled {
            StateStore::load(&paths.state_file())
        } else {
            tracing::info!("State persistence disabled; activations kept in memory");
            StateStore::new_in_memory()
        };
        Self::with_stores(paths, config, state)
    }

    pub fn with_stores(paths: StoragePaths, config: ConfigStore, state: StateStore) -> Self {
        Self {
            paths,
            config: Mutex::new(config),
            state: Mutex::new(state),
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    fn config_store(&self) -> MutexGuard<'_, ConfigStore> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_store(&self) -> MutexGuard<'_, StateStore> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the typed configuration.
    pub fn config(&self) -> FailsafeConfig {
        self.config_store().config().clone()
    }

    /// Snapshot of the persisted state.
    pub fn state(&self) -> FailsafeState {
        self.state_store().state().clone()
    }

    pub fn last_initialization(&self) -> Option<DateTime<Utc>> {
        self.state_store().state().last_initialization
    }

    pub fn update_setting(&self, path: &str, value: Value) -> Result<()> {
        self.config_store().update(path, value)
    }

    pub fn disable_rule(&self, rule: RuleId) -> Result<()> {
        tracing::info!(rule = %rule, "Disabling rule");
        self.config_store().disable_rule(rule)
    }

    pub fn record_activation(&self, activation: Activation) -> Result<()> {
        self.state_store().record_activation(activation)
    }

    pub fn mark_initialized(&self, at: DateTime<Utc>) -> Result<()> {
        self.state_store().mark_initialized(at)
    }

    pub fn mark_completion_check(&self, at: DateTime<Utc>) -> Result<()> {
        self.state_store().mark_completion_check(at)
    }
}

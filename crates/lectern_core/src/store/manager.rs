//! Registry of named dataset controllers.
//!
//! # Responsibility
//! - Create at most one controller per dataset name.
//! - Track which dataset is active and switch between them.
//!
//! # Invariants
//! - Create-or-fetch happens under one lock before any async work.
//! - Switching closes the previous active dataset before opening the next;
//!   a failed open leaves no active dataset.
//! - Switches are serialized; overlapping switches never leave an untracked
//!   dataset open.

use super::error::{StoreError, StoreResult};
use super::lifecycle::{DatasetStore, LifecyclePhase};
use crate::config::{is_valid_dataset_name, ConfigError, StoreConfig};
use crate::provision::{AssetBundle, ProvisionError};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

pub struct DatasetManager {
    config: StoreConfig,
    bundle: Arc<dyn AssetBundle>,
    datasets: Mutex<HashMap<String, Arc<DatasetStore>>>,
    active: Mutex<Option<String>>,
    /// Held across the close-then-open of a switch and by `close_all`.
    switching: AsyncMutex<()>,
}

impl DatasetManager {
    pub fn new(config: StoreConfig, bundle: Arc<dyn AssetBundle>) -> Self {
        Self {
            config,
            bundle,
            datasets: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            switching: AsyncMutex::new(()),
        }
    }

    /// Builds a manager over the directory bundle described by `config`.
    pub fn from_config(config: StoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bundle = config
            .directory_bundle()
            .ok_or_else(|| ConfigError::Invalid("missing [bundle] section".to_string()))?;
        Ok(Self::new(config, Arc::new(bundle)))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Dataset names the bundle can provision, sorted.
    pub fn available_datasets(&self) -> Vec<String> {
        self.bundle.names()
    }

    /// Names of datasets currently in `Ready` state, sorted.
    pub fn open_datasets(&self) -> Vec<String> {
        let mut names = self
            .lock_datasets()
            .iter()
            .filter(|(_, store)| store.phase() == LifecyclePhase::Ready)
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Returns the controller for `name`, creating it on first reference.
    ///
    /// Does not open the dataset and does not touch the active selection,
    /// so callers can prefetch a dataset next to the active one.
    pub fn dataset(&self, name: &str) -> StoreResult<Arc<DatasetStore>> {
        if !is_valid_dataset_name(name) {
            return Err(StoreError::InvalidDatasetName(name.to_string()));
        }
        if !self.bundle.contains(name) {
            return Err(StoreError::Provision(ProvisionError::UnknownDataset(
                name.to_string(),
            )));
        }

        let mut datasets = self.lock_datasets();
        let store = datasets.entry(name.to_string()).or_insert_with(|| {
            Arc::new(DatasetStore::new(
                name,
                &self.config,
                Arc::clone(&self.bundle),
            ))
        });
        Ok(Arc::clone(store))
    }

    pub fn active_name(&self) -> Option<String> {
        self.lock_active().clone()
    }

    pub fn active(&self) -> StoreResult<Arc<DatasetStore>> {
        let name = self.active_name().ok_or(StoreError::NoActiveDataset)?;
        self.dataset(&name)
    }

    /// Active dataset, falling back to switching to `default_dataset` when
    /// nothing is active yet.
    pub async fn active_or_default(&self) -> StoreResult<Arc<DatasetStore>> {
        match self.active() {
            Err(StoreError::NoActiveDataset) => match self.config.default_dataset.clone() {
                Some(name) => self.switch_active(&name).await,
                None => Err(StoreError::NoActiveDataset),
            },
            other => other,
        }
    }

    /// Makes `name` the active dataset.
    ///
    /// Not atomic: the previous dataset is closed first, so when the new one
    /// fails to open there is no active dataset until the next switch.
    pub async fn switch_active(&self, name: &str) -> StoreResult<Arc<DatasetStore>> {
        let target = self.dataset(name)?;
        let _switching = self.switching.lock().await;
        let previous = {
            let active = self.lock_active();
            if active.as_deref() == Some(name) {
                return Ok(target);
            }
            active.clone()
        };

        if let Some(previous) = previous {
            let store = self.lock_datasets().get(&previous).cloned();
            if let Some(store) = store {
                store.close().await?;
            }
            *self.lock_active() = None;
        }

        match target.init().await {
            Ok(()) => {
                *self.lock_active() = Some(name.to_string());
                info!("event=dataset_switch module=store status=ok dataset={name}");
                Ok(target)
            }
            Err(err) => {
                warn!(
                    "event=dataset_switch module=store status=error dataset={} error={}",
                    name, err
                );
                Err(err)
            }
        }
    }

    /// Closes every controller and clears the active selection.
    pub async fn close_all(&self) -> StoreResult<()> {
        let _switching = self.switching.lock().await;
        let stores = self.lock_datasets().values().cloned().collect::<Vec<_>>();
        *self.lock_active() = None;
        for store in stores {
            store.close().await?;
        }
        Ok(())
    }

    fn lock_datasets(&self) -> MutexGuard<'_, HashMap<String, Arc<DatasetStore>>> {
        self.datasets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;
use crate::models::Params;
use crate::traits::{Alerter, Collector, Detector, Storage};

/// The role a plugin plays in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginRole {
    Collector,
    Storage,
    Detector,
    Alerter,
}

impl PluginRole {
    pub const ALL: [PluginRole; 4] = [
        PluginRole::Collector,
        PluginRole::Storage,
        PluginRole::Detector,
        PluginRole::Alerter,
    ];
}

impl fmt::Display for PluginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginRole::Collector => "collector",
            PluginRole::Storage => "storage",
            PluginRole::Detector => "detector",
            PluginRole::Alerter => "alerter",
        };
        f.write_str(s)
    }
}

pub type CollectorFactory =
    Arc<dyn Fn(&Params) -> Result<Box<dyn Collector>, PluginError> + Send + Sync>;
pub type StorageFactory =
    Arc<dyn Fn(&Params) -> Result<Box<dyn Storage>, PluginError> + Send + Sync>;
pub type DetectorFactory = Arc<
    dyn Fn(Option<Arc<dyn Storage>>, &Params) -> Result<Box<dyn Detector>, PluginError>
        + Send
        + Sync,
>;
pub type AlerterFactory =
    Arc<dyn Fn(&Params) -> Result<Box<dyn Alerter>, PluginError> + Send + Sync>;

/// Maps plugin type keys to factories, per role.
///
/// The registry is an explicit value handed to the orchestrator; state a
/// factory captures (shared stores, cooldown ledgers) lives as long as the
/// registry does.
pub struct PluginRegistry {
    collectors: HashMap<String, CollectorFactory>,
    storages: HashMap<String, StorageFactory>,
    detectors: HashMap<String, DetectorFactory>,
    alerters: HashMap<String, AlerterFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            collectors: HashMap::new(),
            storages: HashMap::new(),
            detectors: HashMap::new(),
            alerters: HashMap::new(),
        }
    }

    /// Register a collector factory. Returns error if the key is taken.
    pub fn register_collector<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&Params) -> Result<Box<dyn Collector>, PluginError> + Send + Sync + 'static,
    {
        insert_unique(&mut self.collectors, PluginRole::Collector, kind.into(), Arc::new(factory))
    }

    pub fn register_storage<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&Params) -> Result<Box<dyn Storage>, PluginError> + Send + Sync + 'static,
    {
        insert_unique(&mut self.storages, PluginRole::Storage, kind.into(), Arc::new(factory))
    }

    pub fn register_detector<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(Option<Arc<dyn Storage>>, &Params) -> Result<Box<dyn Detector>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        insert_unique(&mut self.detectors, PluginRole::Detector, kind.into(), Arc::new(factory))
    }

    pub fn register_alerter<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&Params) -> Result<Box<dyn Alerter>, PluginError> + Send + Sync + 'static,
    {
        insert_unique(&mut self.alerters, PluginRole::Alerter, kind.into(), Arc::new(factory))
    }

    pub fn create_collector(&self, kind: &str, params: &Params) -> Result<Box<dyn Collector>, PluginError> {
        let factory = lookup(&self.collectors, PluginRole::Collector, kind)?;
        factory(params)
    }

    /// Storages are shared between the persist stage and every detector.
    pub fn create_storage(&self, kind: &str, params: &Params) -> Result<Arc<dyn Storage>, PluginError> {
        let factory = lookup(&self.storages, PluginRole::Storage, kind)?;
        factory(params).map(Arc::from)
    }

    pub fn create_detector(
        &self,
        kind: &str,
        storage: Option<Arc<dyn Storage>>,
        params: &Params,
    ) -> Result<Box<dyn Detector>, PluginError> {
        let factory = lookup(&self.detectors, PluginRole::Detector, kind)?;
        factory(storage, params)
    }

    pub fn create_alerter(&self, kind: &str, params: &Params) -> Result<Box<dyn Alerter>, PluginError> {
        let factory = lookup(&self.alerters, PluginRole::Alerter, kind)?;
        factory(params)
    }

    /// Whether a factory is registered for `kind` under `role`.
    pub fn contains(&self, role: PluginRole, kind: &str) -> bool {
        match role {
            PluginRole::Collector => self.collectors.contains_key(kind),
            PluginRole::Storage => self.storages.contains_key(kind),
            PluginRole::Detector => self.detectors.contains_key(kind),
            PluginRole::Alerter => self.alerters.contains_key(kind),
        }
    }

    /// Registered type keys for a role, sorted.
    pub fn kinds(&self, role: PluginRole) -> Vec<&str> {
        let mut kinds: Vec<&str> = match role {
            PluginRole::Collector => self.collectors.keys().map(String::as_str).collect(),
            PluginRole::Storage => self.storages.keys().map(String::as_str).collect(),
            PluginRole::Detector => self.detectors.keys().map(String::as_str).collect(),
            PluginRole::Alerter => self.alerters.keys().map(String::as_str).collect(),
        };
        kinds.sort_unstable();
        kinds
    }

    /// Total number of registered factories across all roles.
    pub fn len(&self) -> usize {
        self.collectors.len() + self.storages.len() + self.detectors.len() + self.alerters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_unique<F>(
    map: &mut HashMap<String, F>,
    role: PluginRole,
    kind: String,
    factory: F,
) -> Result<(), RegistryError> {
    if map.contains_key(&kind) {
        return Err(RegistryError::Duplicate { role, kind });
    }
    map.insert(kind, factory);
    Ok(())
}

fn lookup<'a, F>(map: &'a HashMap<String, F>, role: PluginRole, kind: &str) -> Result<&'a F, PluginError> {
    map.get(kind).ok_or_else(|| PluginError::UnknownPlugin {
        role,
        kind: kind.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{role} '{kind}' is already registered")]
    Duplicate { role: PluginRole, kind: String },
}

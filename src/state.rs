//! Shared application state for all routes. Resources may be added or have
//! routes overridden while the server runs.

use crate::error::{AppError, ConfigError};
use crate::resource::{Resource, ResourceSet};
use crate::store::DataAccess;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub data: Arc<dyn DataAccess>,
    pub resources: Arc<RwLock<ResourceSet>>,
}

impl AppState {
    pub fn new(data: Arc<dyn DataAccess>, resources: ResourceSet) -> Self {
        AppState {
            data,
            resources: Arc::new(RwLock::new(resources)),
        }
    }

    pub fn resource(&self, name: &str) -> Result<Arc<Resource>, AppError> {
        let set = self.resources.read().unwrap_or_else(|e| e.into_inner());
        set.get(name)
            .ok_or_else(|| AppError::NotFound(format!("resource '{}'", name)))
    }

    /// Snapshot of every registered resource.
    pub fn all_resources(&self) -> Vec<Arc<Resource>> {
        let set = self.resources.read().unwrap_or_else(|e| e.into_inner());
        set.iter().cloned().collect()
    }

    /// Routes of a resource added here are served by routers built afterwards.
    pub fn add_resource(&self, resource: Resource) -> Result<Arc<Resource>, ConfigError> {
        let mut set = self.resources.write().unwrap_or_else(|e| e.into_inner());
        set.insert(resource)
    }
}

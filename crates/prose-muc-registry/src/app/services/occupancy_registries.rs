// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::occupancy::services::OccupantRegistry;
use crate::domain::shared::models::ServiceName;

#[derive(Default)]
/// The occupant registries of every MUC service hosted by this server, keyed
/// by service name so that replicated tasks can be routed to the right one.
pub struct OccupancyRegistries {
    registries: RwLock<HashMap<ServiceName, Arc<OccupantRegistry>>>,
}

impl OccupancyRegistries {
    pub fn new() -> Self {
        OccupancyRegistries::default()
    }

    /// Adds `registry` under its service name, returning the registry that
    /// was registered under that name before, if any.
    pub fn register(&self, registry: Arc<OccupantRegistry>) -> Option<Arc<OccupantRegistry>> {
        self.registries
            .write()
            .insert(registry.service_name().clone(), registry)
    }

    pub fn deregister(&self, service: &ServiceName) -> Option<Arc<OccupantRegistry>> {
        self.registries.write().remove(service)
    }

    pub fn get(&self, service: &ServiceName) -> Option<Arc<OccupantRegistry>> {
        self.registries.read().get(service).cloned()
    }

    pub fn all(&self) -> Vec<Arc<OccupantRegistry>> {
        self.registries.read().values().cloned().collect()
    }
}

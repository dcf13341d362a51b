// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::app::services::OccupancyRegistries;
use crate::domain::occupancy::models::{ClusterTask, Occupant};
use crate::domain::occupancy::services::ClusterService;
use crate::domain::shared::models::{NodeId, ServiceName};

#[derive(Debug, Clone, PartialEq)]
/// Membership changes and replicated tasks as delivered by the cluster layer.
pub enum ClusterEvent {
    TaskReceived { task: ClusterTask },
    NodeJoined { node: NodeId },
    NodeLeft { node: NodeId },
    LocalNodeJoined,
    LocalNodeDetached,
}

#[cfg_attr(feature = "test", mockall::automock)]
/// Consumes the sets of occupants that became unreachable after a topology
/// change, typically to synthesize the matching "has left" presence for the
/// users connected to this node.
pub trait RegistryDelegate: Send + Sync {
    fn occupants_lost(&self, service: &ServiceName, occupants: HashSet<Occupant>);
}

/// Routes cluster traffic to the occupant registries of this server: inbound
/// tasks to the registry of the service they name, membership changes to
/// every registry.
pub struct ClusterEventHandler {
    registries: Arc<OccupancyRegistries>,
    cluster: Arc<dyn ClusterService>,
    delegate: Arc<dyn RegistryDelegate>,
}

impl ClusterEventHandler {
    pub fn new(
        registries: Arc<OccupancyRegistries>,
        cluster: Arc<dyn ClusterService>,
        delegate: Arc<dyn RegistryDelegate>,
    ) -> Self {
        ClusterEventHandler {
            registries,
            cluster,
            delegate,
        }
    }

    pub async fn handle_event(&self, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::TaskReceived { task } => {
                let Some(registry) = self.registries.get(task.service()) else {
                    warn!(
                        service = %task.service(), node = %task.origin(),
                        "Dropping a cluster task for an unknown MUC service"
                    );
                    return Ok(());
                };
                registry.apply(&task);
            }

            ClusterEvent::NodeJoined { node } => {
                debug!(node = %node, "Sending our local occupants to the node that joined the cluster");
                self.sync_local_occupants().await;
            }

            ClusterEvent::LocalNodeJoined => {
                debug!("Sending our local occupants to the cluster we joined");
                self.sync_local_occupants().await;
            }

            ClusterEvent::NodeLeft { node } => {
                for registry in self.registries.all() {
                    let lost = registry.node_left(&node);
                    if lost.is_empty() {
                        continue;
                    }
                    debug!(
                        service = %registry.service_name(), node = %node,
                        "Occupants gone with the node that left the cluster: {}",
                        lost.iter().join(", ")
                    );
                    self.delegate.occupants_lost(registry.service_name(), lost);
                }
            }

            ClusterEvent::LocalNodeDetached => {
                for registry in self.registries.all() {
                    let lost = registry.local_node_detached();
                    if lost.is_empty() {
                        continue;
                    }
                    self.delegate.occupants_lost(registry.service_name(), lost);
                }
            }
        }

        Ok(())
    }

    async fn sync_local_occupants(&self) {
        for registry in self.registries.all() {
            let task = registry.local_occupants_sync_task();
            if let Err(error) = self.cluster.dispatch_task(task).await {
                warn!(
                    service = %registry.service_name(), %error,
                    "Failed to send our local occupants to the other cluster nodes"
                );
            }
        }
    }
}

// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use async_trait::async_trait;

use crate::domain::occupancy::models::ClusterTask;
use crate::domain::shared::models::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("The local node is not part of a cluster.")]
    NotClustered,
    #[error("Failed to dispatch cluster task: {0}")]
    DispatchFailed(String),
}

#[async_trait]
#[cfg_attr(feature = "test", mockall::automock)]
pub trait ClusterService: Send + Sync {
    /// The identifier the cluster layer assigned to this node.
    fn local_node_id(&self) -> NodeId;

    /// Sends `task` to every other cluster node and returns once each
    /// reachable node has applied it.
    async fn dispatch_task_sync(&self, task: ClusterTask) -> Result<(), ClusterError>;

    /// Enqueues `task` for delivery to every other cluster node and returns
    /// immediately.
    async fn dispatch_task(&self, task: ClusterTask) -> Result<(), ClusterError>;
}

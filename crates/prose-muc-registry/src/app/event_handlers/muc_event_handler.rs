// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use jid::BareJid;
use tracing::{debug, warn};

use crate::domain::occupancy::models::{ClusterTask, MucEvent};
use crate::domain::occupancy::services::{ClusterService, OccupantRegistry};
use crate::domain::settings::models::MucSettings;
use crate::domain::shared::models::RoomName;

/// Turns the room lifecycle events of one MUC service into registry mutations
/// and replicates each mutation to the other cluster nodes. The mutation is
/// applied locally first; a broadcast that stalls on a slow peer must not
/// delay the local registry becoming queryable.
pub struct MucEventHandler {
    registry: Arc<OccupantRegistry>,
    cluster: Arc<dyn ClusterService>,
    nonblocking_tasks: AtomicBool,
}

impl MucEventHandler {
    pub fn new(
        registry: Arc<OccupantRegistry>,
        cluster: Arc<dyn ClusterService>,
        settings: &MucSettings,
    ) -> Self {
        MucEventHandler {
            registry,
            cluster,
            nonblocking_tasks: AtomicBool::new(settings.cluster_task_nonblocking),
        }
    }

    /// Switches between fire-and-forget and synchronous replication. Takes
    /// effect for the next event; the mode is resolved per event at dispatch
    /// time.
    pub fn set_nonblocking_cluster_tasks(&self, nonblocking: bool) {
        self.nonblocking_tasks.store(nonblocking, Ordering::Relaxed);
    }

    /// Handles a room event. Events for rooms of other services are ignored,
    /// with one exception: nickname kicks are not filtered by service, since
    /// a nickname collision is resolved by nickname across the whole cluster
    /// rather than per service.
    pub async fn handle_event(&self, event: MucEvent) -> Result<()> {
        match event {
            MucEvent::OccupantJoined {
                room,
                user,
                nickname,
            } => {
                if !self.registry.is_for_this_service(&room) {
                    return Ok(());
                }
                let Some(room_name) = room_name(&room) else {
                    return Ok(());
                };
                let task = self
                    .registry
                    .register_occupant_joined_locally(room_name, nickname, user);
                self.broadcast(task).await;
            }

            MucEvent::OccupantNicknameChanged {
                room,
                user,
                old_nickname,
                new_nickname,
            } => {
                if !self.registry.is_for_this_service(&room) {
                    return Ok(());
                }
                let Some(room_name) = room_name(&room) else {
                    return Ok(());
                };
                let task = self.registry.register_nickname_changed_locally(
                    room_name,
                    old_nickname,
                    new_nickname,
                    user,
                );
                self.broadcast(task).await;
            }

            MucEvent::OccupantLeft {
                room,
                user,
                nickname,
            } => {
                if !self.registry.is_for_this_service(&room) {
                    return Ok(());
                }
                let Some(room_name) = room_name(&room) else {
                    return Ok(());
                };
                let task = self
                    .registry
                    .register_occupant_left_locally(room_name, nickname, user);
                self.broadcast(task).await;
            }

            MucEvent::OccupantNickKicked { room, nickname } => {
                let Some(room_name) = room_name(&room) else {
                    return Ok(());
                };
                let task = self
                    .registry
                    .register_nick_kicked_locally(room_name, nickname);
                self.broadcast(task).await;
            }

            MucEvent::RoomDestroyed { room } => {
                if !self.registry.is_for_this_service(&room) {
                    return Ok(());
                }
                let Some(room_name) = room_name(&room) else {
                    return Ok(());
                };
                // Every node observes the destruction through its own event;
                // there is nothing to broadcast.
                self.registry.register_room_destroyed_locally(&room_name);
            }

            MucEvent::RoomCreated { .. }
            | MucEvent::MessageReceived { .. }
            | MucEvent::PrivateMessageReceived { .. }
            | MucEvent::RoomSubjectChanged { .. } => (),
        }

        Ok(())
    }

    async fn broadcast(&self, task: ClusterTask) {
        let result = if self.nonblocking_tasks.load(Ordering::Relaxed) {
            self.cluster.dispatch_task(task).await
        } else {
            self.cluster.dispatch_task_sync(task).await
        };

        if let Err(error) = result {
            warn!(
                %error,
                "Failed to replicate an occupant mutation to the other cluster nodes. They'll catch up with the next occupant sync."
            );
        }
    }
}

fn room_name(room: &BareJid) -> Option<RoomName> {
    let Some(node) = room.node() else {
        debug!(room = %room, "Ignoring event for a room address without a node part");
        return None;
    };
    Some(RoomName::from(node.to_string()))
}

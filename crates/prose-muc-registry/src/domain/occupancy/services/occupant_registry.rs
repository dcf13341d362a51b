// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jid::BareJid;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::domain::occupancy::models::{
    ClusterTask, OccupancyIndex, Occupant, OccupantSnapshot, PingHandle,
};
use crate::domain::shared::models::{Nickname, NodeId, RealJid, RoomName, ServiceName};

use super::ClusterService;

/// Source of the timestamps the registry stamps on the occupants it creates
/// or touches: creation time, last activity, ping issuance. Production uses
/// [`SystemClock`]; tests inject a pinned clock so that idle detection can be
/// asserted against exact instants.
pub trait ActivityClock: Send + Sync {
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Default)]
pub struct SystemClock;

impl ActivityClock for SystemClock {
    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Maintains an in-memory inventory of which user is in which chatroom,
/// across the entire cluster, for exactly one MUC service.
///
/// The authoritative room state lives in a clustered cache that does not
/// survive changes to the cluster composition. This registry retains just
/// enough data to work out, after such a change, which occupants became
/// unreachable, so that "has left" presence can be synthesized for the users
/// connected locally. On top of that it answers two conveniences: which rooms
/// a user currently inhabits, and when a local user was last active.
///
/// A single reader/writer lock guards both lookup tables. Queries take the
/// read half, mutations the write half for their whole duration, and nothing
/// blocks inside a critical section except the lock acquisition itself.
/// Broadcasts to other nodes happen strictly after the local mutation is
/// visible.
pub struct OccupantRegistry {
    service_name: ServiceName,
    service_domain: String,
    index: RwLock<OccupancyIndex>,
    cluster: Arc<dyn ClusterService>,
    clock: Arc<dyn ActivityClock>,
}

impl OccupantRegistry {
    pub fn new(
        service_name: ServiceName,
        service_domain: impl Into<String>,
        cluster: Arc<dyn ClusterService>,
        clock: Arc<dyn ActivityClock>,
    ) -> Self {
        let service_domain = service_domain.into();
        debug!(service = %service_name, domain = %service_domain, "Instantiating occupant registry");
        OccupantRegistry {
            service_name,
            service_domain,
            index: RwLock::new(OccupancyIndex::default()),
            cluster,
            clock,
        }
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.service_name
    }

    /// True if `room` belongs to the service this registry is operating for,
    /// judged by its domain part.
    pub fn is_for_this_service(&self, room: &BareJid) -> bool {
        room.domain().to_string() == self.service_domain
    }
}

/// Registration of local MUC events. Each method applies the mutation to this
/// node's tables and hands back the task that replicates it, so the caller
/// can broadcast after the mutation is visible locally.
impl OccupantRegistry {
    pub fn register_occupant_joined_locally(
        &self,
        room_name: RoomName,
        nickname: Nickname,
        real_jid: RealJid,
    ) -> ClusterTask {
        debug!(
            service = %self.service_name, room = %room_name, user = %real_jid, nick = %nickname,
            "New local occupancy"
        );
        let task = ClusterTask::OccupantAdded {
            service: self.service_name.clone(),
            room_name,
            nickname,
            real_jid,
            origin: self.cluster.local_node_id(),
        };
        self.apply(&task);
        task
    }

    pub fn register_nickname_changed_locally(
        &self,
        room_name: RoomName,
        old_nickname: Nickname,
        new_nickname: Nickname,
        real_jid: RealJid,
    ) -> ClusterTask {
        debug!(
            service = %self.service_name, room = %room_name, user = %real_jid,
            "Local occupant now uses nickname '{}' (was: '{}')", new_nickname, old_nickname
        );
        let task = ClusterTask::OccupantUpdated {
            service: self.service_name.clone(),
            room_name,
            old_nickname,
            new_nickname,
            real_jid,
            origin: self.cluster.local_node_id(),
        };
        self.apply(&task);
        task
    }

    pub fn register_occupant_left_locally(
        &self,
        room_name: RoomName,
        nickname: Nickname,
        real_jid: RealJid,
    ) -> ClusterTask {
        debug!(
            service = %self.service_name, room = %room_name, user = %real_jid, nick = %nickname,
            "Removed local occupancy"
        );
        let task = ClusterTask::OccupantRemoved {
            service: self.service_name.clone(),
            room_name,
            nickname,
            real_jid,
            origin: self.cluster.local_node_id(),
        };
        self.apply(&task);
        task
    }

    pub fn register_nick_kicked_locally(
        &self,
        room_name: RoomName,
        nickname: Nickname,
    ) -> ClusterTask {
        debug!(
            service = %self.service_name, room = %room_name, nick = %nickname,
            "Kicking everyone using the nickname from the room"
        );
        let task = ClusterTask::OccupantNickKicked {
            service: self.service_name.clone(),
            room_name,
            nickname,
            origin: self.cluster.local_node_id(),
        };
        self.apply(&task);
        task
    }

    /// Deletes every registration for occupants of the destroyed room, on
    /// every node they were known on. Not replicated; every node observes
    /// the destruction through its own event.
    pub fn register_room_destroyed_locally(&self, room_name: &RoomName) {
        let mut index = self.index.write();
        for (occupant, nodes) in index.occupants_of_room(room_name) {
            for node in &nodes {
                index.replace(Some(&occupant), None, Some(node));
            }
        }
        index.debug_assert_consistent();
    }
}

/// Application of mutation descriptors, whether they were produced locally or
/// arrived from another cluster node.
impl OccupantRegistry {
    pub fn apply(&self, task: &ClusterTask) {
        match task {
            ClusterTask::OccupantAdded {
                room_name,
                nickname,
                real_jid,
                origin,
                ..
            } => {
                let occupant = self.new_occupant(room_name, nickname, real_jid);
                let mut index = self.index.write();
                index.replace(None, Some(&occupant), Some(origin));
                index.debug_assert_consistent();
            }

            ClusterTask::OccupantUpdated {
                room_name,
                old_nickname,
                new_nickname,
                real_jid,
                origin,
                ..
            } => {
                let old = self.new_occupant(room_name, old_nickname, real_jid);
                let new = self.new_occupant(room_name, new_nickname, real_jid);
                let mut index = self.index.write();
                index.replace(Some(&old), Some(&new), Some(origin));
                index.debug_assert_consistent();
            }

            ClusterTask::OccupantRemoved {
                room_name,
                nickname,
                real_jid,
                origin,
                ..
            } => {
                let occupant = self.new_occupant(room_name, nickname, real_jid);
                let mut index = self.index.write();
                index.replace(Some(&occupant), None, Some(origin));
                index.debug_assert_consistent();
            }

            ClusterTask::OccupantNickKicked {
                room_name, nickname, ..
            } => self.apply_nick_kick(room_name, nickname),

            ClusterTask::SyncLocalOccupants {
                occupants, origin, ..
            } => self.apply_occupants_sync(occupants, origin),
        }
    }

    fn apply_nick_kick(&self, room_name: &RoomName, nickname: &Nickname) {
        // Collect under the read lock, then reacquire as a writer; the lock
        // cannot be upgraded. An occupant that disappears in between was
        // removed by someone else, and deleting it again is a no-op.
        let to_kick = self
            .index
            .read()
            .occupants_matching_nickname(room_name, nickname);

        let mut index = self.index.write();
        for occupant in &to_kick {
            index.replace(Some(occupant), None, None);
        }
        index.debug_assert_consistent();

        debug!(
            service = %self.service_name, room = %room_name, nick = %nickname,
            "Removed {} occupant(s) using the kicked nickname", to_kick.len()
        );
    }

    fn apply_occupants_sync(&self, occupants: &[OccupantSnapshot], origin: &NodeId) {
        let now = self.clock.timestamp();
        let old_occupants;

        {
            let mut index = self.index.write();
            old_occupants = index.occupants_for_node(origin);

            debug!(
                service = %self.service_name, node = %origin,
                "Received a copy of {} local MUC occupants; we already had {} in the local registration for that node",
                occupants.len(), old_occupants.len()
            );

            for occupant in &old_occupants {
                index.replace(Some(occupant), None, Some(origin));
            }
            for snapshot in occupants {
                index.replace(None, Some(&snapshot.clone().into_occupant(now)), Some(origin));
            }
            index.debug_assert_consistent();
        }

        if old_occupants.is_empty() {
            return;
        }

        let old_snapshots = old_occupants
            .iter()
            .map(OccupantSnapshot::from)
            .collect::<HashSet<_>>();
        let new_snapshots = occupants.iter().cloned().collect::<HashSet<_>>();

        if old_snapshots == new_snapshots {
            info!(
                service = %self.service_name, node = %origin,
                "Received a copy of local MUC occupants that we already had. This hints at a possible inefficient sharing of data across the cluster."
            );
        } else {
            warn!(
                service = %self.service_name, node = %origin,
                "Received a copy of local MUC occupants that differs from the data we already had for that node. The received data replaced it."
            );
        }
    }

    fn new_occupant(
        &self,
        room_name: &RoomName,
        nickname: &Nickname,
        real_jid: &RealJid,
    ) -> Occupant {
        Occupant::new(
            room_name.clone(),
            nickname.clone(),
            real_jid.clone(),
            self.clock.timestamp(),
        )
    }
}

/// Bulk reconciliation after changes to the cluster composition.
impl OccupantRegistry {
    /// Removes and returns everything that was registered for `node`, in
    /// reaction to that node having left the cluster. The caller uses the
    /// returned set to synthesize "has left" presence for local observers.
    pub fn node_left(&self, node: &NodeId) -> HashSet<Occupant> {
        let mut index = self.index.write();
        let removed = index.remove_node(node);
        index.debug_assert_consistent();
        debug!(
            service = %self.service_name, node = %node,
            "Removed {} occupant(s) of the node that left the cluster", removed.len()
        );
        removed
    }

    /// Drops every other node's entries after the local node got severed from
    /// the cluster; our own users are still here and stay registered. Returns
    /// the occupants that are no longer reachable. An identity also present
    /// locally is not lost, it merely collapsed onto the local node.
    pub fn local_node_detached(&self) -> HashSet<Occupant> {
        let local = self.cluster.local_node_id();
        let mut index = self.index.write();
        let lost = index.retain_local(&local);
        index.debug_assert_consistent();
        debug!(service = %self.service_name, "Reset occupants because we left the cluster");
        lost
    }

    /// The task that tells the other cluster nodes about every occupant
    /// hosted here.
    pub fn local_occupants_sync_task(&self) -> ClusterTask {
        let origin = self.cluster.local_node_id();
        let occupants = self
            .index
            .read()
            .occupants_for_node(&origin)
            .iter()
            .map(OccupantSnapshot::from)
            .collect();
        ClusterTask::SyncLocalOccupants {
            service: self.service_name.clone(),
            occupants,
            origin,
        }
    }
}

/// Read projections and local-activity bookkeeping. Queries copy what they
/// return; nothing hands out references into the tables.
impl OccupantRegistry {
    /// The names of all rooms that `real_jid` is currently an occupant of,
    /// anywhere in the cluster.
    pub fn room_names_for_address(&self, real_jid: &RealJid) -> HashSet<RoomName> {
        self.index.read().room_names_for_address(real_jid)
    }

    /// The occupants hosted by the local node.
    pub fn local_occupants(&self) -> HashSet<Occupant> {
        self.index
            .read()
            .occupants_for_node(&self.cluster.local_node_id())
    }

    /// Records activity for a user connected to the local node; used to
    /// detect idle users. Activity of remotely connected users is tracked by
    /// the node hosting them.
    pub fn register_activity(&self, real_jid: &RealJid) {
        let local = self.cluster.local_node_id();
        let now = self.clock.timestamp();
        self.index.write().register_activity(&local, real_jid, now);
    }

    /// The most recent activity of a user connected to the local node, or
    /// `None` when no occupant with that JID is registered here.
    pub fn last_activity_on_local_node(&self, real_jid: &RealJid) -> Option<DateTime<Utc>> {
        self.index
            .read()
            .last_activity(&self.cluster.local_node_id(), real_jid)
    }

    /// Counts the users that are in at least one room.
    pub fn number_of_unique_users(&self) -> usize {
        self.index.read().unique_user_count()
    }

    pub fn exists(&self, occupant: &Occupant) -> bool {
        self.index.read().exists_except(occupant, None)
    }

    /// True if the occupant is registered on at least one node other than
    /// `exclude`.
    pub fn exists_except(&self, occupant: &Occupant, exclude: &NodeId) -> bool {
        self.index.read().exists_except(occupant, Some(exclude))
    }

    pub fn occupants_for_room_by_node(
        &self,
        room_name: &RoomName,
        node: &NodeId,
    ) -> HashSet<Occupant> {
        self.index.read().occupants_for_room_on_node(room_name, node)
    }

    pub fn occupants_for_room_except_for_node(
        &self,
        room_name: &RoomName,
        exclude: &NodeId,
    ) -> HashSet<Occupant> {
        self.index
            .read()
            .occupants_for_room_except_node(room_name, exclude)
    }

    pub fn occupants_by_node(&self) -> HashMap<NodeId, HashSet<Occupant>> {
        self.index.read().occupants_by_node()
    }

    pub fn nodes_by_occupant(&self) -> HashMap<Occupant, HashSet<NodeId>> {
        self.index.read().nodes_by_occupant()
    }

    /// Attaches a scheduled liveness probe to a local occupant and records
    /// when it was issued. The probe is called off when the occupant gets
    /// deleted, or when a newer probe replaces it. Returns false when no
    /// occupant with that identity is registered locally.
    pub fn set_pending_ping(&self, occupant: &Occupant, ping: PingHandle) -> bool {
        let local = self.cluster.local_node_id();
        let now = self.clock.timestamp();
        self.index
            .write()
            .set_pending_ping(&local, occupant, ping, now)
    }
}

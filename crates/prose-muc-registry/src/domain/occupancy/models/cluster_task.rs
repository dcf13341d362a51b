// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::models::{Nickname, NodeId, RealJid, RoomName, ServiceName};

use super::Occupant;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// The identity of an occupant as it crosses the wire. Local bookkeeping
/// (activity timestamps, pending pings) never does.
pub struct OccupantSnapshot {
    pub room_name: RoomName,
    pub nickname: Nickname,
    pub real_jid: RealJid,
}

impl From<&Occupant> for OccupantSnapshot {
    fn from(occupant: &Occupant) -> Self {
        OccupantSnapshot {
            room_name: occupant.room_name().clone(),
            nickname: occupant.nickname().clone(),
            real_jid: occupant.real_jid().clone(),
        }
    }
}

impl OccupantSnapshot {
    pub fn into_occupant(self, now: DateTime<Utc>) -> Occupant {
        Occupant::new(self.room_name, self.nickname, self.real_jid, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A self-describing occupant mutation, replicated to every other cluster
/// node. Each variant carries the name of the service it belongs to, so the
/// receiving node can route it to that service's registry, and the id of the
/// node it originated on.
pub enum ClusterTask {
    OccupantAdded {
        service: ServiceName,
        room_name: RoomName,
        nickname: Nickname,
        real_jid: RealJid,
        origin: NodeId,
    },
    OccupantUpdated {
        service: ServiceName,
        room_name: RoomName,
        old_nickname: Nickname,
        new_nickname: Nickname,
        real_jid: RealJid,
        origin: NodeId,
    },
    OccupantRemoved {
        service: ServiceName,
        room_name: RoomName,
        nickname: Nickname,
        real_jid: RealJid,
        origin: NodeId,
    },
    OccupantNickKicked {
        service: ServiceName,
        room_name: RoomName,
        nickname: Nickname,
        origin: NodeId,
    },
    /// The full set of occupants that `origin` hosts locally. Sent whenever
    /// the cluster topology changes so that every node can rebuild its view
    /// of its peers.
    SyncLocalOccupants {
        service: ServiceName,
        occupants: Vec<OccupantSnapshot>,
        origin: NodeId,
    },
}

impl ClusterTask {
    pub fn service(&self) -> &ServiceName {
        match self {
            Self::OccupantAdded { service, .. }
            | Self::OccupantUpdated { service, .. }
            | Self::OccupantRemoved { service, .. }
            | Self::OccupantNickKicked { service, .. }
            | Self::SyncLocalOccupants { service, .. } => service,
        }
    }

    pub fn origin(&self) -> &NodeId {
        match self {
            Self::OccupantAdded { origin, .. }
            | Self::OccupantUpdated { origin, .. }
            | Self::OccupantRemoved { origin, .. }
            | Self::OccupantNickKicked { origin, .. }
            | Self::SyncLocalOccupants { origin, .. } => origin,
        }
    }
}

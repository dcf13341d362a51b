// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use cluster_task::{ClusterTask, OccupantSnapshot};
pub use muc_event::MucEvent;
pub use occupancy_index::OccupancyIndex;
pub use occupant::{Occupant, PingHandle, ScheduledPing};

mod cluster_task;
mod muc_event;
mod occupancy_index;
mod occupant;

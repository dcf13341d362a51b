// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use app::event_handlers::{ClusterEvent, ClusterEventHandler, MucEventHandler, RegistryDelegate};
pub use app::services::OccupancyRegistries;
pub use domain::occupancy::models::{
    ClusterTask, MucEvent, Occupant, OccupantSnapshot, PingHandle, ScheduledPing,
};
pub use domain::occupancy::services::{
    ActivityClock, ClusterError, ClusterService, OccupantRegistry, SystemClock,
};
pub use domain::settings::models::MucSettings;
pub use domain::shared::models::{Nickname, NodeId, RealJid, RoomName, ServiceName};

pub mod app;
pub mod domain;
#[cfg(feature = "test")]
pub mod test;
mod util;

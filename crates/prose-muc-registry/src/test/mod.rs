// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::Utc;

pub use manual_ping::ManualPing;
pub use stepping_clock::SteppingClock;

use crate::domain::occupancy::models::Occupant;
use crate::real_jid;

mod manual_ping;

/// Builds an occupant for assertions. Equality only looks at the identity
/// triple, so the creation timestamp doesn't matter.
pub fn occupant(room: &str, nick: &str, jid: &str) -> Occupant {
    Occupant::new(room.into(), nick.into(), real_jid!(jid), Utc::now())
}

// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use nickname::Nickname;
pub use node_id::NodeId;
pub use real_jid::RealJid;
pub use room_name::RoomName;
pub use service_name::ServiceName;

mod nickname;
mod node_id;
mod real_jid;
mod room_name;
mod service_name;

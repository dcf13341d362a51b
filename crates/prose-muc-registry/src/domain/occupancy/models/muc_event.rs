// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;

use crate::domain::shared::models::{Nickname, RealJid};

#[derive(Debug, Clone, PartialEq)]
/// Room lifecycle callbacks as delivered by the MUC service on whichever node
/// hosts the affected client. `room` is the room's full address
/// (`room@service`); `user` is the real JID, not the in-room one.
pub enum MucEvent {
    OccupantJoined {
        room: BareJid,
        user: RealJid,
        nickname: Nickname,
    },
    OccupantNicknameChanged {
        room: BareJid,
        user: RealJid,
        old_nickname: Nickname,
        new_nickname: Nickname,
    },
    OccupantLeft {
        room: BareJid,
        user: RealJid,
        nickname: Nickname,
    },
    /// A nickname collision got everyone using `nickname` kicked from the
    /// room. Carries no real JID; the collision is about the nickname.
    OccupantNickKicked { room: BareJid, nickname: Nickname },
    RoomCreated { room: BareJid },
    RoomDestroyed { room: BareJid },
    MessageReceived {
        room: BareJid,
        user: RealJid,
        nickname: Nickname,
        body: String,
    },
    PrivateMessageReceived {
        to: RealJid,
        from: RealJid,
        body: String,
    },
    RoomSubjectChanged {
        room: BareJid,
        user: RealJid,
        subject: String,
    },
}

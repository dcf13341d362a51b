// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::shared::models::{Nickname, RealJid, RoomName};

/// A liveness probe scheduled by the ping scheduler. Cancellation is
/// best-effort; a probe that is already in flight may still complete.
pub trait ScheduledPing: Send + Sync {
    fn cancel(&self);
}

#[derive(Clone)]
pub struct PingHandle(Arc<dyn ScheduledPing>);

impl PingHandle {
    pub fn new(ping: Arc<dyn ScheduledPing>) -> Self {
        PingHandle(ping)
    }

    pub fn cancel(&self) {
        self.0.cancel()
    }
}

impl Debug for PingHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PingHandle")
    }
}

#[derive(Debug, Clone)]
/// A user that occupies a chatroom somewhere in the cluster.
///
/// Identity is the (room name, nickname, real JID) triple; equality and
/// hashing use nothing else. The remaining fields are bookkeeping that only
/// the node hosting the user's client connection maintains. They never cross
/// the wire, and replicas on other nodes see them unset.
pub struct Occupant {
    room_name: RoomName,
    nickname: Nickname,
    real_jid: RealJid,
    last_active: DateTime<Utc>,
    last_ping_request: Option<DateTime<Utc>>,
    pending_ping: Option<PingHandle>,
}

impl Occupant {
    pub fn new(
        room_name: RoomName,
        nickname: Nickname,
        real_jid: RealJid,
        now: DateTime<Utc>,
    ) -> Self {
        Occupant {
            room_name,
            nickname,
            real_jid,
            last_active: now,
            last_ping_request: None,
            pending_ping: None,
        }
    }

    pub fn room_name(&self) -> &RoomName {
        &self.room_name
    }

    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    pub fn real_jid(&self) -> &RealJid {
        &self.real_jid
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    pub fn last_ping_request(&self) -> Option<DateTime<Utc>> {
        self.last_ping_request
    }

    pub fn pending_ping(&self) -> Option<&PingHandle> {
        self.pending_ping.as_ref()
    }

    pub(crate) fn set_last_active(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    /// Attaches a scheduled probe and records when it was issued. Clearing
    /// the probe leaves the request timestamp in place.
    pub(crate) fn set_pending_ping(&mut self, ping: Option<PingHandle>, now: DateTime<Utc>) {
        if ping.is_some() {
            self.last_ping_request = Some(now);
        }
        self.pending_ping = ping;
    }

    pub(crate) fn take_pending_ping(&mut self) -> Option<PingHandle> {
        self.pending_ping.take()
    }
}

impl PartialEq for Occupant {
    fn eq(&self, other: &Self) -> bool {
        self.room_name == other.room_name
            && self.nickname == other.nickname
            && self.real_jid == other.real_jid
    }
}

impl Eq for Occupant {}

impl Hash for Occupant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.room_name.hash(state);
        self.nickname.hash(state);
        self.real_jid.hash(state);
    }
}

impl Display for Occupant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Occupant '{}' of room '{}' (real JID '{}')",
            self.nickname, self.room_name, self.real_jid
        )
    }
}

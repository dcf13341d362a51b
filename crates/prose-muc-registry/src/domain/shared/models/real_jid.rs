// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use jid::Jid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// The address a user is known by outside of any chatroom (bare or full), as
/// distinct from their in-room address.
pub struct RealJid(Jid);

impl RealJid {
    pub fn into_inner(self) -> Jid {
        self.0
    }
}

impl From<Jid> for RealJid {
    fn from(value: Jid) -> Self {
        RealJid(value)
    }
}

impl AsRef<Jid> for RealJid {
    fn as_ref(&self) -> &Jid {
        &self.0
    }
}

impl Display for RealJid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RealJid {
    type Err = jid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RealJid(s.parse::<Jid>()?))
    }
}

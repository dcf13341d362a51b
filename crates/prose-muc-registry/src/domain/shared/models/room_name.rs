// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// The short name of a room within its service, i.e. the node-part of the
/// room's address.
pub struct RoomName(String);

impl RoomName {
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<T> From<T> for RoomName
where
    T: Into<String>,
{
    fn from(s: T) -> Self {
        RoomName(s.into())
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for RoomName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

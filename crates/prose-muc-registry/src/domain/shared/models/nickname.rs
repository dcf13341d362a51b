// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// The display name a user chose within a room.
pub struct Nickname(String);

impl Nickname {
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<T> From<T> for Nickname
where
    T: Into<String>,
{
    fn from(s: T) -> Self {
        Nickname(s.into())
    }
}

impl AsRef<str> for Nickname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Nickname {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

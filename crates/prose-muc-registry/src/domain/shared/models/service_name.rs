// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Names one MUC service. Replicated tasks carry it so that the receiving
/// node can route them to the registry of the right service.
pub struct ServiceName(String);

impl ServiceName {
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<T> From<T> for ServiceName
where
    T: Into<String>,
{
    fn from(s: T) -> Self {
        ServiceName(s.into())
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for ServiceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

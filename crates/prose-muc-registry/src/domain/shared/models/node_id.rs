// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Identifies one node in the cluster. The value is assigned by the cluster
/// layer and is opaque to us; one distinguished value identifies the local
/// node.
pub struct NodeId(String);

impl NodeId {
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<T> From<T> for NodeId
where
    T: Into<String>,
{
    fn from(s: T) -> Self {
        NodeId(s.into())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

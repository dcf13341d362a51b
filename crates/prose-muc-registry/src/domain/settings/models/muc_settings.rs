// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// The options the registry recognizes.
pub struct MucSettings {
    /// When set, occupant mutations are replicated to the other cluster
    /// nodes with fire-and-forget tasks instead of blocking until every
    /// reachable node has applied them. Can be flipped at runtime via
    /// [`crate::app::event_handlers::MucEventHandler::set_nonblocking_cluster_tasks`].
    #[serde(rename = "cluster-task-nonblocking", default)]
    pub cluster_task_nonblocking: bool,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults_to_blocking_tasks() {
        assert_eq!(
            MucSettings::default(),
            MucSettings {
                cluster_task_nonblocking: false
            }
        );

        let settings = serde_json::from_str::<MucSettings>("{}").unwrap();
        assert_eq!(settings.cluster_task_nonblocking, false);
    }

    #[test]
    fn test_reads_kebab_case_key() {
        let settings =
            serde_json::from_str::<MucSettings>(r#"{"cluster-task-nonblocking": true}"#).unwrap();
        assert_eq!(settings.cluster_task_nonblocking, true);
    }
}

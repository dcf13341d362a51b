// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use mockall::predicate;
use pretty_assertions::assert_eq;

use prose_muc_registry::domain::occupancy::services::mocks::MockClusterService;
use prose_muc_registry::test::occupant;
use prose_muc_registry::{
    real_jid, ClusterError, ClusterTask, MucEvent, MucEventHandler, MucSettings, NodeId,
    OccupantRegistry, SystemClock,
};

fn handler_with(cluster: MockClusterService, settings: MucSettings) -> (Arc<OccupantRegistry>, MucEventHandler) {
    let cluster = Arc::new(cluster);
    let registry = Arc::new(OccupantRegistry::new(
        "conference".into(),
        "conference.prose.org",
        cluster.clone(),
        Arc::new(SystemClock),
    ));
    let handler = MucEventHandler::new(registry.clone(), cluster, &settings);
    (registry, handler)
}

fn local_cluster() -> MockClusterService {
    let mut cluster = MockClusterService::new();
    cluster
        .expect_local_node_id()
        .return_const(NodeId::from("node-a"));
    cluster
}

#[tokio::test]
async fn test_join_is_applied_locally_and_broadcast() -> Result<()> {
    let mut cluster = local_cluster();
    cluster
        .expect_dispatch_task_sync()
        .once()
        .with(predicate::eq(ClusterTask::OccupantAdded {
            service: "conference".into(),
            room_name: "r1".into(),
            nickname: "a1".into(),
            real_jid: real_jid!("alice@prose.org"),
            origin: NodeId::from("node-a"),
        }))
        .returning(|_| Box::pin(async { Ok(()) }));

    let (registry, handler) = handler_with(cluster, MucSettings::default());

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;

    assert_eq!(
        registry.local_occupants(),
        [occupant("r1", "a1", "alice@prose.org")].into_iter().collect()
    );
    Ok(())
}

#[tokio::test]
async fn test_nickname_change_is_broadcast() -> Result<()> {
    let mut cluster = local_cluster();
    cluster
        .expect_dispatch_task_sync()
        .times(2)
        .returning(|_| Box::pin(async { Ok(()) }));

    let (registry, handler) = handler_with(cluster, MucSettings::default());

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;
    handler
        .handle_event(MucEvent::OccupantNicknameChanged {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            old_nickname: "a1".into(),
            new_nickname: "a2".into(),
        })
        .await?;

    assert_eq!(
        registry.local_occupants(),
        [occupant("r1", "a2", "alice@prose.org")].into_iter().collect()
    );
    Ok(())
}

#[tokio::test]
async fn test_ignores_events_of_other_services() -> Result<()> {
    let (registry, handler) = handler_with(local_cluster(), MucSettings::default());

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@muc.elsewhere.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;

    assert_eq!(registry.number_of_unique_users(), 0);
    Ok(())
}

#[tokio::test]
async fn test_nick_kick_is_not_scoped_to_the_service() -> Result<()> {
    let mut cluster = local_cluster();
    cluster
        .expect_dispatch_task_sync()
        .once()
        .with(predicate::eq(ClusterTask::OccupantNickKicked {
            service: "conference".into(),
            room_name: "r9".into(),
            nickname: "dup".into(),
            origin: NodeId::from("node-a"),
        }))
        .returning(|_| Box::pin(async { Ok(()) }));

    let (registry, handler) = handler_with(cluster, MucSettings::default());

    registry.apply(&ClusterTask::OccupantAdded {
        service: "conference".into(),
        room_name: "r9".into(),
        nickname: "dup".into(),
        real_jid: real_jid!("bob@prose.org"),
        origin: NodeId::from("node-b"),
    });

    // The kick names a room of a different service, yet is handled anyway.
    handler
        .handle_event(MucEvent::OccupantNickKicked {
            room: "r9@muc.elsewhere.org".parse()?,
            nickname: "dup".into(),
        })
        .await?;

    assert_eq!(registry.number_of_unique_users(), 0);
    Ok(())
}

#[tokio::test]
async fn test_nonblocking_mode_is_resolved_per_event() -> Result<()> {
    let mut cluster = local_cluster();
    cluster
        .expect_dispatch_task()
        .once()
        .returning(|_| Box::pin(async { Ok(()) }));
    cluster
        .expect_dispatch_task_sync()
        .once()
        .returning(|_| Box::pin(async { Ok(()) }));

    let (_registry, handler) = handler_with(
        cluster,
        MucSettings {
            cluster_task_nonblocking: true,
        },
    );

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;

    handler.set_nonblocking_cluster_tasks(false);

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r2@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_room_destroyed_is_not_broadcast() -> Result<()> {
    let mut cluster = local_cluster();
    cluster
        .expect_dispatch_task_sync()
        .times(2)
        .returning(|_| Box::pin(async { Ok(()) }));

    let (registry, handler) = handler_with(cluster, MucSettings::default());

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;
    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r2@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a2".into(),
        })
        .await?;
    registry.apply(&ClusterTask::OccupantAdded {
        service: "conference".into(),
        room_name: "r1".into(),
        nickname: "b1".into(),
        real_jid: real_jid!("bob@prose.org"),
        origin: NodeId::from("node-b"),
    });

    handler
        .handle_event(MucEvent::RoomDestroyed {
            room: "r1@conference.prose.org".parse()?,
        })
        .await?;

    assert_eq!(
        registry.room_names_for_address(&real_jid!("alice@prose.org")),
        ["r2".into()].into_iter().collect()
    );
    assert_eq!(
        registry.room_names_for_address(&real_jid!("bob@prose.org")),
        HashSet::new()
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_broadcast_leaves_local_mutation_in_place() -> Result<()> {
    let mut cluster = local_cluster();
    cluster.expect_dispatch_task_sync().once().returning(|_| {
        Box::pin(async { Err(ClusterError::DispatchFailed("peer went away".to_string())) })
    });

    let (registry, handler) = handler_with(cluster, MucSettings::default());

    handler
        .handle_event(MucEvent::OccupantJoined {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            nickname: "a1".into(),
        })
        .await?;

    assert_eq!(registry.number_of_unique_users(), 1);
    Ok(())
}

#[tokio::test]
async fn test_no_op_events_are_ignored() -> Result<()> {
    let (registry, handler) = handler_with(local_cluster(), MucSettings::default());

    handler
        .handle_event(MucEvent::RoomCreated {
            room: "r1@conference.prose.org".parse()?,
        })
        .await?;
    handler
        .handle_event(MucEvent::RoomSubjectChanged {
            room: "r1@conference.prose.org".parse()?,
            user: real_jid!("alice@prose.org"),
            subject: "New subject".to_string(),
        })
        .await?;

    assert_eq!(registry.number_of_unique_users(), 0);
    Ok(())
}

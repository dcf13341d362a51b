// prose-muc-registry/prose-muc-registry
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::shared::models::{Nickname, NodeId, RealJid, RoomName};

use super::{Occupant, PingHandle};

#[derive(Debug, Default)]
/// The two coupled lookup tables that make up a registry: occupants by the
/// node that hosts them (keyed by real JID below the node), and the reverse,
/// nodes by occupant. The tables are a cache of one another; every
/// pair-preserving mutation goes through [`Self::replace`] so that neither
/// can drift from the other.
///
/// The struct itself is lock-free. Its owner wraps it in a single
/// reader/writer lock and holds the write half for the whole duration of any
/// `&mut self` call.
pub struct OccupancyIndex {
    occupants_by_node: HashMap<NodeId, HashMap<RealJid, HashSet<Occupant>>>,
    nodes_by_occupant: HashMap<Occupant, HashSet<NodeId>>,
}

impl OccupancyIndex {
    /// Registers disappearance of an existing occupant, and/or appearance of
    /// a new occupant, on a specific node. When `node` is `None` the
    /// replacement fans out over every node currently present in the index,
    /// which is what a cluster-wide nickname kick needs.
    ///
    /// Deleting an absent occupant is a no-op and inserting a present one is
    /// idempotent, so callers may retry or apply stale descriptors freely.
    pub fn replace(&mut self, old: Option<&Occupant>, new: Option<&Occupant>, node: Option<&NodeId>) {
        let nodes = match node {
            Some(node) => vec![node.clone()],
            None => self.occupants_by_node.keys().cloned().collect(),
        };

        for node in nodes {
            if let Some(old) = old {
                self.delete_from_node(old, &node);
            }

            if let Some(new) = new {
                self.occupants_by_node
                    .entry(node.clone())
                    .or_default()
                    .entry(new.real_jid().clone())
                    .or_default()
                    .insert(new.clone());
                self.nodes_by_occupant
                    .entry(new.clone())
                    .or_default()
                    .insert(node.clone());
            }

            debug!(node = %node, "Replaced occupant {:?} with {:?}", old, new);
        }
    }

    /// Removes `old` from `node`, pruning every container that runs empty.
    /// The stored value owns the pending ping, so the probe that gets
    /// cancelled is the one attached in the index, not whatever the caller's
    /// lookup value carries.
    fn delete_from_node(&mut self, old: &Occupant, node: &NodeId) {
        let mut removed = None;

        if let Some(occupants_on_node) = self.occupants_by_node.get_mut(node) {
            if let Some(occupants_for_jid) = occupants_on_node.get_mut(old.real_jid()) {
                removed = occupants_for_jid.take(old);
                if occupants_for_jid.is_empty() {
                    occupants_on_node.remove(old.real_jid());
                    if occupants_on_node.is_empty() {
                        self.occupants_by_node.remove(node);
                    }
                }
            }
        }

        if let Some(nodes) = self.nodes_by_occupant.get_mut(old) {
            nodes.remove(node);
            if nodes.is_empty() {
                self.nodes_by_occupant.remove(old);
            }
        }

        if let Some(mut removed) = removed {
            if let Some(ping) = removed.take_pending_ping() {
                debug!("Cancelling pending ping for {} that is being deleted", removed);
                ping.cancel();
            }
        }
    }

    /// Removes everything registered for `node` and returns it.
    pub fn remove_node(&mut self, node: &NodeId) -> HashSet<Occupant> {
        let removed = self.occupants_for_node(node);
        for occupant in &removed {
            self.replace(Some(occupant), None, Some(node));
        }
        removed
    }

    /// Drops every node entry except `local` and rebuilds the reverse table
    /// from what remains. Returns the occupants that were only reachable
    /// through the dropped entries: an identity that is also present under
    /// `local` (same room, nickname and real JID) is not lost, it merely
    /// collapsed onto the local node.
    pub fn retain_local(&mut self, local: &NodeId) -> HashSet<Occupant> {
        let local_occupants = self
            .occupants_by_node
            .get(local)
            .cloned()
            .unwrap_or_default();

        let mut lost = HashSet::new();
        for (node, occupants_on_node) in &self.occupants_by_node {
            if node == local {
                continue;
            }
            for (real_jid, occupants_for_jid) in occupants_on_node {
                match local_occupants.get(real_jid) {
                    None => lost.extend(occupants_for_jid.iter().cloned()),
                    Some(local_for_jid) => lost.extend(
                        occupants_for_jid
                            .iter()
                            .filter(|o| !local_for_jid.contains(o))
                            .cloned(),
                    ),
                }
            }
        }

        self.occupants_by_node.retain(|node, _| node == local);
        self.nodes_by_occupant.clear();
        for occupant in local_occupants.values().flatten() {
            self.nodes_by_occupant
                .entry(occupant.clone())
                .or_default()
                .insert(local.clone());
        }

        lost
    }

    /// Stamps `now` as the last activity of every occupant registered for
    /// `real_jid` on `node`. Identity fields never change here, so the
    /// remove-and-reinsert leaves the set's hashes intact.
    pub fn register_activity(&mut self, node: &NodeId, real_jid: &RealJid, now: DateTime<Utc>) {
        let Some(occupants_for_jid) = self
            .occupants_by_node
            .get_mut(node)
            .and_then(|occupants_on_node| occupants_on_node.get_mut(real_jid))
        else {
            return;
        };

        let touched = occupants_for_jid
            .drain()
            .map(|mut occupant| {
                occupant.set_last_active(now);
                occupant
            })
            .collect();
        *occupants_for_jid = touched;
    }

    /// Attaches a scheduled probe to the stored occupant matching
    /// `occupant`'s identity on `node`. A probe that was already pending is
    /// cancelled first. Returns false when no such occupant is registered.
    pub fn set_pending_ping(
        &mut self,
        node: &NodeId,
        occupant: &Occupant,
        ping: PingHandle,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(occupants_for_jid) = self
            .occupants_by_node
            .get_mut(node)
            .and_then(|occupants_on_node| occupants_on_node.get_mut(occupant.real_jid()))
        else {
            return false;
        };

        let Some(mut stored) = occupants_for_jid.take(occupant) else {
            return false;
        };

        if let Some(previous) = stored.take_pending_ping() {
            previous.cancel();
        }
        stored.set_pending_ping(Some(ping), now);
        occupants_for_jid.insert(stored);
        true
    }

    pub fn occupants_for_node(&self, node: &NodeId) -> HashSet<Occupant> {
        self.occupants_by_node
            .get(node)
            .map(|occupants_on_node| occupants_on_node.values().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_names_for_address(&self, real_jid: &RealJid) -> HashSet<RoomName> {
        self.nodes_by_occupant
            .keys()
            .filter(|occupant| occupant.real_jid() == real_jid)
            .map(|occupant| occupant.room_name().clone())
            .collect()
    }

    pub fn last_activity(&self, node: &NodeId, real_jid: &RealJid) -> Option<DateTime<Utc>> {
        self.occupants_by_node
            .get(node)?
            .get(real_jid)?
            .iter()
            .map(|occupant| occupant.last_active())
            .max()
    }

    pub fn unique_user_count(&self) -> usize {
        self.nodes_by_occupant.len()
    }

    /// True if the occupant is registered on at least one node other than
    /// `exclude` (on any node at all, when `exclude` is `None`).
    pub fn exists_except(&self, occupant: &Occupant, exclude: Option<&NodeId>) -> bool {
        self.nodes_by_occupant
            .get(occupant)
            .map(|nodes| nodes.iter().any(|node| Some(node) != exclude))
            .unwrap_or(false)
    }

    /// Every occupant across the whole index whose room and nickname match.
    pub fn occupants_matching_nickname(
        &self,
        room_name: &RoomName,
        nickname: &Nickname,
    ) -> HashSet<Occupant> {
        self.occupants_by_node
            .values()
            .flat_map(|occupants_on_node| occupants_on_node.values())
            .flatten()
            .filter(|o| o.nickname() == nickname && o.room_name() == room_name)
            .cloned()
            .collect()
    }

    /// Every occupant of `room_name` paired with the nodes it is known on.
    pub fn occupants_of_room(&self, room_name: &RoomName) -> Vec<(Occupant, HashSet<NodeId>)> {
        self.nodes_by_occupant
            .iter()
            .filter(|(occupant, _)| occupant.room_name() == room_name)
            .map(|(occupant, nodes)| (occupant.clone(), nodes.clone()))
            .collect()
    }

    pub fn occupants_for_room_on_node(
        &self,
        room_name: &RoomName,
        node: &NodeId,
    ) -> HashSet<Occupant> {
        // TODO: Maintain a room-keyed index so that this doesn't need to scan
        //   every occupant of the node.
        self.occupants_by_node
            .get(node)
            .map(|occupants_on_node| {
                occupants_on_node
                    .values()
                    .flatten()
                    .filter(|o| o.room_name() == room_name)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn occupants_for_room_except_node(
        &self,
        room_name: &RoomName,
        exclude: &NodeId,
    ) -> HashSet<Occupant> {
        // TODO: Maintain a room-keyed index so that this doesn't need to scan
        //   every occupant of every node.
        self.occupants_by_node
            .iter()
            .filter(|(node, _)| *node != exclude)
            .flat_map(|(_, occupants_on_node)| occupants_on_node.values())
            .flatten()
            .filter(|o| o.room_name() == room_name)
            .cloned()
            .collect()
    }

    pub fn occupants_by_node(&self) -> HashMap<NodeId, HashSet<Occupant>> {
        self.occupants_by_node
            .iter()
            .map(|(node, occupants_on_node)| {
                (
                    node.clone(),
                    occupants_on_node.values().flatten().cloned().collect(),
                )
            })
            .collect()
    }

    pub fn nodes_by_occupant(&self) -> HashMap<Occupant, HashSet<NodeId>> {
        self.nodes_by_occupant.clone()
    }

    /// Verifies that the two tables still mirror each other and that no empty
    /// container was left behind. Mutations uphold this themselves; a
    /// violation is a programming error, so debug builds panic while release
    /// builds skip the check.
    pub(crate) fn debug_assert_consistent(&self) {
        #[cfg(debug_assertions)]
        {
            for (node, occupants_on_node) in &self.occupants_by_node {
                assert!(
                    !occupants_on_node.is_empty(),
                    "Empty node entry left behind for {node}"
                );
                for (real_jid, occupants_for_jid) in occupants_on_node {
                    assert!(
                        !occupants_for_jid.is_empty(),
                        "Empty occupant set left behind for {real_jid} on {node}"
                    );
                    for occupant in occupants_for_jid {
                        assert_eq!(
                            occupant.real_jid(),
                            real_jid,
                            "{occupant} is filed under the wrong real JID"
                        );
                        assert!(
                            self.nodes_by_occupant
                                .get(occupant)
                                .map(|nodes| nodes.contains(node))
                                .unwrap_or(false),
                            "{occupant} on {node} is missing from the reverse table"
                        );
                    }
                }
            }

            for (occupant, nodes) in &self.nodes_by_occupant {
                assert!(!nodes.is_empty(), "Empty node set left behind for {occupant}");
                for node in nodes {
                    assert!(
                        self.occupants_by_node
                            .get(node)
                            .and_then(|occupants_on_node| occupants_on_node.get(occupant.real_jid()))
                            .map(|occupants_for_jid| occupants_for_jid.contains(occupant))
                            .unwrap_or(false),
                        "{occupant} on {node} is missing from the forward table"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use crate::real_jid;

    use super::*;

    fn occupant(room: &str, nick: &str, jid: &str) -> Occupant {
        Occupant::new(room.into(), nick.into(), real_jid!(jid), Utc::now())
    }

    #[test]
    fn test_insert_and_delete_round_trip() {
        let mut index = OccupancyIndex::default();
        let node = NodeId::from("node1");
        let alice = occupant("r1", "a1", "alice@prose.org");

        index.replace(None, Some(&alice), Some(&node));
        index.debug_assert_consistent();

        assert_eq!(index.unique_user_count(), 1);
        assert!(index.exists_except(&alice, None));
        assert_eq!(
            index.room_names_for_address(&real_jid!("alice@prose.org")),
            [RoomName::from("r1")].into_iter().collect()
        );

        index.replace(Some(&alice), None, Some(&node));
        index.debug_assert_consistent();

        assert_eq!(index.unique_user_count(), 0);
        assert!(!index.exists_except(&alice, None));
        assert_eq!(index.occupants_by_node(), HashMap::new());
        assert_eq!(index.nodes_by_occupant(), HashMap::new());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut index = OccupancyIndex::default();
        let node = NodeId::from("node1");
        let alice = occupant("r1", "a1", "alice@prose.org");
        let bob = occupant("r1", "b1", "bob@prose.org");

        index.replace(None, Some(&alice), Some(&node));
        index.replace(None, Some(&bob), Some(&node));

        index.replace(Some(&alice), None, Some(&node));
        index.replace(Some(&alice), None, Some(&node));
        index.debug_assert_consistent();

        assert_eq!(index.unique_user_count(), 1);
        assert!(index.exists_except(&bob, None));
    }

    #[test]
    fn test_self_replace_is_a_no_op() {
        let mut index = OccupancyIndex::default();
        let node = NodeId::from("node1");
        let alice = occupant("r1", "a1", "alice@prose.org");

        index.replace(None, Some(&alice), Some(&node));
        let before_forward = index.occupants_by_node();
        let before_reverse = index.nodes_by_occupant();

        index.replace(Some(&alice), Some(&alice), Some(&node));
        index.debug_assert_consistent();

        assert_eq!(index.occupants_by_node(), before_forward);
        assert_eq!(index.nodes_by_occupant(), before_reverse);
    }

    #[test]
    fn test_nickname_change_keeps_single_identity() {
        let mut index = OccupancyIndex::default();
        let node = NodeId::from("node1");
        let old = occupant("r1", "a1", "alice@prose.org");
        let new = occupant("r1", "a2", "alice@prose.org");

        index.replace(None, Some(&old), Some(&node));
        index.replace(Some(&old), Some(&new), Some(&node));
        index.debug_assert_consistent();

        assert_eq!(index.unique_user_count(), 1);
        assert!(!index.exists_except(&old, None));
        assert!(index.exists_except(&new, None));
    }

    #[test]
    fn test_fans_out_over_all_nodes_without_target() {
        let mut index = OccupancyIndex::default();
        let dup = occupant("r2", "dup", "user@prose.org");

        for node in ["node1", "node2", "node3"] {
            index.replace(None, Some(&dup), Some(&NodeId::from(node)));
        }
        assert_eq!(index.nodes_by_occupant()[&dup].len(), 3);

        index.replace(Some(&dup), None, None);
        index.debug_assert_consistent();

        assert_eq!(index.unique_user_count(), 0);
        assert_eq!(index.occupants_by_node(), HashMap::new());
    }

    #[test]
    fn test_remove_node_returns_its_occupants() {
        let mut index = OccupancyIndex::default();
        let node1 = NodeId::from("node1");
        let node2 = NodeId::from("node2");
        let alice = occupant("r1", "a1", "alice@prose.org");
        let bob = occupant("r1", "b1", "bob@prose.org");

        index.replace(None, Some(&alice), Some(&node1));
        index.replace(None, Some(&bob), Some(&node2));

        let removed = index.remove_node(&node2);
        index.debug_assert_consistent();

        assert_eq!(removed, [bob.clone()].into_iter().collect());
        assert!(!index.exists_except(&bob, None));
        assert!(index.exists_except(&alice, None));
    }

    #[test]
    fn test_retain_local_merges_by_identity() {
        let mut index = OccupancyIndex::default();
        let local = NodeId::from("node1");
        let remote = NodeId::from("node2");

        let alice_here = occupant("r1", "a1", "alice@prose.org");
        let alice_there = occupant("r2", "a1", "alice@prose.org");
        let alice_both = occupant("r3", "a1", "alice@prose.org");
        let bob = occupant("r1", "b1", "bob@prose.org");

        index.replace(None, Some(&alice_here), Some(&local));
        index.replace(None, Some(&alice_both), Some(&local));
        index.replace(None, Some(&alice_there), Some(&remote));
        index.replace(None, Some(&alice_both), Some(&remote));
        index.replace(None, Some(&bob), Some(&remote));

        let lost = index.retain_local(&local);
        index.debug_assert_consistent();

        assert_eq!(
            lost,
            [alice_there, bob].into_iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            index.occupants_for_node(&local),
            [alice_here.clone(), alice_both.clone()].into_iter().collect()
        );
        assert_eq!(index.unique_user_count(), 2);
        assert_eq!(
            index.nodes_by_occupant()[&alice_both],
            [local].into_iter().collect()
        );
    }

    #[test]
    fn test_register_activity_touches_every_occupancy_of_the_user() {
        let mut index = OccupancyIndex::default();
        let node = NodeId::from("node1");
        let alice_r1 = occupant("r1", "a1", "alice@prose.org");
        let alice_r2 = occupant("r2", "a2", "alice@prose.org");

        index.replace(None, Some(&alice_r1), Some(&node));
        index.replace(None, Some(&alice_r2), Some(&node));

        let later = Utc::now() + chrono::Duration::minutes(5);
        index.register_activity(&node, &real_jid!("alice@prose.org"), later);
        index.debug_assert_consistent();

        assert_eq!(index.last_activity(&node, &real_jid!("alice@prose.org")), Some(later));
    }

    #[test]
    fn test_last_activity_missing_user() {
        let index = OccupancyIndex::default();
        assert_eq!(
            index.last_activity(&NodeId::from("node1"), &real_jid!("alice@prose.org")),
            None
        );
    }

    #[test]
    fn test_room_scans() {
        let mut index = OccupancyIndex::default();
        let node1 = NodeId::from("node1");
        let node2 = NodeId::from("node2");
        let alice = occupant("r1", "a1", "alice@prose.org");
        let bob = occupant("r1", "b1", "bob@prose.org");
        let carol = occupant("r2", "c1", "carol@prose.org");

        index.replace(None, Some(&alice), Some(&node1));
        index.replace(None, Some(&bob), Some(&node2));
        index.replace(None, Some(&carol), Some(&node2));

        assert_eq!(
            index.occupants_for_room_on_node(&"r1".into(), &node2),
            [bob.clone()].into_iter().collect()
        );
        assert_eq!(
            index.occupants_for_room_except_node(&"r1".into(), &node2),
            [alice].into_iter().collect()
        );
        assert_eq!(
            index.occupants_matching_nickname(&"r2".into(), &"c1".into()),
            [carol].into_iter().collect()
        );
    }
}

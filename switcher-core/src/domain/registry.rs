//! Node registry and the round-robin cursor.

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::node::{NodePatch, NodeRecord, ProbeReport};
use crate::error::RegistryError;

/// The ordered set of backend nodes plus the dispatch cursor.
///
/// Readers get lock-free snapshots through `ArcSwap`. Every writer, including
/// cursor moves, goes through the single `cursor` mutex, so a writer always
/// sees the list and the cursor together and can keep the cursor in range.
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct RoutingTable {
    nodes: ArcSwap<Vec<NodeRecord>>,
    cursor: Mutex<usize>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            cursor: Mutex::new(0),
        }
    }
}

impl RoutingTable {
    /// Create an empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a routing table from an initial node list, in order.
    pub fn from_nodes(nodes: Vec<NodeRecord>) -> Result<Self, RegistryError> {
        let table = Self::new();
        for node in nodes {
            table.add(node)?;
        }
        Ok(table)
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a node. Fails if the name is taken.
    pub fn add(&self, node: NodeRecord) -> Result<(), RegistryError> {
        let _cursor = self.lock();
        let current = self.nodes.load();
        if current.iter().any(|n| n.name == node.name) {
            return Err(RegistryError::DuplicateName(node.name));
        }

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(node);
        self.nodes.store(Arc::new(next));
        Ok(())
    }

    /// Remove a node by name and return it.
    ///
    /// The cursor keeps pointing at the node that would have been served next,
    /// and is reset to 0 when it falls off the end.
    pub fn remove(&self, name: &str) -> Result<NodeRecord, RegistryError> {
        let mut cursor = self.lock();
        let current = self.nodes.load();
        let position = current
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        let mut next: Vec<NodeRecord> = current.iter().cloned().collect();
        let removed = next.remove(position);

        if position < *cursor {
            *cursor -= 1;
        }
        if *cursor >= next.len() {
            *cursor = 0;
        }

        self.nodes.store(Arc::new(next));
        Ok(removed)
    }

    /// Apply a partial update to a node and return the updated record.
    pub fn update(&self, name: &str, patch: &NodePatch) -> Result<NodeRecord, RegistryError> {
        let _cursor = self.lock();
        let current = self.nodes.load();
        let position = current
            .iter()
            .position(|n| n.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let Some(new_name) = &patch.name {
            if new_name != name && current.iter().any(|n| &n.name == new_name) {
                return Err(RegistryError::DuplicateName(new_name.clone()));
            }
        }

        let mut next: Vec<NodeRecord> = current.iter().cloned().collect();
        next[position].apply(patch);
        let updated = next[position].clone();
        self.nodes.store(Arc::new(next));
        Ok(updated)
    }

    /// Set the online flag of a node. Returns false if the node is unknown.
    pub fn set_online(&self, name: &str, online: bool) -> bool {
        self.modify(name, |node| node.online = online)
    }

    /// Store the latest probe result of a node. Returns false if the node is unknown.
    pub fn record_probe(&self, name: &str, report: ProbeReport) -> bool {
        self.modify(name, move |node| node.last_probe = Some(report))
    }

    fn modify(&self, name: &str, f: impl FnOnce(&mut NodeRecord)) -> bool {
        let _cursor = self.lock();
        let current = self.nodes.load();
        let Some(position) = current.iter().position(|n| n.name == name) else {
            return false;
        };

        let mut next: Vec<NodeRecord> = current.iter().cloned().collect();
        f(&mut next[position]);
        self.nodes.store(Arc::new(next));
        true
    }

    /// Look up a node by name.
    pub fn get(&self, name: &str) -> Option<NodeRecord> {
        self.nodes.load().iter().find(|n| n.name == name).cloned()
    }

    /// Retrieve a snapshot of all current nodes, in insertion order.
    pub fn list(&self) -> Arc<Vec<NodeRecord>> {
        self.nodes.load_full()
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    /// True when no node is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one node is eligible for dispatch.
    pub fn any_online(&self) -> bool {
        self.nodes.load().iter().any(|n| n.online)
    }

    /// The cursor position and the node it points at.
    pub fn current(&self) -> Option<(usize, NodeRecord)> {
        let cursor = self.lock();
        let nodes = self.nodes.load();
        nodes.get(*cursor).map(|node| (*cursor, node.clone()))
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        *self.lock()
    }

    /// Move the cursor one position forward, wrapping at the current size.
    pub fn advance(&self) -> usize {
        let mut cursor = self.lock();
        let len = self.nodes.load().len();
        *cursor = if len == 0 { 0 } else { (*cursor + 1) % len };
        *cursor
    }
}

/// A shared reference to the routing table.
pub type SharedRoutingTable = Arc<RoutingTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node(name: &str) -> NodeRecord {
        NodeRecord::new(name, format!("http://{}", name), "/check")
    }

    fn names(table: &RoutingTable) -> Vec<String> {
        table.list().iter().map(|n| n.name.clone()).collect()
    }

    #[test]
    fn add_keeps_insertion_order() {
        let table = RoutingTable::new();
        table.add(node("a")).unwrap();
        table.add(node("b")).unwrap();
        table.add(node("c")).unwrap();
        assert_eq!(names(&table), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_add_is_rejected_without_change() {
        let table = RoutingTable::new();
        table.add(node("a")).unwrap();

        let dup = node("a").with_online(false);
        assert_eq!(table.add(dup), Err(RegistryError::DuplicateName("a".into())));
        assert_eq!(table.len(), 1);
        assert!(table.get("a").unwrap().online);
    }

    #[test]
    fn from_nodes_rejects_duplicates() {
        let err = RoutingTable::from_nodes(vec![node("a"), node("a")]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("a".into()));
    }

    #[test]
    fn missing_nodes_report_not_found() {
        let table = RoutingTable::new();
        assert_eq!(table.remove("x"), Err(RegistryError::NotFound("x".into())));
        assert_eq!(
            table.update("x", &NodePatch::default()),
            Err(RegistryError::NotFound("x".into()))
        );
        assert!(!table.set_online("x", false));
    }

    #[test]
    fn update_is_partial_and_guards_renames() {
        let table = RoutingTable::from_nodes(vec![node("a"), node("b")]).unwrap();

        let updated = table
            .update("a", &NodePatch { online: Some(false), ..NodePatch::default() })
            .unwrap();
        assert!(!updated.online);
        assert_eq!(updated.uri, "http://a");

        let clash = NodePatch { name: Some("b".into()), ..NodePatch::default() };
        assert_eq!(table.update("a", &clash), Err(RegistryError::DuplicateName("b".into())));

        let rename = NodePatch { name: Some("z".into()), ..NodePatch::default() };
        table.update("a", &rename).unwrap();
        assert_eq!(names(&table), vec!["z", "b"]);
    }

    #[test]
    fn cursor_wraps_in_insertion_order() {
        let table = RoutingTable::from_nodes(vec![node("a"), node("b"), node("c")]).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(table.current().unwrap().1.name);
            table.advance();
        }
        assert_eq!(seen, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn removing_before_cursor_keeps_next_node() {
        let table = RoutingTable::from_nodes(vec![node("a"), node("b"), node("c")]).unwrap();
        table.advance();
        table.advance();
        assert_eq!(table.current().unwrap().1.name, "c");

        table.remove("a").unwrap();
        assert_eq!(table.current().unwrap(), (1, table.get("c").unwrap()));
    }

    #[test]
    fn removing_last_node_at_cursor_wraps_to_start() {
        let table = RoutingTable::from_nodes(vec![node("a"), node("b")]).unwrap();
        table.advance();
        table.remove("b").unwrap();
        assert_eq!(table.cursor(), 0);
        assert_eq!(table.current().unwrap().1.name, "a");

        table.remove("a").unwrap();
        assert_eq!(table.cursor(), 0);
        assert!(table.current().is_none());
        assert_eq!(table.advance(), 0);
    }

    #[test]
    fn snapshots_are_not_affected_by_later_writes() {
        let table = RoutingTable::from_nodes(vec![node("a")]).unwrap();
        let before = table.list();
        table.set_online("a", false);
        assert!(before[0].online);
        assert!(!table.get("a").unwrap().online);
        assert!(!table.any_online());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8),
        Advance,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Add),
            (0u8..8).prop_map(Op::Remove),
            Just(Op::Advance),
        ]
    }

    proptest! {
        #[test]
        fn names_stay_unique_and_counts_match(ops in proptest::collection::vec(op(), 0..64)) {
            let table = RoutingTable::new();
            let mut added = 0usize;
            let mut removed = 0usize;

            for op in ops {
                match op {
                    Op::Add(id) => {
                        if table.add(node(&format!("n{}", id))).is_ok() {
                            added += 1;
                        }
                    }
                    Op::Remove(id) => {
                        if table.remove(&format!("n{}", id)).is_ok() {
                            removed += 1;
                        }
                    }
                    Op::Advance => {
                        table.advance();
                    }
                }

                let mut seen = names(&table);
                prop_assert_eq!(seen.len(), added - removed);
                seen.sort();
                seen.dedup();
                prop_assert_eq!(seen.len(), table.len());
                prop_assert!(table.is_empty() || table.cursor() < table.len());
            }
        }
    }
}

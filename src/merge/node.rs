/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The merged tree (spec §4.D): one node per surviving GUID, carrying which
//! side(s) contributed it and what, if anything, changed about its value or
//! structure. Grounded on dogear's `MergedRoot`/`MergedDescendant` shape as
//! exposed through `bookmark_sync/store.rs`, generalised into a plain
//! GUID-keyed map since this crate doesn't own a SQL-backed tree walker.

use crate::guid::Guid;
use crate::record::MirrorItem;
use std::collections::{HashMap, HashSet};

/// How a node's value (everything except its children) was decided.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueState {
    /// Matches MIRROR; neither side changed it.
    Unchanged,
    /// LOCAL's value wins outright.
    Local,
    /// REMOTE's value wins outright.
    Remote,
    /// Neither side's record should be reused verbatim; a fresh value was
    /// synthesised (e.g. a deduped folder merged from two independent
    /// additions).
    New(MirrorItem),
}

/// How a folder's child order was decided.
#[derive(Debug, Clone, PartialEq)]
pub enum StructureState {
    Unchanged,
    Local,
    Remote,
    /// Neither side's order alone suffices; the listed order is the result
    /// of a topological merge of both.
    New(Vec<Guid>),
}

/// A single node of the merged tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTreeNode {
    pub guid: Guid,
    pub in_local: bool,
    pub in_mirror: bool,
    pub in_remote: bool,
    pub value_state: ValueState,
    pub structure_state: StructureState,
    /// Children, in final merged order. Empty for non-folders.
    pub merged_children: Vec<Guid>,
}

impl MergedTreeNode {
    pub fn is_value_changed(&self) -> bool {
        !matches!(self.value_state, ValueState::Unchanged)
    }

    pub fn is_structure_changed(&self) -> bool {
        !matches!(self.structure_state, StructureState::Unchanged)
    }
}

/// The merge output (spec §4.D): the merged tree itself, plus the
/// derived deletion sets the applier and result builder consume directly
/// instead of re-deriving from node state.
#[derive(Debug, Clone, Default)]
pub struct MergedTree {
    pub root: Option<Guid>,
    pub nodes: HashMap<Guid, MergedTreeNode>,
    /// GUIDs to remove from the LOCAL store (remote deletion accepted, or
    /// local never had it but must catch up to a remote tombstone).
    pub delete_locally: HashSet<Guid>,
    /// GUIDs to send a tombstone upstream for.
    pub delete_remotely: HashSet<Guid>,
    /// GUIDs to drop from the MIRROR snapshot once applied.
    pub delete_from_mirror: HashSet<Guid>,
    /// GUIDs where a REMOTE tombstone was honoured over a LOCAL change.
    pub accept_remote_deletion: HashSet<Guid>,
    /// GUIDs where a LOCAL tombstone was honoured over a REMOTE change.
    pub accept_local_deletion: HashSet<Guid>,
}

impl MergedTree {
    pub fn all_guids(&self) -> HashSet<Guid> {
        self.nodes.keys().cloned().collect()
    }

    pub fn get(&self, guid: &Guid) -> Option<&MergedTreeNode> {
        self.nodes.get(guid)
    }

    /// No changes of any kind were decided: nothing to upload, nothing to
    /// apply locally, nothing to delete anywhere (spec §4.D termination
    /// invariant).
    pub fn is_no_op(&self) -> bool {
        self.delete_locally.is_empty()
            && self.delete_remotely.is_empty()
            && self.delete_from_mirror.is_empty()
            && self
                .nodes
                .values()
                .all(|n| !n.is_value_changed() && !n.is_structure_changed())
    }

    /// Spec §3 I4, restated for the merge output: every merged-children
    /// reference resolves to a node present in this tree.
    pub fn is_fully_rooted_in_itself(&self) -> bool {
        let root = match &self.root {
            Some(r) => r.clone(),
            None => return true,
        };
        let mut stack = vec![root];
        let mut seen = HashSet::new();
        while let Some(guid) = stack.pop() {
            if !seen.insert(guid.clone()) {
                continue;
            }
            match self.nodes.get(&guid) {
                Some(node) => stack.extend(node.merged_children.iter().cloned()),
                None => return false,
            }
        }
        seen.len() == self.nodes.len()
    }

    /// A human-readable indented dump, grounded on `bookmark_sync`'s
    /// `to_ascii_string` test helper for `Tree`/`MergedNode`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Some(root) = &self.root {
            self.dump_node(root, 0, &mut out);
        }
        out
    }

    fn dump_node(&self, guid: &Guid, depth: usize, out: &mut String) {
        let node = match self.nodes.get(guid) {
            Some(n) => n,
            None => return,
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(guid.as_str());
        out.push_str(&format!(
            " (value={:?}, structure={:?})\n",
            node.value_state, node.structure_state
        ));
        for child in &node.merged_children {
            self.dump_node(child, depth + 1, out);
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The three-way merger itself (spec §4.D): walks LOCAL, MIRROR, and REMOTE
//! top-down from the canonical root, deciding a value state and a structure
//! state for every surviving GUID. Grounded on dogear's API surface as used
//! in `bookmark_sync/store.rs` (`MergedRoot`, `MergedDescendant`, `Deletion`,
//! `UploadReason`) for vocabulary; the decision rules themselves come
//! straight from spec §4.D, since the real merge logic in this codebase is
//! delegated to the external `dogear` crate rather than implemented here
//! (see DESIGN.md).

use super::node::{MergedTree, MergedTreeNode, StructureState, ValueState};
use crate::error::{ErrorKind, Result};
use crate::guid::Guid;
use crate::interrupt::{Interruptee, NeverInterrupts};
use crate::record::MirrorItem;
use crate::source::{BufferItemSource, LocalItemSource, MirrorItemSource};
use crate::tree::BookmarkTree;
use crate::types::{NodeKind, RootGuid};
use std::collections::{HashMap, HashSet};

enum SurvivingSide {
    Local,
    Remote,
}

/// Builds a `MergedTree` from three already-validated `BookmarkTree`s.
/// Borrowed for the duration of a single `merge()` call; not reusable
/// afterwards since it consumes itself.
pub struct Merger<'a> {
    local_tree: &'a BookmarkTree,
    mirror_tree: &'a BookmarkTree,
    remote_tree: &'a BookmarkTree,
    local_source: &'a dyn LocalItemSource,
    mirror_source: &'a dyn MirrorItemSource,
    remote_source: &'a dyn BufferItemSource,
    interruptee: &'a dyn Interruptee,

    nodes: HashMap<Guid, MergedTreeNode>,
    visited: HashSet<Guid>,
    pending_reparent: HashMap<Guid, Vec<Guid>>,
    delete_locally: HashSet<Guid>,
    delete_remotely: HashSet<Guid>,
    delete_from_mirror: HashSet<Guid>,
    accept_local_deletion: HashSet<Guid>,
    accept_remote_deletion: HashSet<Guid>,
}

impl<'a> Merger<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_tree: &'a BookmarkTree,
        mirror_tree: &'a BookmarkTree,
        remote_tree: &'a BookmarkTree,
        local_source: &'a dyn LocalItemSource,
        mirror_source: &'a dyn MirrorItemSource,
        remote_source: &'a dyn BufferItemSource,
    ) -> Self {
        Merger {
            local_tree,
            mirror_tree,
            remote_tree,
            local_source,
            mirror_source,
            remote_source,
            interruptee: &NeverInterrupts,
            nodes: HashMap::new(),
            visited: HashSet::new(),
            pending_reparent: HashMap::new(),
            delete_locally: HashSet::new(),
            delete_remotely: HashSet::new(),
            delete_from_mirror: HashSet::new(),
            accept_local_deletion: HashSet::new(),
            accept_remote_deletion: HashSet::new(),
        }
    }

    pub fn with_interruptee(mut self, interruptee: &'a dyn Interruptee) -> Self {
        self.interruptee = interruptee;
        self
    }

    /// Runs the merge to completion, or bails out with `ErrorKind::Aborted`
    /// (via `Interrupted`) if the green light goes out partway through.
    pub fn merge(mut self) -> Result<MergedTree> {
        self.interruptee.err_if_interrupted()?;

        let root_guid = RootGuid::Root.as_guid();
        self.visited.insert(root_guid.clone());
        let merged_children = self.merge_root_children()?;
        self.nodes.insert(
            root_guid.clone(),
            MergedTreeNode {
                guid: root_guid.clone(),
                in_local: true,
                in_mirror: true,
                in_remote: true,
                value_state: ValueState::Unchanged,
                structure_state: StructureState::Unchanged,
                merged_children,
            },
        );

        let merged = MergedTree {
            root: Some(root_guid),
            nodes: self.nodes,
            delete_locally: self.delete_locally,
            delete_remotely: self.delete_remotely,
            delete_from_mirror: self.delete_from_mirror,
            accept_local_deletion: self.accept_local_deletion,
            accept_remote_deletion: self.accept_remote_deletion,
        };
        log::debug!(
            "merge completed: {} nodes, {} to delete locally, {} to delete remotely",
            merged.nodes.len(),
            merged.delete_locally.len(),
            merged.delete_remotely.len()
        );
        Ok(merged)
    }

    /// The four canonical roots always exist, in canonical order, and are
    /// never individually deleted or reordered relative to each other (spec
    /// §4.D "Root handling"). Only their *contents* are merged.
    fn merge_root_children(&mut self) -> Result<Vec<Guid>> {
        let mut merged = Vec::with_capacity(4);
        for root in RootGuid::user_roots().iter() {
            let guid = root.as_guid();
            self.visited.insert(guid.clone());
            let (mut children, mut structure_state) = self.merge_children(&guid)?;

            if *root == RootGuid::Unfiled {
                self.reattach_orphans(&guid, &mut children, &mut structure_state)?;
            }

            self.nodes.insert(
                guid.clone(),
                MergedTreeNode {
                    guid: guid.clone(),
                    in_local: self.local_tree.contains(&guid),
                    in_mirror: self.mirror_tree.contains(&guid),
                    in_remote: self.remote_tree.contains(&guid),
                    value_state: ValueState::Unchanged,
                    structure_state,
                    merged_children: children,
                },
            );
            merged.push(guid);
        }
        Ok(merged)
    }

    /// Orphans (spec §3 "orphan"): GUIDs whose parent reference didn't
    /// resolve within their own tree. Reattached under `unfiled_____`,
    /// preserving the relative order siblings had under their lost parent
    /// (spec §4.D "Orphans") — each tree's `orphans` is already in
    /// structure-row order, so a straight chain-and-dedup keeps it.
    fn reattach_orphans(
        &mut self,
        unfiled_guid: &Guid,
        children: &mut Vec<Guid>,
        structure_state: &mut StructureState,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let orphans: Vec<Guid> = self
            .local_tree
            .orphans
            .iter()
            .chain(self.mirror_tree.orphans.iter())
            .chain(self.remote_tree.orphans.iter())
            .filter(|g| seen.insert((*g).clone()))
            .cloned()
            .collect();

        let mut extra = Vec::new();
        for orphan in orphans {
            if self.visited.contains(&orphan) {
                continue;
            }
            if let Some(resolved) = self.resolve_child(&orphan, unfiled_guid)? {
                extra.push(resolved);
            }
        }
        if !extra.is_empty() {
            children.extend(extra);
            *structure_state = StructureState::New(children.clone());
        }
        Ok(())
    }

    fn children_of(&self, tree: &BookmarkTree, guid: &Guid) -> Vec<Guid> {
        tree.get(guid).map(|n| n.children().to_vec()).unwrap_or_default()
    }

    /// Decides both the child order and the `StructureState` for `folder_guid`,
    /// then resolves each candidate child in turn (spec §4.D "Structure-state
    /// rules").
    fn merge_children(&mut self, folder_guid: &Guid) -> Result<(Vec<Guid>, StructureState)> {
        self.interruptee.err_if_interrupted()?;

        let mirror_children = self.children_of(self.mirror_tree, folder_guid);
        let remote_children = self.children_of(self.remote_tree, folder_guid);
        let raw_local_children = self.children_of(self.local_tree, folder_guid);
        let local_children =
            self.dedupe_new_folders(&raw_local_children, &mirror_children, &remote_children)?;

        let local_changed = local_children != mirror_children;
        let remote_changed = remote_children != mirror_children;

        let (order, structure_state) = match (local_changed, remote_changed) {
            (false, false) => (mirror_children.clone(), StructureState::Unchanged),
            (true, false) => (local_children.clone(), StructureState::Local),
            (false, true) => (remote_children.clone(), StructureState::Remote),
            (true, true) => {
                let merged = topological_merge(&mirror_children, &local_children, &remote_children);
                (merged.clone(), StructureState::New(merged))
            }
        };

        let mut merged_children = Vec::with_capacity(order.len());
        for child in &order {
            if self.visited.contains(child) {
                continue;
            }
            if let Some(resolved) = self.resolve_child(child, folder_guid)? {
                merged_children.push(resolved);
            }
        }

        // A deleted child is, by construction, absent from whichever side
        // dropped it — so a single-sided structure change (the `order` above
        // being just `local_children` or just `remote_children`) can leave a
        // tombstoned MIRROR child out of `order` entirely, skipping
        // `resolve_deletion` and its reparenting side effects. Catch those
        // here. A child that merely moved elsewhere (not tombstoned) is left
        // alone: it's in neither deleted set, so this is a no-op for it, and
        // whichever folder's own order list claims it resolves it normally.
        for child in &mirror_children {
            if self.visited.contains(child) || order.contains(child) {
                continue;
            }
            if self.local_tree.deleted.contains(child) || self.remote_tree.deleted.contains(child) {
                self.resolve_child(child, folder_guid)?;
            }
        }

        let (merged_children, structure_state) =
            if let Some(extra) = self.pending_reparent.remove(folder_guid) {
                let mut children = merged_children;
                children.extend(extra);
                (children.clone(), StructureState::New(children))
            } else {
                (merged_children, structure_state)
            };

        Ok((merged_children, structure_state))
    }

    /// Duplicate-folder matching (spec §4.D): a folder LOCAL added that
    /// content-matches one REMOTE also added, under the same parent,
    /// collapses to the REMOTE GUID — the LOCAL GUID is scheduled for
    /// deletion from LOCAL storage instead of being merged in separately.
    /// GUIDs already in MIRROR are never candidates; this only applies to
    /// genuinely new, never-before-synced folders on both sides.
    fn dedupe_new_folders(
        &mut self,
        local_children: &[Guid],
        mirror_children: &[Guid],
        remote_children: &[Guid],
    ) -> Result<Vec<Guid>> {
        let mirror_set: HashSet<&Guid> = mirror_children.iter().collect();
        let local_new: Vec<Guid> = local_children
            .iter()
            .filter(|g| !mirror_set.contains(g))
            .cloned()
            .collect();
        let remote_new: Vec<Guid> = remote_children
            .iter()
            .filter(|g| !mirror_set.contains(g))
            .cloned()
            .collect();

        let mut substitutions: HashMap<Guid, Guid> = HashMap::new();
        for local_guid in &local_new {
            if self.visited.contains(local_guid) {
                continue;
            }
            let local_item = match self.local_source.get(local_guid)? {
                Some(item) if item.kind == NodeKind::Folder => item,
                _ => continue,
            };
            let already_matched: HashSet<&Guid> = substitutions.values().collect();
            for remote_guid in &remote_new {
                if already_matched.contains(remote_guid) {
                    continue;
                }
                let remote_item = match self.remote_source.get(remote_guid)? {
                    Some(item) if item.kind == NodeKind::Folder => item,
                    _ => continue,
                };
                if local_item.same_as(&remote_item) {
                    substitutions.insert(local_guid.clone(), remote_guid.clone());
                    break;
                }
            }
        }

        for local_guid in substitutions.keys() {
            self.visited.insert(local_guid.clone());
            self.delete_locally.insert(local_guid.clone());
        }

        Ok(local_children
            .iter()
            .map(|g| substitutions.get(g).cloned().unwrap_or_else(|| g.clone()))
            .collect())
    }

    /// Decides what happens to a single candidate child: either it's
    /// deleted (in which case it never enters the merged tree, though its
    /// own live children may be reparented elsewhere), or it survives and
    /// its value/structure are merged.
    fn resolve_child(&mut self, guid: &Guid, parent_guid: &Guid) -> Result<Option<Guid>> {
        self.interruptee.err_if_interrupted()?;
        if !self.visited.insert(guid.clone()) {
            return Ok(None);
        }

        let local_deleted = self.local_tree.deleted.contains(guid);
        let remote_deleted = self.remote_tree.deleted.contains(guid);

        if local_deleted || remote_deleted {
            log::trace!(
                "{} under {}: deleted (local={}, remote={})",
                guid, parent_guid, local_deleted, remote_deleted
            );
            self.resolve_deletion(guid, local_deleted, remote_deleted)?;
            return Ok(None);
        }

        log::trace!("{} under {}: surviving, merging value and structure", guid, parent_guid);
        self.build_node(guid, parent_guid)?;
        Ok(Some(guid.clone()))
    }

    /// Move-vs-delete conflict resolution (spec §4.D): deletion always wins
    /// over a live modification on the other side; the other side's live
    /// children, if any, are reparented onto the lowest surviving ancestor
    /// rather than silently discarded (spec P3 conservation).
    fn resolve_deletion(&mut self, guid: &Guid, local_deleted: bool, remote_deleted: bool) -> Result<()> {
        self.delete_from_mirror.insert(guid.clone());

        if local_deleted && remote_deleted {
            return Ok(());
        }

        if local_deleted {
            self.accept_local_deletion.insert(guid.clone());
            self.delete_remotely.insert(guid.clone());
            if self.remote_tree.contains(guid) {
                self.reparent_orphaned_children(guid, SurvivingSide::Remote)?;
            }
            return Ok(());
        }

        // remote_deleted
        self.accept_remote_deletion.insert(guid.clone());
        self.delete_locally.insert(guid.clone());
        if self.local_tree.contains(guid) {
            self.reparent_orphaned_children(guid, SurvivingSide::Local)?;
        }
        Ok(())
    }

    fn reparent_orphaned_children(&mut self, deleted_guid: &Guid, side: SurvivingSide) -> Result<()> {
        let children = match side {
            SurvivingSide::Local => self.children_of(self.local_tree, deleted_guid),
            SurvivingSide::Remote => self.children_of(self.remote_tree, deleted_guid),
        };
        if children.is_empty() {
            return Ok(());
        }
        let ancestor = self.lowest_surviving_ancestor(deleted_guid);
        for child in children {
            if self.visited.contains(&child) {
                continue;
            }
            if let Some(resolved) = self.resolve_child(&child, &ancestor)? {
                self.pending_reparent
                    .entry(ancestor.clone())
                    .or_default()
                    .push(resolved);
            }
        }
        Ok(())
    }

    /// Walks up `guid`'s parent chain (mirror first, since that's the last
    /// agreed-upon structure, falling back to local/remote) until it finds
    /// an ancestor that isn't itself being deleted in this merge. The
    /// canonical roots always qualify, so this always terminates.
    fn lowest_surviving_ancestor(&self, guid: &Guid) -> Guid {
        let mut cur = guid.clone();
        loop {
            let parent = self
                .mirror_tree
                .parent_of(&cur)
                .or_else(|| self.local_tree.parent_of(&cur))
                .or_else(|| self.remote_tree.parent_of(&cur))
                .cloned();
            match parent {
                Some(p) => {
                    if RootGuid::from_guid(&p).is_some() || !self.is_deleted_in_merge(&p) {
                        return p;
                    }
                    cur = p;
                }
                None => return RootGuid::Unfiled.as_guid(),
            }
        }
    }

    fn is_deleted_in_merge(&self, guid: &Guid) -> bool {
        self.local_tree.deleted.contains(guid) || self.remote_tree.deleted.contains(guid)
    }

    /// A tree says `guid` is present but its item source can't resolve it —
    /// an inconsistency between the structure rows and the value rows.
    /// Recovered from by degrading this side's opinion to "doesn't mention
    /// it" (`ErrorKind::NotFound`, logged rather than propagated; see
    /// `TreeNode::Unknown` for the analogous degrade at tree-build time).
    fn degrade_if_missing(&self, guid: &Guid, side: &str, in_side: bool, item: &Option<MirrorItem>) -> bool {
        if in_side && item.is_none() {
            log::warn!("{} {}: degrading to unknown", side, ErrorKind::NotFound(guid.clone()));
            false
        } else {
            in_side
        }
    }

    /// Merges a surviving node's value and, if it's a folder, its children.
    fn build_node(&mut self, guid: &Guid, _parent_guid: &Guid) -> Result<()> {
        let in_local = self.local_tree.contains(guid);
        let in_mirror = self.mirror_tree.contains(guid);
        let in_remote = self.remote_tree.contains(guid);

        let local_item = if in_local { self.local_source.get(guid)? } else { None };
        let mirror_item = if in_mirror { self.mirror_source.get(guid)? } else { None };
        let remote_item = if in_remote { self.remote_source.get(guid)? } else { None };

        let local_available = self.degrade_if_missing(guid, "local", in_local, &local_item);
        let mirror_available = self.degrade_if_missing(guid, "mirror", in_mirror, &mirror_item);
        let remote_available = self.degrade_if_missing(guid, "remote", in_remote, &remote_item);

        let local_changed = value_changed(
            local_available,
            mirror_available,
            self.local_tree.modified.contains(guid),
            &local_item,
            &mirror_item,
        );
        let remote_changed = value_changed(
            remote_available,
            mirror_available,
            self.remote_tree.modified.contains(guid),
            &remote_item,
            &mirror_item,
        );

        let value_state = match (local_changed, remote_changed) {
            (false, false) => ValueState::Unchanged,
            (true, false) => ValueState::Local,
            (false, true) => ValueState::Remote,
            // Value-state rules (spec §4.D): both sides changed the value.
            // If they converged on the same content there's no real
            // conflict, but REMOTE's record is still what we keep — the
            // server's copy is canonical once both sides agree. If they
            // genuinely differ, REMOTE also wins (server wins on
            // differing conflicts).
            (true, true) => ValueState::Remote,
        };

        log::trace!(
            "{}: value_state={:?} (local_changed={}, remote_changed={})",
            guid, value_state, local_changed, remote_changed
        );

        let is_folder = local_item
            .as_ref()
            .or(mirror_item.as_ref())
            .or(remote_item.as_ref())
            .map(|item| item.kind == NodeKind::Folder)
            .unwrap_or(false);

        let (merged_children, structure_state) = if is_folder {
            self.merge_children(guid)?
        } else {
            (Vec::new(), StructureState::Unchanged)
        };

        self.nodes.insert(
            guid.clone(),
            MergedTreeNode {
                guid: guid.clone(),
                in_local,
                in_mirror,
                in_remote,
                value_state,
                structure_state,
                merged_children,
            },
        );
        Ok(())
    }
}

/// Whether `side` has changed this node's value relative to MIRROR. A side
/// that doesn't mention this GUID at all has no opinion and contributes no
/// change (spec §4.D treats silence as "inherits MIRROR"); a side that has
/// it but MIRROR doesn't is a brand-new addition; otherwise fall back to the
/// tree's `modified` flag if the records themselves can't be compared.
fn value_changed(
    in_side: bool,
    in_mirror: bool,
    modified: bool,
    side_item: &Option<MirrorItem>,
    mirror_item: &Option<MirrorItem>,
) -> bool {
    if !in_side {
        return false;
    }
    if !in_mirror {
        return true;
    }
    match (side_item, mirror_item) {
        (Some(s), Some(m)) => !values_equal_ignoring_children(s, m),
        _ => modified,
    }
}

/// Like `MirrorItem::same_as`, but ignores child order too: structure is
/// merged separately, so value-state decisions shouldn't be tripped up by a
/// folder whose contents moved but whose own title/kind/etc. didn't change.
fn values_equal_ignoring_children(a: &MirrorItem, b: &MirrorItem) -> bool {
    a.kind == b.kind
        && a.is_deleted == b.is_deleted
        && a.has_dupe == b.has_dupe
        && a.parent_name == b.parent_name
        && a.feed_uri == b.feed_uri
        && a.site_uri == b.site_uri
        && a.pos == b.pos
        && a.title == b.title
        && a.description == b.description
        && a.bookmark_uri == b.bookmark_uri
        && a.tags == b.tags
        && a.keyword == b.keyword
        && a.folder_name == b.folder_name
        && a.query_id == b.query_id
}

/// Merges two candidate child orders against their common MIRROR baseline
/// (spec §4.D "Structure-state rules", both-sides-changed case). REMOTE's
/// order is authoritative wherever REMOTE expresses an opinion; any
/// LOCAL-only addition is inserted next to its nearest already-placed LOCAL
/// neighbour; anything MIRROR still remembers that neither side dropped is
/// appended last so nothing is silently lost.
fn topological_merge(mirror: &[Guid], local: &[Guid], remote: &[Guid]) -> Vec<Guid> {
    let mut result: Vec<Guid> = Vec::with_capacity(local.len().max(remote.len()));
    let mut seen: HashSet<Guid> = HashSet::new();

    for guid in remote {
        if seen.insert(guid.clone()) {
            result.push(guid.clone());
        }
    }

    for (i, guid) in local.iter().enumerate() {
        if seen.contains(guid) {
            continue;
        }
        seen.insert(guid.clone());
        let insert_at = local[..i]
            .iter()
            .rev()
            .find_map(|prev| result.iter().position(|r| r == prev))
            .map(|pos| pos + 1)
            .unwrap_or(0);
        result.insert(insert_at.min(result.len()), guid.clone());
    }

    for guid in mirror {
        if seen.insert(guid.clone()) {
            result.push(guid.clone());
        }
    }

    result
}

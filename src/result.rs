/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The result builder (spec §4.E, §6): flattens a `MergedTree` into the four
//! operation batches the applier hands to its `Uploader`/`Storage`
//! collaborators. Grounded on `store.rs`'s split between
//! `stage_local_items_to_upload()` (outgoing) and `update_local_items()`
//! (mirror write), generalised into typed operation records per spec §6
//! rather than direct SQL statements.

use crate::error::Result;
use crate::guid::Guid;
use crate::merge::{MergedTree, MergedTreeNode, ValueState};
use crate::record::MirrorItem;
use crate::source::{BufferItemSource, LocalItemSource, MirrorItemSource};
use crate::tree::BookmarkTree;
use crate::types::{NodeKind, ServerTimestamp};
use std::collections::{HashMap, HashSet};

/// Outgoing records to POST upstream.
#[derive(Debug, Clone, Default)]
pub struct UpstreamCompletionOp {
    pub records: Vec<MirrorItem>,
}

/// What the uploader handed back after a POST.
#[derive(Debug, Clone)]
pub struct POSTResult {
    pub modified: ServerTimestamp,
    pub success: Vec<Guid>,
    pub failed: HashMap<Guid, String>,
}

/// GUIDs to drop from the incoming buffer once this pass lands.
#[derive(Debug, Clone, Default)]
pub struct BufferCompletionOp {
    pub processed_buffer_guids: HashSet<Guid>,
}

/// What to write into the mirror to make it reflect this merge.
#[derive(Debug, Clone, Default)]
pub struct LocalOverrideCompletionOp {
    pub mirror_values_to_copy_from_buffer: Vec<MirrorItem>,
    pub mirror_values_to_copy_from_local: Vec<MirrorItem>,
    pub mirror_items_to_delete: HashSet<Guid>,
    pub modified_times: HashMap<Guid, ServerTimestamp>,
}

/// The full output of the result builder, handed to the applier.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub upstream: UpstreamCompletionOp,
    pub buffer: BufferCompletionOp,
    pub local_override: LocalOverrideCompletionOp,
}

impl MergeResult {
    pub fn is_no_op(&self) -> bool {
        self.upstream.records.is_empty()
            && self.local_override.mirror_values_to_copy_from_buffer.is_empty()
            && self.local_override.mirror_values_to_copy_from_local.is_empty()
            && self.local_override.mirror_items_to_delete.is_empty()
    }
}

/// Flattens a `MergedTree` into the four operation batches (spec §4.E).
pub struct ResultBuilder<'a> {
    merged: &'a MergedTree,
    mirror_tree: &'a BookmarkTree,
    remote_tree: &'a BookmarkTree,
    local_source: &'a dyn LocalItemSource,
    mirror_source: &'a dyn MirrorItemSource,
    remote_source: &'a dyn BufferItemSource,
}

impl<'a> ResultBuilder<'a> {
    pub fn new(
        merged: &'a MergedTree,
        mirror_tree: &'a BookmarkTree,
        remote_tree: &'a BookmarkTree,
        local_source: &'a dyn LocalItemSource,
        mirror_source: &'a dyn MirrorItemSource,
        remote_source: &'a dyn BufferItemSource,
    ) -> Self {
        ResultBuilder {
            merged,
            mirror_tree,
            remote_tree,
            local_source,
            mirror_source,
            remote_source,
        }
    }

    pub fn build(&self) -> Result<MergeResult> {
        if self.merged.is_no_op() {
            log::debug!("merge was a no-op; nothing to upload or apply");
            return Ok(MergeResult::default());
        }

        let parent_map = self.build_parent_map();

        let mut records = Vec::new();
        let mut mirror_from_buffer = Vec::new();
        let mut mirror_from_local = Vec::new();

        for node in self.merged.nodes.values() {
            match &node.value_state {
                ValueState::Local => {
                    if let Some(item) = self.local_source.get(&node.guid)? {
                        let item = self.with_structure(item, node, &parent_map);
                        records.push(item.clone());
                        mirror_from_local.push(item);
                    }
                }
                ValueState::New(item) => {
                    let item = self.with_structure(item.clone(), node, &parent_map);
                    records.push(item.clone());
                    mirror_from_local.push(item);
                }
                ValueState::Remote => {
                    if let Some(mut item) = self.remote_source.get(&node.guid)? {
                        // Favicon preservation (spec §4.D): the server never
                        // carries faviconID, so keep LOCAL's if it has one.
                        if item.favicon_id.is_none() {
                            if let Some(local_item) = self.local_source.get(&node.guid)? {
                                item.favicon_id = local_item.favicon_id;
                            }
                        }
                        mirror_from_buffer.push(self.with_structure(item, node, &parent_map));
                    }
                }
                ValueState::Unchanged => {
                    let parent_changed = parent_map.get(&node.guid).cloned()
                        != self.mirror_tree.parent_of(&node.guid).cloned();
                    if node.is_structure_changed() || parent_changed {
                        if let Some(item) = self.resolve_unchanged_value(&node.guid)? {
                            mirror_from_local.push(self.with_structure(item, node, &parent_map));
                        }
                    }
                }
            }
        }

        for guid in &self.merged.delete_remotely {
            records.push(MirrorItem::tombstone(guid.clone()));
        }

        let result = MergeResult {
            upstream: UpstreamCompletionOp { records },
            buffer: BufferCompletionOp {
                processed_buffer_guids: self.remote_tree.all_guids(),
            },
            local_override: LocalOverrideCompletionOp {
                mirror_values_to_copy_from_buffer: mirror_from_buffer,
                mirror_values_to_copy_from_local: mirror_from_local,
                mirror_items_to_delete: self.merged.delete_from_mirror.clone(),
                modified_times: HashMap::new(),
            },
        };
        log::debug!(
            "result built: {} upstream record(s), {} mirror deletion(s)",
            result.upstream.records.len(),
            result.local_override.mirror_items_to_delete.len()
        );
        Ok(result)
    }

    /// A value whose *structure* changed but whose *value* didn't still
    /// needs its mirror row rewritten (new parent/position); any source
    /// that has the record will do, since the value itself is unchanged.
    fn resolve_unchanged_value(&self, guid: &Guid) -> Result<Option<MirrorItem>> {
        if let Some(item) = self.mirror_source.get(guid)? {
            return Ok(Some(item));
        }
        if let Some(item) = self.local_source.get(guid)? {
            return Ok(Some(item));
        }
        self.remote_source.get(guid)
    }

    fn build_parent_map(&self) -> HashMap<Guid, Guid> {
        let mut parents = HashMap::new();
        for (parent, node) in &self.merged.nodes {
            for child in &node.merged_children {
                parents.insert(child.clone(), parent.clone());
            }
        }
        parents
    }

    fn with_structure(
        &self,
        mut item: MirrorItem,
        node: &MergedTreeNode,
        parent_map: &HashMap<Guid, Guid>,
    ) -> MirrorItem {
        item.parent_id = parent_map.get(&node.guid).cloned();
        if item.kind == NodeKind::Folder {
            item.children = node.merged_children.clone();
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{MergedTreeNode, StructureState};
    use crate::types::RootGuid;

    fn g(s: &str) -> Guid {
        Guid::from(s)
    }

    #[test]
    fn test_no_op_result_is_empty() {
        let merged = MergedTree::default();
        let remote_tree = BookmarkTree::empty();
        let local_source = crate::source::MapItemSource::new();
        let mirror_tree = BookmarkTree::empty();
        let builder = ResultBuilder::new(&merged, &mirror_tree, &remote_tree, &local_source, &local_source, &local_source);
        let result = builder.build().unwrap();
        assert!(result.is_no_op());
    }

    #[test]
    fn test_local_value_state_becomes_upstream_record() {
        let mut merged = MergedTree::default();
        merged.root = Some(RootGuid::Root.as_guid());
        merged.nodes.insert(
            g("aaaaaaaaaaaa"),
            MergedTreeNode {
                guid: g("aaaaaaaaaaaa"),
                in_local: true,
                in_mirror: false,
                in_remote: false,
                value_state: ValueState::Local,
                structure_state: StructureState::Unchanged,
                merged_children: Vec::new(),
            },
        );

        let remote_tree = BookmarkTree::empty();
        let mut local_source = crate::source::MapItemSource::new();
        local_source.insert(MirrorItem::new_bookmark(
            g("aaaaaaaaaaaa"),
            Some("Example".into()),
            Some("https://example.com".into()),
        ));
        let remote_source = crate::source::MapItemSource::new();

        let mirror_tree = BookmarkTree::empty();
        let builder = ResultBuilder::new(&merged, &mirror_tree, &remote_tree, &local_source, &remote_source, &remote_source);
        let result = builder.build().unwrap();
        assert_eq!(result.upstream.records.len(), 1);
        assert_eq!(result.local_override.mirror_values_to_copy_from_local.len(), 1);
        assert!(!result.is_no_op());
    }

    #[test]
    fn test_delete_remotely_produces_tombstone() {
        let mut merged = MergedTree::default();
        merged.delete_remotely.insert(g("bbbbbbbbbbbb"));
        merged.delete_from_mirror.insert(g("bbbbbbbbbbbb"));

        let remote_tree = BookmarkTree::empty();
        let source = crate::source::MapItemSource::new();
        let mirror_tree = BookmarkTree::empty();
        let builder = ResultBuilder::new(&merged, &mirror_tree, &remote_tree, &source, &source, &source);
        let result = builder.build().unwrap();

        assert_eq!(result.upstream.records.len(), 1);
        assert!(result.upstream.records[0].is_deleted);
        assert!(result.local_override.mirror_items_to_delete.contains(&g("bbbbbbbbbbbb")));
    }
}

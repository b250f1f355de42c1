/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The applier (spec §4.F): orchestrates tree building, merging, result
//! building, upload, and the atomic mirror/buffer write, polling the green
//! light at each major stage. Grounded on `BookmarksStore::stage_incoming`'s
//! transaction + interruptee-polling pattern, and `Merger::apply`'s
//! `update_local_items()` / `stage_local_items_to_upload()` / commit
//! sequencing in `store.rs`.

use crate::error::Result;
use crate::guid::Guid;
use crate::interrupt::Interruptee;
use crate::merge::Merger;
use crate::result::{
    BufferCompletionOp, LocalOverrideCompletionOp, POSTResult, ResultBuilder, UpstreamCompletionOp,
};
use crate::source::{BufferItemSource, LocalItemSource, MirrorItemSource};
use crate::tree::{BookmarkTree, TreeBuilder};
use crate::types::NodeKind;
use std::collections::HashMap;

/// Enumerates the value/structure/tombstone rows backing one side (LOCAL,
/// MIRROR, or BUFFER) so the applier can build a `BookmarkTree` via
/// component C without depending on a concrete row store. This is the
/// "inject explicit parameters" redesign flag (spec §9) applied to tree
/// construction, the same way `LocalItemSource`/etc. apply it to per-GUID
/// value lookups.
pub trait RowSource {
    fn values(&self) -> Result<Vec<(Guid, NodeKind)>>;
    fn structure(&self) -> Result<Vec<(Guid, Guid, i64)>>;
    fn tombstones(&self) -> Result<Vec<Guid>>;
    fn modified(&self) -> Result<Vec<Guid>>;
}

fn build_tree(rows: &dyn RowSource) -> Result<BookmarkTree> {
    let mut builder = TreeBuilder::new();
    for (guid, kind) in rows.values()? {
        builder.value(guid, kind);
    }
    for (parent, child, index) in rows.structure()? {
        builder.structure(parent, child, index);
    }
    for guid in rows.tombstones()? {
        builder.tombstone(guid);
    }
    for guid in rows.modified()? {
        builder.modified(guid);
    }
    builder.into_tree()
}

/// POSTs an `UpstreamCompletionOp` to the sync server. The only collaborator
/// that talks to the network.
pub trait Uploader {
    fn post(&self, op: UpstreamCompletionOp) -> Result<POSTResult>;
}

/// Applies the mirror/buffer side effects of a completed merge. `Storage`
/// brackets `apply_local_override` and `complete_buffer` in a single
/// transaction so an external reader never observes one applied without the
/// other (spec §5 "shared resources").
pub trait Storage {
    fn begin_transaction(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn apply_local_override(&self, op: LocalOverrideCompletionOp) -> Result<()>;
    fn complete_buffer(&self, op: BufferCompletionOp) -> Result<()>;
}

/// Distinguishes a clean cancellation from a completed pass; an abort is not
/// an error (spec §5.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied { upload_failures: HashMap<Guid, String> },
    Aborted,
}

/// Orchestrates one sync pass end to end (spec §4.F).
#[allow(clippy::too_many_arguments)]
pub struct Applier<'a> {
    local_rows: &'a dyn RowSource,
    mirror_rows: &'a dyn RowSource,
    remote_rows: &'a dyn RowSource,
    local_source: &'a dyn LocalItemSource,
    mirror_source: &'a dyn MirrorItemSource,
    remote_source: &'a dyn BufferItemSource,
    uploader: &'a dyn Uploader,
    storage: &'a dyn Storage,
    interruptee: &'a dyn Interruptee,
}

impl<'a> Applier<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local_rows: &'a dyn RowSource,
        mirror_rows: &'a dyn RowSource,
        remote_rows: &'a dyn RowSource,
        local_source: &'a dyn LocalItemSource,
        mirror_source: &'a dyn MirrorItemSource,
        remote_source: &'a dyn BufferItemSource,
        uploader: &'a dyn Uploader,
        storage: &'a dyn Storage,
        interruptee: &'a dyn Interruptee,
    ) -> Self {
        Applier {
            local_rows,
            mirror_rows,
            remote_rows,
            local_source,
            mirror_source,
            remote_source,
            uploader,
            storage,
            interruptee,
        }
    }

    fn green_light(&self) -> bool {
        self.interruptee.err_if_interrupted().is_ok()
    }

    pub fn apply(&self) -> Result<Outcome> {
        if !self.green_light() {
            return Ok(Outcome::Aborted);
        }

        let local_tree = build_tree(self.local_rows)?;
        let mirror_tree = build_tree(self.mirror_rows)?;
        let remote_tree = build_tree(self.remote_rows)?;

        if !self.green_light() {
            return Ok(Outcome::Aborted);
        }

        let merger = Merger::new(
            &local_tree,
            &mirror_tree,
            &remote_tree,
            self.local_source,
            self.mirror_source,
            self.remote_source,
        )
        .with_interruptee(self.interruptee);
        let merged = merger.merge()?;

        if merged.is_no_op() {
            log::debug!("merge was a no-op; nothing to upload or apply");
            return Ok(Outcome::Applied {
                upload_failures: HashMap::new(),
            });
        }

        let result = ResultBuilder::new(
            &merged,
            &mirror_tree,
            &remote_tree,
            self.local_source,
            self.mirror_source,
            self.remote_source,
        )
        .build()?;

        if !self.green_light() {
            return Ok(Outcome::Aborted);
        }
        let post_result = self.uploader.post(result.upstream)?;

        if !self.green_light() {
            return Ok(Outcome::Aborted);
        }

        let mut local_override = result.local_override;
        local_override
            .mirror_values_to_copy_from_local
            .retain(|item| !post_result.failed.contains_key(&item.guid));
        for guid in &post_result.success {
            local_override
                .modified_times
                .insert(guid.clone(), post_result.modified);
        }

        self.storage.begin_transaction()?;
        self.storage.apply_local_override(local_override)?;
        self.storage.complete_buffer(result.buffer)?;
        self.storage.commit()?;

        log::debug!(
            "applier finished: {} uploaded, {} failed",
            post_result.success.len(),
            post_result.failed.len()
        );
        Ok(Outcome::Applied {
            upload_failures: post_result.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::NeverInterrupts;
    use crate::record::MirrorItem;
    use crate::source::MapItemSource;
    use crate::types::{RootGuid, ServerTimestamp};
    use std::cell::{Cell, RefCell};

    fn g(s: &str) -> Guid {
        Guid::from(s)
    }

    struct StaticRowSource {
        values: Vec<(Guid, NodeKind)>,
        structure: Vec<(Guid, Guid, i64)>,
        tombstones: Vec<Guid>,
        modified: Vec<Guid>,
    }

    impl StaticRowSource {
        fn empty_mirror_skeleton() -> Self {
            let mut values = vec![(g("root________"), NodeKind::Folder)];
            let mut structure = Vec::new();
            for root in RootGuid::user_roots().iter() {
                let guid = root.as_guid();
                values.push((guid.clone(), NodeKind::Folder));
                structure.push((g("root________"), guid, 0));
            }
            StaticRowSource {
                values,
                structure,
                tombstones: Vec::new(),
                modified: Vec::new(),
            }
        }
    }

    impl RowSource for StaticRowSource {
        fn values(&self) -> Result<Vec<(Guid, NodeKind)>> {
            Ok(self.values.clone())
        }
        fn structure(&self) -> Result<Vec<(Guid, Guid, i64)>> {
            Ok(self.structure.clone())
        }
        fn tombstones(&self) -> Result<Vec<Guid>> {
            Ok(self.tombstones.clone())
        }
        fn modified(&self) -> Result<Vec<Guid>> {
            Ok(self.modified.clone())
        }
    }

    struct AlwaysSucceedsUploader;

    impl Uploader for AlwaysSucceedsUploader {
        fn post(&self, op: UpstreamCompletionOp) -> Result<POSTResult> {
            Ok(POSTResult {
                modified: ServerTimestamp(1_000),
                success: op.records.iter().map(|r| r.guid.clone()).collect(),
                failed: HashMap::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        began: Cell<bool>,
        committed: Cell<bool>,
        applied_override: RefCell<Option<LocalOverrideCompletionOp>>,
        completed_buffer: RefCell<Option<BufferCompletionOp>>,
    }

    impl Storage for RecordingStorage {
        fn begin_transaction(&self) -> Result<()> {
            self.began.set(true);
            Ok(())
        }
        fn commit(&self) -> Result<()> {
            self.committed.set(true);
            Ok(())
        }
        fn apply_local_override(&self, op: LocalOverrideCompletionOp) -> Result<()> {
            *self.applied_override.borrow_mut() = Some(op);
            Ok(())
        }
        fn complete_buffer(&self, op: BufferCompletionOp) -> Result<()> {
            *self.completed_buffer.borrow_mut() = Some(op);
            Ok(())
        }
    }

    #[test]
    fn test_first_sync_local_only_applies_and_uploads() {
        let mirror_rows = StaticRowSource::empty_mirror_skeleton();
        let remote_rows = StaticRowSource::empty_mirror_skeleton();
        let mut local_rows = StaticRowSource::empty_mirror_skeleton();
        local_rows.values.push((g("aaaaaaaaaaaa"), NodeKind::Bookmark));
        local_rows.structure.push((g("menu________"), g("aaaaaaaaaaaa"), 0));

        let mut local_source = MapItemSource::new();
        local_source.insert(MirrorItem::new_bookmark(
            g("aaaaaaaaaaaa"),
            Some("Example".into()),
            Some("https://example.com".into()),
        ));
        let mirror_source = MapItemSource::new();
        let remote_source = MapItemSource::new();

        let uploader = AlwaysSucceedsUploader;
        let storage = RecordingStorage::default();

        let applier = Applier::new(
            &local_rows,
            &mirror_rows,
            &remote_rows,
            &local_source,
            &mirror_source,
            &remote_source,
            &uploader,
            &storage,
            &NeverInterrupts,
        );

        let outcome = applier.apply().unwrap();
        match outcome {
            Outcome::Applied { upload_failures } => assert!(upload_failures.is_empty()),
            Outcome::Aborted => panic!("expected Applied"),
        }
        assert!(storage.began.get());
        assert!(storage.committed.get());
        assert!(storage.applied_override.borrow().is_some());
        assert!(storage.completed_buffer.borrow().is_some());
    }

    #[test]
    fn test_empty_empty_empty_is_a_no_op_without_storage_writes() {
        let mirror_rows = StaticRowSource::empty_mirror_skeleton();
        let remote_rows = StaticRowSource::empty_mirror_skeleton();
        let local_rows = StaticRowSource::empty_mirror_skeleton();
        let source = MapItemSource::new();
        let uploader = AlwaysSucceedsUploader;
        let storage = RecordingStorage::default();

        let applier = Applier::new(
            &local_rows,
            &mirror_rows,
            &remote_rows,
            &source,
            &source,
            &source,
            &uploader,
            &storage,
            &NeverInterrupts,
        );

        let outcome = applier.apply().unwrap();
        assert_eq!(
            outcome,
            Outcome::Applied {
                upload_failures: HashMap::new()
            }
        );
        assert!(!storage.began.get());
    }
}

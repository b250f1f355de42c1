/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Three-way bookmark tree merger.
//!
//! Reconciles a LOCAL tree (client edits since the last sync), a MIRROR tree
//! (the last-known synced snapshot), and a REMOTE tree (incoming server
//! records) into a single MERGED tree, then flattens that merge into the
//! operation batches an external storage/upload layer applies: records to
//! POST upstream, mirror rows to rewrite, and buffer rows to retire.
//!
//! Persistence, the wire protocol, and any UI are explicitly out of scope:
//! this crate exposes the read interfaces (`source`) and write collaborators
//! (`applier::Uploader`, `applier::Storage`) as traits for a host application
//! to implement over its own row store.
//!
//! Typical flow: build three `tree::BookmarkTree`s via `tree::TreeBuilder`
//! (or let `applier::Applier` do it from `applier::RowSource` rows), run
//! `merge::Merger` to produce a `merge::MergedTree`, flatten it with
//! `result::ResultBuilder`, and hand the result to an `applier::Applier`.

mod applier;
mod error;
mod guid;
mod interrupt;
mod merge;
mod record;
mod result;
mod source;
mod tree;
mod types;

pub use applier::{Applier, Outcome, RowSource, Storage, Uploader};
pub use error::{Error, ErrorKind, Result};
pub use guid::Guid;
pub use interrupt::{Interruptable, Interrupted, Interruptee, NeverInterrupts};
pub use merge::{MergedTree, MergedTreeNode, Merger, StructureState, ValueState};
pub use record::{
    BookmarkItemRecord, BookmarkRecord, FolderRecord, LivemarkRecord, MirrorItem, QueryRecord,
    SeparatorRecord,
};
pub use result::{
    BufferCompletionOp, LocalOverrideCompletionOp, MergeResult, POSTResult, ResultBuilder,
    UpstreamCompletionOp,
};
pub use source::{BufferItemSource, LocalItemSource, MapItemSource, MirrorItemSource};
pub use tree::{BookmarkTree, TreeBuilder, TreeNode};
pub use types::{normalize_root_guid, NodeKind, RootGuid, ServerTimestamp, SyncStatus, Timestamp};

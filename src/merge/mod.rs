/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The merge engine (spec §4.D): the largest component of the crate. See
//! `node` for the merged-tree shape and `merger` for the algorithm that
//! produces one.

mod merger;
mod node;

pub use merger::Merger;
pub use node::{MergedTree, MergedTreeNode, StructureState, ValueState};

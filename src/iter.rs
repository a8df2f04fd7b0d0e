//! the iterator abstraction (§4.C): one trait, `BitTreeIterator`, presenting
//! a tree, an index, or a workdir as a comparable ordered stream of entries,
//! implemented by three structurally disjoint types rather than a shared base
//! struct (§9 "Dynamic dispatch over view kind") — a stack of tree handles, a
//! flat `BTreeMap` cursor, and `ignore`/`walkdir` state share almost nothing.
//!
//! Explicit `advance`/`advance_into`/`advance_over`/`reset` rather than a
//! generator is deliberate (§9 "Coroutine-style iterators"): `advance_into`
//! must be able to descend only the immediately-peeked entry, and `reset`
//! must be able to restart mid-stream with a new path bound, neither of which
//! a plain `Iterator` or generator offers.

mod tree_iter;
mod walk;
mod workdir_iter;

pub use tree_iter::{IndexTreeIter, TreeIter};
pub use walk::WalkIterators;
pub use workdir_iter::WorktreeIter;

use crate::error::BitResult;
use crate::model::FileEntry;
use crate::path::BitPath;
use crate::pathspec::Pathspec;

/// an entry as yielded by any of the three iterator kinds (§3 "File entry",
/// augmented per the workdir-view note with ignore/submodule classification —
/// always `false` for tree/index entries, for which the classification is
/// meaningless).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterEntry {
    pub file: FileEntry,
    pub ignored: bool,
    pub submodule: bool,
}

impl IterEntry {
    pub fn new(file: FileEntry) -> Self {
        Self { file, ignored: false, submodule: false }
    }

    pub fn path(&self) -> BitPath {
        self.file.path
    }

    pub fn is_tree(&self) -> bool {
        self.file.is_tree()
    }
}

/// what kind of entries `advance_over` skipped (§4.C contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverStatus {
    Normal,
    Empty,
    Ignored,
    Filtered,
}

/// construction-time behaviour shared by all three iterator kinds (§4.C
/// "Auto-expansion", "Pathspec filtering").
#[derive(Debug, Clone, Default)]
pub struct IterOpts {
    pub dont_autoexpand: bool,
    pub include_trees: bool,
    pub pathspec: Option<Pathspec>,
    /// `[start, end)` path bound, inclusive start.
    pub start: Option<BitPath>,
    pub end: Option<BitPath>,
}

impl IterOpts {
    fn in_bounds(&self, path: BitPath) -> bool {
        if let Some(start) = self.start {
            if path < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if path >= end {
                return false;
            }
        }
        true
    }

    fn pathspec_allows(&self, path: BitPath, is_dir: bool) -> bool {
        self.pathspec.as_ref().map_or(true, |p| p.matches(path, is_dir))
    }
}

/// the single surface every view kind implements (§4.C contract). Call sites
/// generic over the kind take `&mut dyn BitTreeIterator` rather than an
/// enum-of-variants (§9).
pub trait BitTreeIterator {
    /// peeks the current entry without advancing.
    fn current(&mut self) -> BitResult<Option<IterEntry>>;

    /// moves to the next entry at the current depth.
    fn advance(&mut self) -> BitResult<Option<IterEntry>>;

    /// descends into the current entry, which must be a tree; returns its
    /// first child, or `Ok(None)` if the tree is empty.
    fn advance_into(&mut self) -> BitResult<Option<IterEntry>>;

    /// skips the current subtree (or the current leaf, equivalent to
    /// `advance`), reporting what was skipped.
    fn advance_over(&mut self) -> BitResult<(Option<IterEntry>, OverStatus)>;

    /// restarts from the beginning honoring a new `[start, end)` bound.
    fn reset(&mut self, start: Option<BitPath>, end: Option<BitPath>) -> BitResult<()>;
}

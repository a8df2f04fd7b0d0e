use super::{BitTreeIterator, IterEntry, IterOpts, OverStatus};
use crate::collab::{Odb, TreeEntry};
use crate::error::BitResult;
use crate::index::Index;
use crate::model::{FileEntry, FileMode, Oid, Stage};
use crate::path::{self, BitPath};

struct Frame {
    dir: BitPath,
    entries: Vec<TreeEntry>,
    idx: usize,
}

impl Frame {
    fn current(&self) -> Option<TreeEntry> {
        self.entries.get(self.idx).copied()
    }
}

/// walks a committed tree (§3 "Tree view"), fetching each directory's
/// children lazily from [`Odb::read_tree`] only when descended into — a
/// stack of tree handles rather than a flattened copy (§9).
pub struct TreeIter<'c> {
    odb: &'c dyn Odb,
    root: Oid,
    opts: IterOpts,
    stack: Vec<Frame>,
}

impl<'c> TreeIter<'c> {
    pub fn new(odb: &'c dyn Odb, root: Oid, opts: IterOpts) -> BitResult<Self> {
        let mut iter = Self { odb, root, opts, stack: Vec::new() };
        iter.push_root()?;
        Ok(iter)
    }

    fn push_root(&mut self) -> BitResult<()> {
        self.stack.clear();
        if self.root.is_known() {
            let entries = self.sorted_children(self.root)?;
            self.stack.push(Frame { dir: BitPath::empty(), entries, idx: 0 });
        }
        self.normalize()
    }

    fn sorted_children(&self, oid: Oid) -> BitResult<Vec<TreeEntry>> {
        let mut entries = self.odb.read_tree(oid)?;
        for entry in &entries {
            // §3 Data Model: a path never contains `.`, `..`, or an embedded
            // `.git` segment; a decoded tree entry is the first point such a
            // component could enter this crate.
            path::validate_component(entry.path)?;
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn to_entry(&self, dir: BitPath, raw: TreeEntry) -> BitResult<IterEntry> {
        let path = dir.join(raw.path.as_path());
        let mut file = FileEntry::new(path, raw.mode, raw.oid);
        // a blob's size lives in the odb header, not the tree entry itself
        // (§3 "File entry": size is part of the shared shape every view
        // produces) — tree/gitlink entries have no blob content to size.
        if raw.mode.is_blob() {
            file.size = self.odb.header(raw.oid)?.1;
        }
        Ok(IterEntry::new(file))
    }

    fn pop_exhausted(&mut self) {
        while let Some(frame) = self.stack.last() {
            if frame.idx < frame.entries.len() {
                break;
            }
            self.stack.pop();
        }
    }

    fn bump_top(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.idx += 1;
        }
    }

    fn push_children_of_current(&mut self) -> BitResult<()> {
        let (dir, raw) = {
            let frame = self.stack.last().expect("push_children_of_current on empty stack");
            (frame.dir, frame.current().expect("push_children_of_current on exhausted frame"))
        };
        self.bump_top();
        let path = dir.join(raw.path.as_path());
        let entries = self.sorted_children(raw.oid)?;
        self.stack.push(Frame { dir: path, entries, idx: 0 });
        Ok(())
    }

    /// skips non-matching leaves and auto-expands trees per `opts`, leaving
    /// `self.stack` positioned on the next entry that should be externally visible.
    fn normalize(&mut self) -> BitResult<()> {
        loop {
            self.pop_exhausted();
            let Some(frame) = self.stack.last() else { return Ok(()) };
            let Some(raw) = frame.current() else { return Ok(()) };
            let path = frame.dir.join(raw.path.as_path());

            if raw.mode.is_tree() {
                if !self.opts.in_bounds(path) && self.opts.end.map_or(false, |end| path >= end) {
                    self.bump_top();
                    continue;
                }
                if !self.opts.dont_autoexpand && !self.opts.include_trees {
                    self.push_children_of_current()?;
                    continue;
                }
                return Ok(());
            }

            if !self.opts.in_bounds(path) || !self.opts.pathspec_allows(path, false) {
                self.bump_top();
                continue;
            }
            return Ok(());
        }
    }

    fn current_raw(&self) -> Option<(BitPath, TreeEntry)> {
        let frame = self.stack.last()?;
        let raw = frame.current()?;
        Some((frame.dir, raw))
    }
}

impl<'c> BitTreeIterator for TreeIter<'c> {
    fn current(&mut self) -> BitResult<Option<IterEntry>> {
        self.current_raw().map(|(dir, raw)| self.to_entry(dir, raw)).transpose()
    }

    fn advance(&mut self) -> BitResult<Option<IterEntry>> {
        match self.current_raw() {
            None => Ok(None),
            Some((_, raw)) if raw.mode.is_tree() && !self.opts.dont_autoexpand => self.advance_into(),
            Some(_) => {
                self.bump_top();
                self.normalize()?;
                self.current()
            }
        }
    }

    fn advance_into(&mut self) -> BitResult<Option<IterEntry>> {
        match self.current_raw() {
            Some((_, raw)) if raw.mode.is_tree() => {
                self.push_children_of_current()?;
                self.normalize()?;
                self.current()
            }
            Some(_) => bail!("advance_into called on a non-tree entry"),
            None => bail!("advance_into called with no current entry (ENOTFOUND)"),
        }
    }

    fn advance_over(&mut self) -> BitResult<(Option<IterEntry>, OverStatus)> {
        let Some((dir, raw)) = self.current_raw() else { return Ok((None, OverStatus::Normal)) };
        let entry = self.to_entry(dir, raw)?;
        let status = if raw.mode.is_tree() {
            let children = self.sorted_children(raw.oid)?;
            if children.is_empty() { OverStatus::Empty } else { OverStatus::Normal }
        } else {
            OverStatus::Normal
        };
        self.bump_top();
        self.normalize()?;
        Ok((Some(entry), status))
    }

    fn reset(&mut self, start: Option<BitPath>, end: Option<BitPath>) -> BitResult<()> {
        self.opts.start = start;
        self.opts.end = end;
        self.push_root()
    }
}

/// presents a flat `(path, stage) -> entry` index manifest as a tree (§9
/// "Dynamic dispatch over view kind"): directory boundaries are synthesized
/// from path prefixes rather than stored, so `advance_into` on a synthetic
/// directory just narrows the cursor to entries under that prefix instead of
/// following a child pointer.
pub struct IndexTreeIter {
    entries: Vec<FileEntry>,
    opts: IterOpts,
    /// index into `entries` / directory stack, mirroring [`TreeIter`]'s shape:
    /// each frame bounds a contiguous `[lo, hi)` range of `entries` sharing a prefix.
    stack: Vec<DirFrame>,
}

struct DirFrame {
    dir: BitPath,
    lo: usize,
    hi: usize,
    cursor: usize,
}

impl IndexTreeIter {
    pub fn new(index: &Index, opts: IterOpts) -> Self {
        let entries: Vec<FileEntry> = index
            .iter()
            .filter(|e| e.stage == Stage::Merged)
            .map(|e| e.file)
            .collect();
        let mut iter = Self { entries, opts, stack: Vec::new() };
        iter.push_root();
        iter
    }

    fn push_root(&mut self) {
        self.stack.clear();
        let hi = self.entries.len();
        self.stack.push(DirFrame { dir: BitPath::empty(), lo: 0, hi, cursor: 0 });
        self.normalize();
    }

    /// the next distinct "child" seen from `frame.dir` at `frame.cursor`: either
    /// a leaf (entry whose path has no further component under `frame.dir`) or
    /// a synthetic subdirectory (the common prefix of a run of entries).
    fn peek_child(&self, frame: &DirFrame) -> Option<(BitPath, bool, usize)> {
        let raw = self.entries.get(frame.cursor)?;
        let rel = if frame.dir.is_empty() {
            raw.path.as_str()
        } else {
            raw.path.as_str().strip_prefix(frame.dir.as_str())?.trim_start_matches('/')
        };
        match rel.find('/') {
            None => Some((raw.path, false, frame.cursor + 1)),
            Some(slash) => {
                let child_dir = if frame.dir.is_empty() {
                    BitPath::intern(&rel[..slash])
                } else {
                    frame.dir.join(&rel[..slash])
                };
                let mut end = frame.cursor + 1;
                while end < frame.hi {
                    let next = &self.entries[end];
                    if !next.path.as_str().starts_with(&format!("{}/", child_dir)) {
                        break;
                    }
                    end += 1;
                }
                Some((child_dir, true, end))
            }
        }
    }

    fn bump_top(&mut self, next_cursor: usize) {
        if let Some(frame) = self.stack.last_mut() {
            frame.cursor = next_cursor;
        }
    }

    fn pop_exhausted(&mut self) {
        while let Some(frame) = self.stack.last() {
            if frame.cursor < frame.hi {
                break;
            }
            self.stack.pop();
        }
    }

    fn push_children_of_current(&mut self) -> BitResult<()> {
        let frame = self.stack.last().ok_or_else(|| anyhow!("advance_into with no current frame"))?;
        let (dir, is_tree, next_cursor) =
            self.peek_child(frame).ok_or_else(|| anyhow!("advance_into with no current entry"))?;
        ensure!(is_tree, "advance_into called on a non-tree entry");
        let lo = frame.cursor;
        self.bump_top(next_cursor);
        let hi = next_cursor;
        self.stack.push(DirFrame { dir, lo, hi, cursor: lo });
        Ok(())
    }

    fn normalize(&mut self) {
        loop {
            self.pop_exhausted();
            let Some(frame) = self.stack.last() else { return };
            let Some((path, is_tree, _)) = self.peek_child(frame) else { return };

            if !self.opts.in_bounds(path) {
                self.bump_top(frame.cursor + 1);
                continue;
            }
            if is_tree {
                if !self.opts.dont_autoexpand && !self.opts.include_trees {
                    // safe: push_children_of_current only fails on empty cursor, already checked above
                    self.push_children_of_current().expect("normalize: descend");
                    continue;
                }
                return;
            }
            if !self.opts.pathspec_allows(path, false) {
                self.bump_top(frame.cursor + 1);
                continue;
            }
            return;
        }
    }

    fn current_child(&self) -> Option<(BitPath, bool)> {
        let frame = self.stack.last()?;
        self.peek_child(frame).map(|(p, t, _)| (p, t))
    }

    fn to_entry(&self, path: BitPath, is_tree: bool) -> IterEntry {
        if is_tree {
            IterEntry::new(FileEntry::new(path, FileMode::Tree, Oid::UNKNOWN))
        } else {
            let raw = self.entries.iter().find(|e| e.path == path).expect("entry must exist");
            IterEntry::new(*raw)
        }
    }
}

impl BitTreeIterator for IndexTreeIter {
    fn current(&mut self) -> BitResult<Option<IterEntry>> {
        Ok(self.current_child().map(|(p, t)| self.to_entry(p, t)))
    }

    fn advance(&mut self) -> BitResult<Option<IterEntry>> {
        match self.current_child() {
            None => Ok(None),
            Some((_, true)) if !self.opts.dont_autoexpand => self.advance_into(),
            Some(_) => {
                if let Some(frame) = self.stack.last() {
                    let next = frame.cursor + 1;
                    self.bump_top(next);
                }
                self.normalize();
                self.current()
            }
        }
    }

    fn advance_into(&mut self) -> BitResult<Option<IterEntry>> {
        self.push_children_of_current()?;
        self.normalize();
        self.current()
    }

    fn advance_over(&mut self) -> BitResult<(Option<IterEntry>, OverStatus)> {
        let Some((path, is_tree)) = self.current_child() else { return Ok((None, OverStatus::Normal)) };
        let entry = self.to_entry(path, is_tree);
        let status = match self.peek_child(self.stack.last().unwrap()) {
            Some((_, true, next)) if next == self.stack.last().unwrap().cursor + 1 => OverStatus::Empty,
            _ => OverStatus::Normal,
        };
        if let Some(frame) = self.stack.last() {
            let (_, _, next_cursor) = self.peek_child(frame).unwrap();
            self.bump_top(next_cursor);
        }
        self.normalize();
        Ok((Some(entry), status))
    }

    fn reset(&mut self, start: Option<BitPath>, end: Option<BitPath>) -> BitResult<()> {
        self.opts.start = start;
        self.opts.end = end;
        self.push_root();
        Ok(())
    }
}

//! the index view (§3 "Index view"): a staging manifest pairing paths with
//! content hashes and cached stat data, keyed by `(path, stage)`.
//!
//! the on-disk wire format of the index file is explicitly not this crate's
//! concern (§6 "Index file: not defined by the core beyond the invariants in
//! §3; delegated to the index component") — this module only has to uphold
//! the stage-exclusivity invariant and hand the diff engine a view it can
//! stat-shortcut against. [`Index::flush`]/[`Index::load`] persist a simple
//! checkpoint format through the shared [`crate::lockfile::Lockfile`] guard so
//! that an in-process index can survive a restart in tests; it is not meant
//! to be read by any other tool.

use crate::lockfile::{FileData, Lockfile, LockfileFlags};
use crate::model::{FileEntry, FileMode, Oid, Stage};
use crate::path::BitPath;
use crate::BitResult;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

bitflags! {
    /// per-entry flag bits (§3 "flag bits {assume-valid, skip-worktree, intent-to-add}").
    pub struct IndexEntryFlags: u8 {
        /// skip racy-git stat comparison and always treat the entry as unmodified
        const ASSUME_VALID  = 1 << 0;
        /// never descend into this path during a sparse-checkout style workdir walk
        const SKIP_WORKTREE = 1 << 1;
        /// staged with `add -N`: present in the index but has no content yet
        const INTENT_TO_ADD = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub file: FileEntry,
    pub stage: Stage,
    pub flags: IndexEntryFlags,
}

impl IndexEntry {
    pub fn new(file: FileEntry, stage: Stage) -> Self {
        Self { file, stage, flags: IndexEntryFlags::empty() }
    }

    pub fn path(&self) -> BitPath {
        self.file.path
    }

    fn key(&self) -> (BitPath, Stage) {
        (self.file.path, self.stage)
    }
}

impl From<FileEntry> for IndexEntry {
    fn from(file: FileEntry) -> Self {
        Self::new(file, Stage::Merged)
    }
}

#[derive(Debug, Default)]
pub struct Index {
    /// sorted by path, ties broken by stage; enforces the §3 conflict-exclusivity
    /// invariant at every mutation rather than as a post-hoc check.
    entries: BTreeMap<(BitPath, Stage), IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn find(&self, path: BitPath, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path, stage))
    }

    /// true if `path` has any of the three conflict-stage slots occupied.
    pub fn is_conflicted(&self, path: BitPath) -> bool {
        [Stage::Base, Stage::Ours, Stage::Theirs].iter().any(|&s| self.entries.contains_key(&(path, s)))
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|&(_, stage)| stage.is_conflict())
    }

    /// inserts `entry`, clearing whichever sibling stages the invariant forbids:
    /// a merged entry evicts any conflict-stage entries for the same path and
    /// vice versa (§3 "stage-0 entries exclude the presence of stage-{1,2,3}
    /// entries for the same path, and vice versa").
    pub fn add_entry(&mut self, entry: IndexEntry) {
        let path = entry.path();
        if entry.stage == Stage::Merged {
            for stage in [Stage::Base, Stage::Ours, Stage::Theirs] {
                self.entries.remove(&(path, stage));
            }
        } else {
            self.entries.remove(&(path, Stage::Merged));
        }
        trace!("index: add_entry `{}` (stage {})", path, entry.stage);
        self.entries.insert(entry.key(), entry);
    }

    pub fn remove_entry(&mut self, path: BitPath, stage: Stage) -> Option<IndexEntry> {
        self.entries.remove(&(path, stage))
    }

    /// removes `path` itself and every entry that lies under it as a directory
    /// prefix; used when a file is replacing a previously tracked directory or
    /// a directory is replacing a previously tracked file.
    pub fn remove_prefixed(&mut self, path: BitPath) {
        if path.is_empty() {
            self.entries.clear();
            return;
        }
        let prefix = format!("{}/", path);
        self.entries.retain(|&(p, _), _| p != path && !p.as_str().starts_with(&prefix));
    }

    /// the racy-git shortcut (§4.D): an index entry is indistinguishable from
    /// `worktree_mtime` without rehashing when its cached mtime equals the
    /// index file's own mtime (both were written in the same tick of the clock).
    pub fn is_racy(&self, index_file_mtime: crate::time::Timespec, entry: &IndexEntry) -> bool {
        entry.file.stat.map_or(false, |stat| stat.mtime == index_file_mtime)
    }

    pub fn flush(&self, path: impl AsRef<Path>) -> BitResult<()> {
        let path = path.as_ref();
        debug!("index: flushing {} entries to `{}`", self.entries.len(), path.display());
        Lockfile::with_mut(path, LockfileFlags::empty(), |lockfile| {
            let snapshot = IndexSnapshot(self.entries.values().copied().collect());
            snapshot.save(lockfile)
        })
    }

    pub fn load(path: impl AsRef<Path>) -> BitResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut file = std::fs::File::open(path)?;
        let snapshot = IndexSnapshot::load(&mut file)?;
        let mut index = Self::default();
        for entry in snapshot.0 {
            index.entries.insert(entry.key(), entry);
        }
        Ok(index)
    }
}

/// line-oriented checkpoint: `path\tstage\tmode\toid\tsize\tflags`.
struct IndexSnapshot(Vec<IndexEntry>);

impl FileData for IndexSnapshot {
    fn load(r: &mut dyn Read) -> BitResult<Self> {
        let mut buf = String::new();
        r.read_to_string(&mut buf)?;
        let mut entries = Vec::new();
        for line in buf.lines() {
            let mut cols = line.splitn(6, '\t');
            let path = BitPath::intern(cols.next().ok_or_else(|| anyhow!("missing path"))?);
            let stage = match cols.next().ok_or_else(|| anyhow!("missing stage"))? {
                "0" => Stage::Merged,
                "1" => Stage::Base,
                "2" => Stage::Ours,
                "3" => Stage::Theirs,
                s => bail!("invalid stage `{}`", s),
            };
            let mode: FileMode = cols.next().ok_or_else(|| anyhow!("missing mode"))?.parse()?;
            let oid: Oid = cols.next().ok_or_else(|| anyhow!("missing oid"))?.parse()?;
            let size: u64 = cols.next().ok_or_else(|| anyhow!("missing size"))?.parse()?;
            let flags = IndexEntryFlags::from_bits_truncate(
                cols.next().ok_or_else(|| anyhow!("missing flags"))?.parse()?,
            );
            let mut file = FileEntry::new(path, mode, oid);
            file.size = size;
            entries.push(IndexEntry { file, stage, flags });
        }
        Ok(Self(entries))
    }

    fn save(&self, w: &mut dyn Write) -> BitResult<()> {
        for entry in &self.0 {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}\t{}",
                entry.file.path,
                entry.stage,
                entry.file.mode,
                entry.file.oid,
                entry.file.size,
                entry.flags.bits()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;

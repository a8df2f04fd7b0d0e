use super::{BitTreeIterator, IterEntry, IterOpts, OverStatus};
use crate::attr::Resolver;
use crate::error::BitResult;
use crate::model::{FileEntry, FileMode, Stat};
use crate::path::{self, BitPath};
use crate::time::Timespec;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

/// one directory child discovered by [`WorktreeIter::list_dir`]: enough to
/// sort, classify, and (for non-trees) stat without touching the filesystem
/// again.
struct DirEntry {
    name: BitPath,
    abs: PathBuf,
    mode: FileMode,
    stat: Option<Stat>,
    ignored: bool,
}

impl DirEntry {
    fn is_dir_like(&self) -> bool {
        matches!(self.mode, FileMode::Tree | FileMode::Gitlink)
    }
}

struct Frame {
    dir: BitPath,
    entries: Vec<DirEntry>,
    idx: usize,
}

impl Frame {
    fn current(&self) -> Option<&DirEntry> {
        self.entries.get(self.idx)
    }
}

/// walks the working directory (§3 "Workdir view"), lazily `read_dir`-ing one
/// level at a time with the same stack-of-frames shape as [`super::TreeIter`]
/// (§9 "Dynamic dispatch over view kind") rather than pre-walking with
/// `walkdir` up front: `advance_into`/`reset` need to control descent
/// per-entry, which a flat pre-collected walk can't offer without buffering
/// the entire tree.
///
/// `.git`/`.bit` are never yielded, at any depth (§3 Data Model: no path ever
/// carries an embedded `.git` segment); a subdirectory that itself contains
/// `.git` is reported as [`FileMode::Gitlink`] instead of being descended
/// into, the same way a committed tree represents a submodule.
pub struct WorktreeIter<'c> {
    root: PathBuf,
    resolver: &'c Resolver<'c>,
    opts: IterOpts,
    stack: Vec<Frame>,
}

impl<'c> WorktreeIter<'c> {
    pub fn new(root: impl Into<PathBuf>, resolver: &'c Resolver<'c>, opts: IterOpts) -> BitResult<Self> {
        let mut iter = Self { root: root.into(), resolver, opts, stack: Vec::new() };
        iter.push_root()?;
        Ok(iter)
    }

    fn push_root(&mut self) -> BitResult<()> {
        self.stack.clear();
        let entries = self.list_dir(BitPath::empty())?;
        self.stack.push(Frame { dir: BitPath::empty(), entries, idx: 0 });
        self.normalize()
    }

    fn abs_dir(&self, rel: BitPath) -> PathBuf {
        if rel.is_empty() { self.root.clone() } else { self.root.join(rel.as_path()) }
    }

    /// lists and classifies one directory's immediate children, tolerating a
    /// directory that has become unreadable (permission revoked, removed
    /// mid-walk) by treating it as empty rather than failing the whole walk.
    fn list_dir(&self, rel: BitPath) -> BitResult<Vec<DirEntry>> {
        let abs_dir = self.abs_dir(rel);
        let read_dir = match std::fs::read_dir(&abs_dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!("workdir: skipping unreadable directory `{}`: {}", abs_dir.display(), e);
                return Ok(Vec::new());
            }
        };

        let mut entries = Vec::new();
        for dirent in read_dir {
            let dirent = match dirent {
                Ok(d) => d,
                Err(e) => {
                    warn!("workdir: skipping unreadable entry under `{}`: {}", abs_dir.display(), e);
                    continue;
                }
            };
            let file_name = dirent.file_name();
            if file_name == ".git" || file_name == ".bit" {
                continue;
            }

            let name = BitPath::intern(&file_name);
            path::validate_component(name)?;

            let abs = abs_dir.join(&file_name);
            let metadata = match std::fs::symlink_metadata(&abs) {
                Ok(m) => m,
                Err(e) => {
                    warn!("workdir: skipping `{}`, failed to stat: {}", abs.display(), e);
                    continue;
                }
            };

            let mode = if metadata.file_type().is_symlink() {
                FileMode::Symlink
            } else if metadata.is_dir() {
                if abs.join(".git").exists() { FileMode::Gitlink } else { FileMode::Tree }
            } else if crate::fs::is_executable(&metadata) {
                FileMode::Executable
            } else {
                FileMode::Regular
            };

            let is_dir_like = matches!(mode, FileMode::Tree | FileMode::Gitlink);
            let rel_path = rel.join(&file_name);
            let ignored = self.resolver.is_ignored(rel_path, is_dir_like)?;

            let stat = if is_dir_like {
                None
            } else {
                Some(Stat {
                    ctime: Timespec::ctime(&metadata),
                    mtime: Timespec::mtime(&metadata),
                    dev: metadata.dev(),
                    ino: metadata.ino(),
                    uid: metadata.uid(),
                    gid: metadata.gid(),
                    size: metadata.len(),
                })
            };

            entries.push(DirEntry { name, abs, mode, stat, ignored });
        }

        entries.sort_by(|a, b| {
            BitPath::path_cmp_explicit(a.name.as_os_str(), a.is_dir_like(), b.name.as_os_str(), b.is_dir_like())
        });
        Ok(entries)
    }

    fn to_entry(&self, dir: BitPath, raw: &DirEntry) -> IterEntry {
        let path = dir.join(raw.name.as_path());
        let mut file = FileEntry::new(path, raw.mode, crate::model::Oid::UNKNOWN);
        if let Some(stat) = raw.stat {
            file.size = stat.size;
            file.stat = Some(stat);
        }
        IterEntry { file, ignored: raw.ignored, submodule: raw.mode.is_gitlink() }
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
        let (dir, name) = {
            let frame = self.stack.last().expect("push_children_of_current on empty stack");
            let raw = frame.current().expect("push_children_of_current on exhausted frame");
            (frame.dir, raw.name)
        };
        self.bump_top();
        let path = dir.join(name.as_path());
        let entries = self.list_dir(path)?;
        self.stack.push(Frame { dir: path, entries, idx: 0 });
        Ok(())
    }

    /// mirrors [`super::TreeIter::normalize`]: skips non-matching leaves and
    /// auto-expands plain trees, with one addition — an ignored directory is
    /// never auto-expanded (its contents are presumed uninteresting), so it
    /// surfaces as a single ignored tree entry instead (§4.C "Ignore
    /// filtering" as applied to the workdir view).
    fn normalize(&mut self) -> BitResult<()> {
        loop {
            self.pop_exhausted();
            let Some(frame) = self.stack.last() else { return Ok(()) };
            let Some(raw) = frame.current() else { return Ok(()) };
            let path = frame.dir.join(raw.name.as_path());

            if raw.mode == FileMode::Tree {
                if !self.opts.in_bounds(path) {
                    self.bump_top();
                    continue;
                }
                if raw.ignored {
                    return Ok(());
                }
                if !self.opts.dont_autoexpand && !self.opts.include_trees {
                    self.push_children_of_current()?;
                    continue;
                }
                return Ok(());
            }

            // gitlink (submodule boundary) or leaf: never auto-expanded.
            let is_dir = raw.is_dir_like();
            if !self.opts.in_bounds(path) || !self.opts.pathspec_allows(path, is_dir) {
                self.bump_top();
                continue;
            }
            return Ok(());
        }
    }

    fn current_raw(&self) -> Option<(BitPath, &DirEntry)> {
        let frame = self.stack.last()?;
        let raw = frame.current()?;
        Some((frame.dir, raw))
    }
}

impl<'c> BitTreeIterator for WorktreeIter<'c> {
    fn current(&mut self) -> BitResult<Option<IterEntry>> {
        Ok(self.current_raw().map(|(dir, raw)| self.to_entry(dir, raw)))
    }

    fn advance(&mut self) -> BitResult<Option<IterEntry>> {
        match self.current_raw() {
            None => Ok(None),
            Some((_, raw)) if raw.mode == FileMode::Tree && !raw.ignored && !self.opts.dont_autoexpand =>
                self.advance_into(),
            Some(_) => {
                self.bump_top();
                self.normalize()?;
                self.current()
            }
        }
    }

    fn advance_into(&mut self) -> BitResult<Option<IterEntry>> {
        match self.current_raw() {
            Some((_, raw)) if raw.mode == FileMode::Tree => {
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
        let entry = self.to_entry(dir, raw);
        let status = if raw.ignored {
            OverStatus::Ignored
        } else if raw.mode == FileMode::Tree {
            let path = dir.join(raw.name.as_path());
            let children = self.list_dir(path)?;
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

#[cfg(test)]
mod tests;

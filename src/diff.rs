//! the diff engine (§4.D): a merge-join over two [`BitTreeIterator`]s
//! producing a sorted [`DeltaList`].
//!
//! Both iterators must be constructed with `IterOpts::include_trees = true`:
//! the merge-join relies on being able to stop at a tree entry and inspect it
//! (oid-equality fast path, typechange detection) before deciding whether to
//! descend, rather than getting a pre-flattened leaf stream.

use crate::attr::Resolver;
use crate::collab::{Collaborators, Config, ObjType, SubmoduleIgnore, SubmoduleStatus};
use crate::error::BitResult;
use crate::filter::{Direction, FilterList};
use crate::iter::{BitTreeIterator, IterEntry};
use crate::model::{Delta, DeltaFlags, DeltaStatus, FileEntry, Oid, Stat};
use std::path::Path;

bitflags! {
    /// §6 "diff" option group.
    pub struct DiffFlags: u32 {
        const INCLUDE_UNMODIFIED       = 1 << 0;
        const INCLUDE_IGNORED          = 1 << 1;
        const RECURSE_IGNORED_DIRS     = 1 << 2;
        const INCLUDE_UNTRACKED        = 1 << 3;
        const RECURSE_UNTRACKED_DIRS   = 1 << 4;
        const INCLUDE_TYPECHANGE       = 1 << 5;
        const INCLUDE_TYPECHANGE_TREES = 1 << 6;
        const IGNORE_FILEMODE          = 1 << 7;
        const IGNORE_SUBMODULES        = 1 << 8;
        const IGNORE_WHITESPACE        = 1 << 9;
        const REVERSE                  = 1 << 10;
        const FORCE_TEXT               = 1 << 11;
        const SKIP_BINARY_CHECK        = 1 << 12;
        const DISABLE_PATHSPEC_MATCH   = 1 << 13;
    }
}

const DEFAULT_MAX_SIZE: u64 = 512 * 1024 * 1024;
const BINARY_SCAN_WINDOW: usize = 8 * 1024;

pub struct DiffOpts {
    pub flags: DiffFlags,
    /// binary-detection size threshold (§4.D "Binary detection").
    pub max_size: u64,
    /// whether the *new* side is the workdir view: governs ignored/untracked
    /// classification of additions and the recurse-into-{ignored,untracked}
    /// directory flags (§4.D algorithm step 2 "classify via workdir rules").
    pub new_is_workdir: bool,
}

impl Default for DiffOpts {
    fn default() -> Self {
        Self { flags: DiffFlags::empty(), max_size: DEFAULT_MAX_SIZE, new_is_workdir: false }
    }
}

/// the result of [`diff`]: always kept sorted by `old_file.path` (ties broken
/// by `new_file.path`), which is also the key the rename finder resorts by
/// after rewriting entries in place (§4.E step 4 "Apply split/delete flags,
/// resort").
#[derive(Debug, Default)]
pub struct DeltaList {
    pub deltas: Vec<Delta>,
}

impl DeltaList {
    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Delta> {
        self.deltas.iter()
    }

    pub(crate) fn resort(&mut self) {
        self.deltas.sort_by(|a, b| {
            a.old_file.path.cmp(&b.old_file.path).then_with(|| a.new_file.path.cmp(&b.new_file.path))
        });
    }
}

impl IntoIterator for DeltaList {
    type Item = Delta;
    type IntoIter = std::vec::IntoIter<Delta>;

    fn into_iter(self) -> Self::IntoIter {
        self.deltas.into_iter()
    }
}

/// a placeholder for the side of a delta that doesn't exist (§3 "Delta": "for
/// `added` the `old_file` is a zero-oid placeholder at the same path").
fn placeholder_like(entry: FileEntry) -> FileEntry {
    let mut placeholder = entry;
    placeholder.oid = Oid::UNKNOWN;
    placeholder.stat = None;
    placeholder
}

fn deleted_delta(o: FileEntry) -> Delta {
    let mut flags = DeltaFlags::empty();
    flags.set(DeltaFlags::VALID_OLD_OID, o.oid.is_known());
    Delta { status: DeltaStatus::Deleted, old_file: o, new_file: placeholder_like(o), similarity: None, flags }
}

fn modified_delta(o: FileEntry, n: FileEntry) -> Delta {
    let mut flags = DeltaFlags::empty();
    flags.set(DeltaFlags::VALID_OLD_OID, o.oid.is_known());
    flags.set(DeltaFlags::VALID_NEW_OID, n.oid.is_known());
    Delta { status: DeltaStatus::Modified, old_file: o, new_file: n, similarity: None, flags }
}

fn unmodified(o: FileEntry, n: FileEntry, opts: &DiffOpts) -> Option<Delta> {
    if !opts.flags.contains(DiffFlags::INCLUDE_UNMODIFIED) {
        return None;
    }
    let mut flags = DeltaFlags::empty();
    flags.set(DeltaFlags::VALID_OLD_OID, o.oid.is_known());
    flags.set(DeltaFlags::VALID_NEW_OID, n.oid.is_known());
    Some(Delta { status: DeltaStatus::Unmodified, old_file: o, new_file: n, similarity: None, flags })
}

/// the §4.D merge-join. Drives two already-positioned iterators to completion.
pub fn diff(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: Option<&Path>,
    old: &mut dyn BitTreeIterator,
    new: &mut dyn BitTreeIterator,
    opts: &DiffOpts,
) -> BitResult<DeltaList> {
    let mut deltas = Vec::new();
    loop {
        let o = old.current()?;
        let n = new.current()?;
        match (o, n) {
            (None, None) => break,
            (Some(o), None) => {
                deltas.push(deleted_delta(o.file));
                old.advance()?;
            }
            (None, Some(n)) => handle_new_only(new, n, opts, &mut deltas)?,
            (Some(o), Some(n)) =>
                if o.path() == n.path() {
                    handle_matched(collab, resolver, workdir_root, old, new, o, n, opts, &mut deltas)?;
                } else if o.path() < n.path() {
                    if n.is_tree() && o.path().as_str().starts_with(&format!("{}/", n.path())) {
                        new.advance_into()?;
                    } else {
                        deltas.push(deleted_delta(o.file));
                        old.advance()?;
                    }
                } else if o.is_tree() && n.path().as_str().starts_with(&format!("{}/", o.path())) {
                    old.advance_into()?;
                } else {
                    handle_new_only(new, n, opts, &mut deltas)?;
                },
        }
    }

    if opts.flags.contains(DiffFlags::REVERSE) {
        for delta in &mut deltas {
            *delta = delta.reversed();
        }
    }

    let mut list = DeltaList { deltas };
    list.resort();
    Ok(list)
}

/// entries present only on the new side (§4.D step 2 "classify via workdir rules").
fn handle_new_only(
    new: &mut dyn BitTreeIterator,
    n: IterEntry,
    opts: &DiffOpts,
    deltas: &mut Vec<Delta>,
) -> BitResult<()> {
    if n.is_tree() {
        if n.ignored {
            if opts.flags.contains(DiffFlags::RECURSE_IGNORED_DIRS) {
                new.advance_into()?;
                return Ok(());
            }
            if opts.flags.contains(DiffFlags::INCLUDE_IGNORED) {
                deltas.push(Delta::new(DeltaStatus::Ignored, placeholder_like(n.file), n.file));
            }
            new.advance_over()?;
            return Ok(());
        }
        if opts.new_is_workdir && !opts.flags.contains(DiffFlags::RECURSE_UNTRACKED_DIRS) {
            if opts.flags.contains(DiffFlags::INCLUDE_UNTRACKED) {
                deltas.push(Delta::new(DeltaStatus::Untracked, placeholder_like(n.file), n.file));
            }
            new.advance_over()?;
            return Ok(());
        }
        new.advance_into()?;
        return Ok(());
    }

    let (status, include) = if n.ignored {
        (DeltaStatus::Ignored, opts.flags.contains(DiffFlags::INCLUDE_IGNORED))
    } else if opts.new_is_workdir {
        (DeltaStatus::Untracked, opts.flags.contains(DiffFlags::INCLUDE_UNTRACKED))
    } else {
        (DeltaStatus::Added, true)
    };
    if include {
        deltas.push(Delta::new(status, placeholder_like(n.file), n.file));
    }
    new.advance()?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_matched(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: Option<&Path>,
    old: &mut dyn BitTreeIterator,
    new: &mut dyn BitTreeIterator,
    o: IterEntry,
    n: IterEntry,
    opts: &DiffOpts,
    deltas: &mut Vec<Delta>,
) -> BitResult<()> {
    if o.file.mode.is_typechange(n.file.mode) {
        let report_typechange = opts
            .flags
            .intersects(DiffFlags::INCLUDE_TYPECHANGE | DiffFlags::INCLUDE_TYPECHANGE_TREES)
            && (!(o.is_tree() || n.is_tree()) || opts.flags.contains(DiffFlags::INCLUDE_TYPECHANGE_TREES));

        if report_typechange {
            deltas.push(Delta::new(DeltaStatus::Typechange, o.file, n.file));
            if o.is_tree() { old.advance_over()?; } else { old.advance()?; }
            if n.is_tree() { new.advance_over()?; } else { new.advance()?; }
            return Ok(());
        }

        if o.is_tree() {
            // old was a (now-deleted) subtree, new is a plain file: descend
            // old so its children surface as deletes on later loop turns.
            handle_new_only(new, n, opts, deltas)?;
            old.advance_into()?;
        } else if n.is_tree() {
            deltas.push(deleted_delta(o.file));
            old.advance()?;
            new.advance_into()?;
        } else {
            deltas.push(deleted_delta(o.file));
            handle_new_only(new, n, opts, deltas)?;
            old.advance()?;
        }
        return Ok(());
    }

    if o.is_tree() {
        if o.file.oid.is_known() && n.file.oid.is_known() && o.file.oid == n.file.oid {
            old.advance_over()?;
            new.advance_over()?;
        } else {
            old.advance_into()?;
            new.advance_into()?;
        }
        return Ok(());
    }

    if let Some(delta) = maybe_modified(collab, resolver, workdir_root, o, n, opts)? {
        deltas.push(delta);
    }
    old.advance()?;
    new.advance()?;
    Ok(())
}

/// §4.D "`maybe_modified` decision table".
fn maybe_modified(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: Option<&Path>,
    o: IterEntry,
    n: IterEntry,
    opts: &DiffOpts,
) -> BitResult<Option<Delta>> {
    let mode_equal = opts.flags.contains(DiffFlags::IGNORE_FILEMODE) || o.file.mode == n.file.mode;

    if o.file.mode.is_gitlink() {
        return submodule_modified(collab, o, n, opts);
    }

    if o.file.oid.is_known() && n.file.oid.is_known() {
        return Ok(if o.file.oid == n.file.oid && mode_equal {
            unmodified(o.file, n.file, opts)
        } else {
            let mut delta = modified_delta(o.file, n.file);
            delta.flags |= detect_binary(collab, workdir_root, o.file, n.file, opts)?;
            Some(delta)
        });
    }

    // the new side's content hasn't been hashed yet (workdir): try the
    // racy-git stat shortcut before paying for a rehash.
    if let Some(stat) = n.file.stat {
        if mode_equal && stat_matches(o, stat, collab.config)? {
            trace!("diff: stat shortcut hit for `{}`", n.path());
            return Ok(unmodified(o.file, n.file, opts));
        }
        debug!("diff: stat shortcut miss for `{}`, rehashing", n.path());
    }

    let bytes = read_content(collab, workdir_root, n.file)?;
    let filtered =
        FilterList::load(resolver, collab.config, n.file.path, false, Direction::ToOdb)?.apply(&bytes)?;
    let new_oid = collab.odb.hash(&filtered, ObjType::Blob)?;
    let mut new_file = n.file;
    new_file.oid = new_oid;

    Ok(if new_oid == o.file.oid && mode_equal {
        unmodified(o.file, new_file, opts)
    } else {
        let mut delta = modified_delta(o.file, new_file);
        delta.flags |= detect_binary(collab, workdir_root, o.file, new_file, opts)?;
        Some(delta)
    })
}

fn stat_matches(o: IterEntry, n_stat: Stat, config: &dyn Config) -> BitResult<bool> {
    if config.get_bool("core.ignorestat")?.unwrap_or(false) {
        return Ok(false);
    }
    let Some(o_stat) = o.file.stat else { return Ok(false) };
    if o.file.size != n_stat.size {
        return Ok(false);
    }
    if o_stat.mtime != n_stat.mtime {
        return Ok(false);
    }
    if config.get_bool("core.trustctime")?.unwrap_or(true) && o_stat.ctime != n_stat.ctime {
        return Ok(false);
    }
    Ok(o_stat.dev == n_stat.dev && o_stat.ino == n_stat.ino && o_stat.uid == n_stat.uid && o_stat.gid == n_stat.gid)
}

fn submodule_modified(
    collab: Collaborators<'_>,
    o: IterEntry,
    n: IterEntry,
    opts: &DiffOpts,
) -> BitResult<Option<Delta>> {
    if opts.flags.contains(DiffFlags::IGNORE_SUBMODULES) {
        return Ok(unmodified(o.file, n.file, opts));
    }
    let Some(sm) = collab.submodules.lookup(o.file.path)? else {
        return Ok(unmodified(o.file, n.file, opts));
    };
    let policy = collab.submodules.ignore(sm)?;
    if policy == SubmoduleIgnore::All {
        return Ok(unmodified(o.file, n.file, opts));
    }
    let status = collab.submodules.status(sm)?;
    let dirty = status.contains(SubmoduleStatus::WD_MODIFIED)
        || (policy != SubmoduleIgnore::Dirty && status.contains(SubmoduleStatus::WD_NEW_COMMITS))
        || (policy == SubmoduleIgnore::None && status.contains(SubmoduleStatus::WD_UNTRACKED));
    if !dirty {
        return Ok(unmodified(o.file, n.file, opts));
    }
    let mut new_file = n.file;
    new_file.oid = collab.submodules.wd_id(sm)?;
    Ok(Some(modified_delta(o.file, new_file)))
}

/// reads a blob's bytes, from the ODB if its oid is known, otherwise straight
/// off disk under `workdir_root` (a workdir entry not yet hashed).
pub(crate) fn read_content(
    collab: Collaborators<'_>,
    workdir_root: Option<&Path>,
    file: FileEntry,
) -> BitResult<Vec<u8>> {
    if file.oid.is_known() {
        return collab.odb.read(file.oid);
    }
    let root = workdir_root.ok_or_else(|| anyhow!("no workdir root to read `{}` from", file.path))?;
    let abs = root.join(file.path.as_path());
    if abs.symlink_metadata()?.file_type().is_symlink() {
        Ok(std::fs::read_link(&abs)?.to_string_lossy().into_owned().into_bytes())
    } else {
        Ok(std::fs::read(&abs)?)
    }
}

/// §4.D "Binary detection": size threshold plus an 8 KiB NUL scan, skippable
/// or overridable via `opts.flags`.
fn detect_binary(
    collab: Collaborators<'_>,
    workdir_root: Option<&Path>,
    old: FileEntry,
    new: FileEntry,
    opts: &DiffOpts,
) -> BitResult<DeltaFlags> {
    if opts.flags.contains(DiffFlags::FORCE_TEXT) {
        return Ok(DeltaFlags::NOT_BINARY);
    }
    if opts.flags.contains(DiffFlags::SKIP_BINARY_CHECK) {
        return Ok(DeltaFlags::empty());
    }

    let side_is_binary = |file: FileEntry| -> BitResult<bool> {
        let size = if file.oid.is_known() { collab.odb.header(file.oid)?.1 } else { file.size };
        if size > opts.max_size {
            return Ok(true);
        }
        let bytes = read_content(collab, workdir_root, file)?;
        Ok(bytes.iter().take(BINARY_SCAN_WINDOW).any(|&b| b == 0))
    };

    let binary = side_is_binary(old)? || side_is_binary(new)?;
    Ok(if binary { DeltaFlags::BINARY } else { DeltaFlags::NOT_BINARY })
}

#[cfg(test)]
mod tests;

//! the checkout planner & executor (§4.F): turns a baseline-tree-to-target-tree
//! diff plus the live workdir state into a conflict-checked plan, then applies
//! that plan to disk and the index in three passes.
//!
//! grounded on libgit2's `checkout.c`: the baseline-vs-target tree diff
//! (`INCLUDE_UNMODIFIED | INCLUDE_UNTRACKED | RECURSE_UNTRACKED_DIRS |
//! INCLUDE_IGNORED | INCLUDE_TYPECHANGE[_TREES] | SKIP_BINARY_CHECK`) feeding
//! a lockstep walk against a `dont_autoexpand` workdir iterator — the same six
//! path-order cases `checkout_action` distinguishes (wd before delta and
//! unrelated / wd is a containing directory / wd is a blocking non-directory /
//! wd equals delta / delta is a containing directory from the wd's side /
//! wd strictly after delta) — and the same three-pass apply order (remove,
//! then blob, then submodule).

use crate::attr::Resolver;
use crate::collab::Collaborators;
use crate::diff::{self, DiffFlags, DiffOpts};
use crate::error::BitResult;
use crate::filter::{Direction, FilterList};
use crate::index::{Index, IndexEntry};
use crate::iter::{BitTreeIterator, IterEntry};
use crate::model::{Delta, DeltaStatus, FileMode, Stage};
use crate::path::BitPath;
use crate::pathspec::Pathspec;
use std::io::Write as _;
use std::path::Path;

bitflags! {
    /// §6 "checkout" option group.
    pub struct CheckoutStrategy: u32 {
        const SAFE                         = 1 << 0;
        const SAFE_CREATE                  = 1 << 1;
        const FORCE                        = 1 << 2;
        const RECREATE_MISSING             = 1 << 3;
        const ALLOW_CONFLICTS              = 1 << 4;
        const REMOVE_UNTRACKED             = 1 << 5;
        const REMOVE_IGNORED               = 1 << 6;
        const UPDATE_ONLY                  = 1 << 7;
        const DONT_UPDATE_INDEX            = 1 << 8;
        const NO_REFRESH                   = 1 << 9;
        const DISABLE_PATHSPEC_MATCH       = 1 << 10;
        const SKIP_UNMERGED                = 1 << 11;
        const USE_OURS                     = 1 << 12;
        const USE_THEIRS                   = 1 << 13;
        const UPDATE_SUBMODULES            = 1 << 14;
        const UPDATE_SUBMODULES_IF_CHANGED = 1 << 15;
    }
}

impl CheckoutStrategy {
    /// the escalation ladder (§6: "FORCE implies SAFE_CREATE implies SAFE"):
    /// each level is a distinct bit, so a caller setting only `FORCE` still
    /// gets the weaker levels' behaviour without OR-ing them in by hand.
    fn normalize(self) -> Self {
        let mut s = self;
        if s.contains(Self::FORCE) {
            s |= Self::SAFE_CREATE;
        }
        if s.contains(Self::SAFE_CREATE) {
            s |= Self::SAFE;
        }
        s
    }

    fn is_safe(self) -> bool {
        self.contains(Self::SAFE)
    }

    fn is_safe_create(self) -> bool {
        self.contains(Self::SAFE_CREATE)
    }

    fn is_force(self) -> bool {
        self.contains(Self::FORCE)
    }
}

bitflags! {
    /// per-delta verdict from planning (§4.F "Planning").
    struct CheckoutAction: u8 {
        const REMOVE           = 1 << 0;
        const UPDATE_BLOB      = 1 << 1;
        const UPDATE_SUBMODULE = 1 << 2;
        const CONFLICT         = 1 << 3;
        /// the old path is a directory that should only be rmdir'd once every
        /// child under it has actually been removed (§4.F "Defer-remove").
        const DEFER_REMOVE     = 1 << 4;
    }
}

fn remove_and_update() -> CheckoutAction {
    CheckoutAction::REMOVE | CheckoutAction::UPDATE_BLOB
}

/// why a notify callback fired (§4.F "Notifications").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyReason {
    /// the checkout would overwrite or remove a workdir change.
    Conflict,
    /// the workdir differs from baseline but the target happens to agree, or
    /// vice versa; not itself fatal, just worth surfacing.
    Dirty,
    Updated,
    Untracked,
    Ignored,
}

/// `false` aborts the checkout with [`crate::error::BitError::UserAbort`]
/// (§7 `USER`), mirroring a user callback returning non-zero in the corpus.
pub type NotifyFn<'a> = dyn FnMut(NotifyReason, BitPath) -> BitResult<bool> + 'a;
pub type ProgressFn<'a> = dyn FnMut(usize, usize) + 'a;

#[derive(Default)]
pub struct CheckoutOpts<'a> {
    pub strategy: CheckoutStrategy,
    /// restricts planning to matching paths, same as the diff/iterator option
    /// of the same name (§6).
    pub pathspec: Option<Pathspec>,
    pub notify: Option<&'a mut NotifyFn<'a>>,
    pub progress: Option<&'a mut ProgressFn<'a>>,
}

/// a checkout conflict report (§7 `CONFLICT`): returned wrapped in
/// [`crate::error::BitError::CheckoutConflict`] whenever planning finds at
/// least one conflicting path and `ALLOW_CONFLICTS` is not set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutConflicts {
    pub paths: Vec<BitPath>,
}

struct PlannedAction {
    delta: Delta,
    action: CheckoutAction,
}

/// the output of [`plan`]: a fully-resolved, conflict-checked sequence of
/// actions, ready for [`apply`] to execute without any further decisions.
#[derive(Default)]
pub struct CheckoutPlan {
    actions: Vec<PlannedAction>,
    /// workdir-only paths (untracked/ignored, not part of any delta) slated
    /// for removal per `REMOVE_UNTRACKED`/`REMOVE_IGNORED`.
    extra_removes: Vec<BitPath>,
}

impl CheckoutPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.iter().all(|a| a.action.is_empty()) && self.extra_removes.is_empty()
    }

    pub fn conflicts(&self) -> Vec<BitPath> {
        self.actions.iter().filter(|a| a.action.contains(CheckoutAction::CONFLICT)).map(|a| a.delta.path()).collect()
    }

    fn step_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| {
                a.action.intersects(CheckoutAction::REMOVE | CheckoutAction::UPDATE_BLOB | CheckoutAction::UPDATE_SUBMODULE)
            })
            .count()
            + self.extra_removes.len()
    }
}

fn fire_notify(opts_notify: &mut Option<&mut NotifyFn<'_>>, reason: NotifyReason, path: BitPath) -> BitResult<()> {
    if let Some(cb) = opts_notify.as_deref_mut() {
        if !cb(reason, path)? {
            return Err(crate::error::BitError::UserAbort.into());
        }
    }
    Ok(())
}

/// §4.F "Planning". `baseline` and `target` must both be constructed with
/// `include_trees = true` (same requirement as [`diff::diff`]); `workdir`
/// must be constructed with `dont_autoexpand = true` so that an entirely
/// untracked directory surfaces as one entry rather than its leaves.
pub fn plan(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    index: &Index,
    baseline: &mut dyn BitTreeIterator,
    target: &mut dyn BitTreeIterator,
    workdir: &mut dyn BitTreeIterator,
    opts: &mut CheckoutOpts<'_>,
) -> BitResult<CheckoutPlan> {
    let strategy = opts.strategy.normalize();

    let mut diff_flags = DiffFlags::INCLUDE_UNMODIFIED
        | DiffFlags::INCLUDE_UNTRACKED
        | DiffFlags::RECURSE_UNTRACKED_DIRS
        | DiffFlags::INCLUDE_IGNORED
        | DiffFlags::INCLUDE_TYPECHANGE
        | DiffFlags::INCLUDE_TYPECHANGE_TREES
        | DiffFlags::SKIP_BINARY_CHECK;
    if strategy.contains(CheckoutStrategy::DISABLE_PATHSPEC_MATCH) {
        diff_flags |= DiffFlags::DISABLE_PATHSPEC_MATCH;
    }
    let diff_opts = DiffOpts { flags: diff_flags, ..Default::default() };
    let deltas = diff::diff(collab, resolver, None, baseline, target, &diff_opts)?;

    let mut result = CheckoutPlan::default();
    let mut wd_cur = workdir.current()?;

    for delta in deltas.iter().copied() {
        if let Some(spec) = &opts.pathspec {
            if !spec.matches(delta.path(), delta.new_file.is_tree() || delta.old_file.is_tree()) {
                continue;
            }
        }

        let action = drive_one(
            collab,
            resolver,
            workdir_root,
            strategy,
            index,
            &delta,
            workdir,
            &mut wd_cur,
            &mut opts.notify,
            &mut result.extra_removes,
        )?;
        result.actions.push(PlannedAction { delta, action });
    }

    while let Some(wd) = wd_cur {
        handle_wd_only(strategy, index, opts, &mut result.extra_removes, wd)?;
        wd_cur = workdir.advance()?;
    }

    let conflicts = result.conflicts();
    if !conflicts.is_empty() && !strategy.contains(CheckoutStrategy::ALLOW_CONFLICTS) {
        return Err(crate::error::BitError::CheckoutConflict(CheckoutConflicts { paths: conflicts }).into());
    }

    Ok(result)
}

/// the per-delta lockstep against the workdir cursor (§4.F, the six cases of
/// `checkout_action`).
#[allow(clippy::too_many_arguments)]
fn drive_one(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    strategy: CheckoutStrategy,
    index: &Index,
    delta: &Delta,
    workdir: &mut dyn BitTreeIterator,
    wd_cur: &mut Option<IterEntry>,
    notify: &mut Option<&mut NotifyFn<'_>>,
    extra_removes: &mut Vec<BitPath>,
) -> BitResult<CheckoutAction> {
    let delta_path = delta.old_file.path;

    loop {
        let Some(wd) = *wd_cur else {
            return action_no_wd(strategy, delta, notify);
        };
        let wd_path = wd.path();

        if wd_path < delta_path {
            if delta_path.as_str().starts_with(&format!("{}/", wd_path)) {
                if wd.is_tree() {
                    *wd_cur = workdir.advance_into()?;
                    continue;
                }
                // case 3: `wd` is a plain file sitting where the target needs a
                // directory to descend into — it blocks every delta beneath it.
                let action = action_with_wd_blocker(strategy, delta, notify)?;
                *wd_cur = workdir.advance()?;
                return Ok(action);
            }
            handle_wd_only_cursor(strategy, index, notify, extra_removes, wd)?;
            *wd_cur = workdir.advance()?;
            continue;
        }

        if wd_path == delta_path {
            let expected_tree = delta.old_file.is_tree() || delta.new_file.is_tree();
            let action = if wd.is_tree() != expected_tree {
                // the path matches but the kinds don't: a subtree sitting where a
                // blob is expected, or vice versa (case 3's mirror image).
                action_with_wd_blocker(strategy, delta, notify)?
            } else {
                action_with_wd(collab, resolver, workdir_root, strategy, delta, wd, notify)?
            };
            *wd_cur = workdir.advance()?;
            return Ok(action);
        }

        // wd_path > delta_path
        if !delta_path.is_empty() && wd_path.as_str().starts_with(&format!("{}/", delta_path)) {
            return action_with_wd_dir(strategy, delta, notify);
        }

        return action_no_wd(strategy, delta, notify);
    }
}

fn is_tracked(index: &Index, entry: IterEntry) -> bool {
    if entry.is_tree() {
        let prefix = format!("{}/", entry.path());
        index.iter().any(|e| e.stage == Stage::Merged && (e.path() == entry.path() || e.path().as_str().starts_with(&prefix)))
    } else {
        index.find(entry.path(), Stage::Merged).is_some()
    }
}

/// case 1 inside the main loop: a workdir entry with no corresponding delta.
fn handle_wd_only_cursor(
    strategy: CheckoutStrategy,
    index: &Index,
    notify: &mut Option<&mut NotifyFn<'_>>,
    extra_removes: &mut Vec<BitPath>,
    wd: IterEntry,
) -> BitResult<()> {
    let (reason, remove) = if is_tracked(index, wd) {
        (NotifyReason::Dirty, strategy.is_force())
    } else if wd.ignored {
        (NotifyReason::Ignored, strategy.contains(CheckoutStrategy::REMOVE_IGNORED))
    } else {
        (NotifyReason::Untracked, strategy.contains(CheckoutStrategy::REMOVE_UNTRACKED))
    };
    fire_notify(notify, reason, wd.path())?;
    if remove {
        extra_removes.push(wd.path());
    }
    Ok(())
}

/// the tail drain after the delta loop is exhausted (§4.F "remaining workdir
/// items"), honouring the pathspec the same way the main loop does.
fn handle_wd_only(
    strategy: CheckoutStrategy,
    index: &Index,
    opts: &mut CheckoutOpts<'_>,
    extra_removes: &mut Vec<BitPath>,
    wd: IterEntry,
) -> BitResult<()> {
    if let Some(spec) = &opts.pathspec {
        if !spec.matches(wd.path(), wd.is_tree()) {
            return Ok(());
        }
    }
    handle_wd_only_cursor(strategy, index, &mut opts.notify, extra_removes, wd)
}

/// §4.F decision table, case 4 ("wd equals delta").
#[allow(clippy::too_many_arguments)]
fn action_with_wd(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    strategy: CheckoutStrategy,
    delta: &Delta,
    wd: IterEntry,
    notify: &mut Option<&mut NotifyFn<'_>>,
) -> BitResult<CheckoutAction> {
    use CheckoutAction as A;
    let dirty = if delta.old_file.is_tree() || delta.old_file.mode.is_gitlink() {
        // a directory/gitlink baseline has no blob content to rehash; only
        // the type-matching done by the caller is meaningful here.
        false
    } else {
        workdir_dirty(collab, resolver, workdir_root, delta.old_file, wd)?
    };

    let mut action = match delta.status {
        DeltaStatus::Unmodified =>
            if dirty {
                fire_notify(notify, NotifyReason::Dirty, wd.path())?;
                if_flag(strategy.is_force(), A::UPDATE_BLOB)
            } else {
                A::empty()
            },
        DeltaStatus::Added => if_flag_else(strategy.is_force(), A::UPDATE_BLOB, A::CONFLICT),
        DeltaStatus::Deleted =>
            if dirty {
                if_flag_else(strategy.is_force(), A::REMOVE, A::CONFLICT)
            } else {
                if_flag(strategy.is_safe(), A::REMOVE)
            },
        DeltaStatus::Modified =>
            if dirty {
                if_flag_else(strategy.is_force(), A::UPDATE_BLOB, A::CONFLICT)
            } else {
                if_flag(strategy.is_safe(), A::UPDATE_BLOB)
            },
        DeltaStatus::Typechange => {
            let mut action = if delta.old_file.is_tree() {
                if wd.is_tree() || wd.file.mode.is_gitlink() {
                    if_flag(strategy.is_safe(), A::UPDATE_BLOB)
                } else {
                    if_flag_else(strategy.is_force(), A::REMOVE, A::CONFLICT)
                }
            } else if dirty {
                if_flag_else(strategy.is_force(), remove_and_update(), A::CONFLICT)
            } else {
                if_flag(strategy.is_safe(), remove_and_update())
            };
            if delta.new_file.is_tree() {
                action.remove(A::UPDATE_BLOB);
            }
            action
        }
        _ => A::empty(),
    };

    finalize(&mut action, delta, notify)?;
    Ok(action)
}

/// decision table case 2/3 sibling: "wd item blocks the directory a deeper
/// delta path needs" (`checkout_action_with_wd_blocker`).
fn action_with_wd_blocker(
    strategy: CheckoutStrategy,
    delta: &Delta,
    notify: &mut Option<&mut NotifyFn<'_>>,
) -> BitResult<CheckoutAction> {
    use CheckoutAction as A;
    let mut action = match delta.status {
        DeltaStatus::Unmodified => {
            fire_notify(notify, NotifyReason::Dirty, delta.path())?;
            if_flag(strategy.is_force(), remove_and_update())
        }
        DeltaStatus::Added | DeltaStatus::Modified | DeltaStatus::Typechange =>
            if_flag_else(strategy.is_force(), remove_and_update(), A::CONFLICT),
        DeltaStatus::Deleted => if_flag_else(strategy.is_force(), A::REMOVE, A::CONFLICT),
        _ => A::empty(),
    };
    finalize(&mut action, delta, notify)?;
    Ok(action)
}

/// decision table case 5: "delta names a path which, in the workdir, is
/// itself a (still-nonempty) directory" (`checkout_action_with_wd_dir`).
fn action_with_wd_dir(
    strategy: CheckoutStrategy,
    delta: &Delta,
    notify: &mut Option<&mut NotifyFn<'_>>,
) -> BitResult<CheckoutAction> {
    use CheckoutAction as A;
    let mut action = match delta.status {
        DeltaStatus::Unmodified => {
            fire_notify(notify, NotifyReason::Dirty, delta.path())?;
            A::empty()
        }
        DeltaStatus::Added | DeltaStatus::Modified =>
            if delta.old_file.mode.is_gitlink() {
                A::empty()
            } else if !delta.new_file.is_tree() {
                if_flag_else(strategy.is_force(), remove_and_update(), A::CONFLICT)
            } else {
                A::empty()
            },
        DeltaStatus::Deleted => A::empty(),
        DeltaStatus::Typechange =>
            if delta.old_file.is_tree() {
                let action = if_flag(strategy.is_safe(), A::UPDATE_BLOB);
                if action.is_empty() { action } else { action | A::DEFER_REMOVE }
            } else if !delta.new_file.is_tree() {
                if_flag_else(strategy.is_force(), remove_and_update(), A::CONFLICT)
            } else {
                A::empty()
            },
        _ => A::empty(),
    };
    finalize(&mut action, delta, notify)?;
    Ok(action)
}

/// decision table, no corresponding workdir entry at all (`checkout_action_no_wd`).
fn action_no_wd(
    strategy: CheckoutStrategy,
    delta: &Delta,
    notify: &mut Option<&mut NotifyFn<'_>>,
) -> BitResult<CheckoutAction> {
    use CheckoutAction as A;
    let mut action = match delta.status {
        DeltaStatus::Unmodified => {
            fire_notify(notify, NotifyReason::Dirty, delta.path())?;
            if_flag(strategy.is_safe_create(), A::UPDATE_BLOB)
        }
        DeltaStatus::Added | DeltaStatus::Modified => if_flag(strategy.is_safe(), A::UPDATE_BLOB),
        DeltaStatus::Typechange =>
            if delta.new_file.is_tree() { if_flag(strategy.is_safe(), A::UPDATE_BLOB) } else { A::empty() },
        _ => A::empty(),
    };
    finalize(&mut action, delta, notify)?;
    Ok(action)
}

/// `checkout_action_common`: gitlink retargeting, plus the updated/conflict
/// notifications every classifier funnels through.
fn finalize(action: &mut CheckoutAction, delta: &Delta, notify: &mut Option<&mut NotifyFn<'_>>) -> BitResult<()> {
    if action.contains(CheckoutAction::UPDATE_BLOB) && delta.new_file.mode.is_gitlink() {
        action.remove(CheckoutAction::UPDATE_BLOB);
        *action |= CheckoutAction::UPDATE_SUBMODULE;
    }
    if action.contains(CheckoutAction::UPDATE_BLOB) || action.contains(CheckoutAction::UPDATE_SUBMODULE) {
        fire_notify(notify, NotifyReason::Updated, delta.path())?;
    }
    if action.contains(CheckoutAction::CONFLICT) {
        fire_notify(notify, NotifyReason::Conflict, delta.path())?;
    }
    Ok(())
}

fn if_flag(cond: bool, action: CheckoutAction) -> CheckoutAction {
    if cond { action } else { CheckoutAction::empty() }
}

fn if_flag_else(cond: bool, yes: CheckoutAction, no: CheckoutAction) -> CheckoutAction {
    if cond { yes } else { no }
}

/// the `SAFE`-path dirty check (§4.F "Workdir modification test"): a size
/// mismatch against a known baseline size is conclusive; otherwise we fall
/// through to (b) and actually recompute the workdir content's oid, since a
/// workdir [`IterEntry`] never carries a pre-hashed oid (unlike an index
/// entry, nothing has hashed it yet) — there is no shortcut that can settle
/// same-size files without reading them.
fn workdir_dirty(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    baseline: crate::model::FileEntry,
    wd: IterEntry,
) -> BitResult<bool> {
    if baseline.oid.is_unknown() {
        return Ok(true);
    }
    if let Some(stat) = wd.file.stat {
        if stat.size != baseline.size {
            return Ok(true);
        }
    }

    let bytes = diff::read_content(collab, Some(workdir_root), wd.file)?;
    let filtered = FilterList::load(resolver, collab.config, wd.file.path, false, Direction::ToOdb)?.apply(&bytes)?;
    let new_oid = collab.odb.hash(&filtered, crate::collab::ObjType::Blob)?;
    Ok(new_oid != baseline.oid)
}

/// §4.F "Application": executes `plan` against `workdir_root` and `index` in
/// the three fixed passes (remove, blob, submodule), updating the index
/// alongside the workdir unless `DONT_UPDATE_INDEX`.
pub fn apply(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    index: &mut Index,
    plan: &CheckoutPlan,
    opts: &mut CheckoutOpts<'_>,
) -> BitResult<()> {
    let strategy = opts.strategy.normalize();
    let total = plan.step_count();
    let mut completed = 0;
    let mut report = |completed: usize, total: usize| {
        if let Some(cb) = opts.progress.as_deref_mut() {
            cb(completed, total);
        }
    };
    report(0, total);

    for path in &plan.extra_removes {
        remove_path(workdir_root, *path)?;
        if !strategy.contains(CheckoutStrategy::DONT_UPDATE_INDEX) {
            index.remove_prefixed(*path);
        }
        completed += 1;
        report(completed, total);
    }

    for planned in &plan.actions {
        if planned.action.contains(CheckoutAction::REMOVE) {
            remove_path(workdir_root, planned.delta.old_file.path)?;
            if !strategy.contains(CheckoutStrategy::DONT_UPDATE_INDEX) {
                index.remove_prefixed(planned.delta.old_file.path);
            }
            completed += 1;
            report(completed, total);
        }
    }

    for planned in &plan.actions {
        if planned.action.contains(CheckoutAction::DEFER_REMOVE) {
            try_rmdir_if_empty(workdir_root, planned.delta.old_file.path);
        }
        if planned.action.contains(CheckoutAction::UPDATE_BLOB) {
            write_blob(
                collab,
                resolver,
                workdir_root,
                planned.delta.new_file.path,
                planned.delta.new_file.mode,
                planned.delta.new_file.oid,
            )?;
            if !strategy.contains(CheckoutStrategy::DONT_UPDATE_INDEX) {
                index.add_entry(IndexEntry::from(planned.delta.new_file));
            }
            completed += 1;
            report(completed, total);
        }
    }

    for planned in &plan.actions {
        if planned.action.contains(CheckoutAction::UPDATE_SUBMODULE) {
            write_gitlink(workdir_root, planned.delta.new_file.path)?;
            if !strategy.contains(CheckoutStrategy::DONT_UPDATE_INDEX) {
                index.add_entry(IndexEntry::from(planned.delta.new_file));
            }
            completed += 1;
            report(completed, total);
        }
    }

    Ok(())
}

fn remove_path(workdir_root: &Path, path: BitPath) -> BitResult<()> {
    let abs = workdir_root.join(path.as_path());
    match std::fs::symlink_metadata(&abs) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&abs)?,
        Ok(_) => std::fs::remove_file(&abs)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// rmdir-if-empty for a deferred removal (§4.F "Defer-remove"); a directory
/// that still has children (an untracked file blocked an earlier pass) is
/// left in place rather than forced, and a missing directory is not an error.
fn try_rmdir_if_empty(workdir_root: &Path, path: BitPath) {
    let abs = workdir_root.join(path.as_path());
    let _ = std::fs::remove_dir(&abs);
}

fn write_blob(
    collab: Collaborators<'_>,
    resolver: &Resolver<'_>,
    workdir_root: &Path,
    path: BitPath,
    mode: FileMode,
    oid: crate::model::Oid,
) -> BitResult<()> {
    let abs = workdir_root.join(path.as_path());
    if let Some(parent) = abs.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let bytes = collab.odb.read(oid)?;
    let filters = FilterList::load(resolver, collab.config, path, false, Direction::ToWorktree)?.with_oid_hex(oid.to_string());
    let content = filters.apply(&bytes)?;

    match std::fs::symlink_metadata(&abs) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(&abs)?,
        Ok(_) => std::fs::remove_file(&abs)?,
        Err(_) => {}
    }

    match mode {
        FileMode::Symlink => {
            let target = String::from_utf8_lossy(&content).into_owned();
            std::os::unix::fs::symlink(target, &abs)?;
        }
        FileMode::Executable => crate::fs::atomic_write(&abs, &content, Some(0o755))?,
        FileMode::Regular => crate::fs::atomic_write(&abs, &content, Some(0o644))?,
        FileMode::Tree | FileMode::Gitlink => bail!("write_blob called on a non-blob mode for `{}`", path),
    }
    Ok(())
}

/// writes the gitlink placeholder a submodule's working directory carries in
/// place of a real checkout: a `.git` file pointing at the submodule's entry
/// under `<workdir>/.git/modules` (§6 "gitlink placeholder format").
fn write_gitlink(workdir_root: &Path, path: BitPath) -> BitResult<()> {
    let sm_dir = workdir_root.join(path.as_path());
    std::fs::create_dir_all(&sm_dir)?;
    let store_dir = workdir_root.join(".git").join("modules").join(path.as_path());
    let rel = pathdiff::diff_paths(&store_dir, &sm_dir).unwrap_or(store_dir);
    let mut file = std::fs::File::create(sm_dir.join(".git"))?;
    writeln!(file, "gitdir: {}", rel.display())?;
    Ok(())
}

#[cfg(test)]
mod tests;

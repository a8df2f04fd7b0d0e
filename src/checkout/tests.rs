use super::*;
use crate::collab::MapConfig;
use crate::diff::tests::{FakeOdb, NullRefs, NullSubmodules};
use crate::index::Index;
use crate::model::{FileMode, Stage};
use std::fs;
use tempfile::tempdir;

fn collab<'a>(odb: &'a FakeOdb, refs: &'a NullRefs, config: &'a MapConfig, subs: &'a NullSubmodules) -> Collaborators<'a> {
    Collaborators { odb, refs, config, submodules: subs }
}

fn baseline_tree_iter<'c>(odb: &'c FakeOdb, root: crate::model::Oid) -> BitResult<crate::iter::tree_iter::TreeIter<'c>> {
    crate::iter::tree_iter::TreeIter::new(odb, root, crate::iter::IterOpts { include_trees: true, ..Default::default() })
}

fn workdir_iter<'c>(root: &Path, resolver: &'c Resolver<'c>) -> BitResult<crate::iter::WorktreeIter<'c>> {
    crate::iter::WorktreeIter::new(
        root.to_owned(),
        resolver,
        crate::iter::IterOpts { dont_autoexpand: true, include_trees: true, ..Default::default() },
    )
}

#[test]
fn safe_checkout_writes_a_newly_added_file() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;

    let odb = FakeOdb::new();
    let blob = odb.blob(b"hello");
    let baseline_root = odb.tree(&[]);
    let target_root = odb.tree(&[("a.txt", FileMode::Regular, blob)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let c = collab(&odb, &refs, &config, &subs);
    let resolver = Resolver::new(root, root.join(".git/info"), &config);

    let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
    let mut target = baseline_tree_iter(&odb, target_root)?;
    let mut workdir = workdir_iter(root, &resolver)?;

    let mut index = Index::new();
    let mut opts = CheckoutOpts { strategy: CheckoutStrategy::SAFE, ..Default::default() };
    let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
    assert!(plan.conflicts().is_empty());

    apply(c, &resolver, root, &mut index, &plan, &mut opts)?;
    assert_eq!(fs::read_to_string(root.join("a.txt"))?, "hello");
    assert!(index.find(BitPath::intern("a.txt"), Stage::Merged).is_some());
    Ok(())
}

#[test]
fn safe_checkout_updates_silently_when_only_target_differs_from_baseline() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join("a.txt"), "original content")?;

    let odb = FakeOdb::new();
    let old_blob = odb.blob(b"original content");
    let new_blob = odb.blob(b"updated content");
    let baseline_root = odb.tree(&[("a.txt", FileMode::Regular, old_blob)]);
    let target_root = odb.tree(&[("a.txt", FileMode::Regular, new_blob)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let c = collab(&odb, &refs, &config, &subs);
    let resolver = Resolver::new(root, root.join(".git/info"), &config);

    let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
    let mut target = baseline_tree_iter(&odb, target_root)?;
    let mut workdir = workdir_iter(root, &resolver)?;
    let mut index = Index::new();
    index.add_entry(IndexEntry::new(
        crate::model::FileEntry::new(BitPath::intern("a.txt"), FileMode::Regular, old_blob),
        Stage::Merged,
    ));

    // the workdir file is byte-for-byte what baseline expects (only the
    // user's editor touched its mtime): SAFE must update it silently rather
    // than reporting a conflict, since nothing local was actually changed.
    let mut opts = CheckoutOpts { strategy: CheckoutStrategy::SAFE, ..Default::default() };
    let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
    assert!(plan.conflicts().is_empty());

    apply(c, &resolver, root, &mut index, &plan, &mut opts)?;
    assert_eq!(fs::read_to_string(root.join("a.txt"))?, "updated content");
    Ok(())
}

#[test]
fn safe_checkout_conflicts_on_a_dirty_file_force_overwrites_it() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join("a.txt"), "locally edited, not what baseline expects")?;

    let odb = FakeOdb::new();
    let old_blob = odb.blob(b"original content");
    let new_blob = odb.blob(b"updated content");
    let baseline_root = odb.tree(&[("a.txt", FileMode::Regular, old_blob)]);
    let target_root = odb.tree(&[("a.txt", FileMode::Regular, new_blob)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let c = collab(&odb, &refs, &config, &subs);
    let resolver = Resolver::new(root, root.join(".git/info"), &config);

    {
        let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
        let mut target = baseline_tree_iter(&odb, target_root)?;
        let mut workdir = workdir_iter(root, &resolver)?;
        let mut index = Index::new();
        index.add_entry(IndexEntry::new(
            crate::model::FileEntry::new(BitPath::intern("a.txt"), FileMode::Regular, old_blob),
            Stage::Merged,
        ));
        let mut opts = CheckoutOpts { strategy: CheckoutStrategy::SAFE, ..Default::default() };
        let err = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts).unwrap_err();
        assert!(err.downcast_ref::<crate::error::BitError>().is_some());
    }

    let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
    let mut target = baseline_tree_iter(&odb, target_root)?;
    let mut workdir = workdir_iter(root, &resolver)?;
    let mut index = Index::new();
    index.add_entry(IndexEntry::new(
        crate::model::FileEntry::new(BitPath::intern("a.txt"), FileMode::Regular, old_blob),
        Stage::Merged,
    ));
    let mut opts = CheckoutOpts { strategy: CheckoutStrategy::FORCE, ..Default::default() };
    let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
    apply(c, &resolver, root, &mut index, &plan, &mut opts)?;
    assert_eq!(fs::read_to_string(root.join("a.txt"))?, "updated content");
    Ok(())
}

#[test]
fn untracked_file_survives_unless_remove_untracked_is_set() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join("extra.txt"), "not part of either tree")?;

    let odb = FakeOdb::new();
    let blob = odb.blob(b"hello");
    let tree_root = odb.tree(&[("a.txt", FileMode::Regular, blob)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let c = collab(&odb, &refs, &config, &subs);
    let resolver = Resolver::new(root, root.join(".git/info"), &config);

    {
        let mut baseline = baseline_tree_iter(&odb, tree_root)?;
        let mut target = baseline_tree_iter(&odb, tree_root)?;
        let mut workdir = workdir_iter(root, &resolver)?;
        let index = Index::new();
        let mut opts = CheckoutOpts { strategy: CheckoutStrategy::SAFE, ..Default::default() };
        let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
        assert!(plan.extra_removes.is_empty());
    }

    let mut baseline = baseline_tree_iter(&odb, tree_root)?;
    let mut target = baseline_tree_iter(&odb, tree_root)?;
    let mut workdir = workdir_iter(root, &resolver)?;
    let index = Index::new();
    let mut opts =
        CheckoutOpts { strategy: CheckoutStrategy::SAFE | CheckoutStrategy::REMOVE_UNTRACKED, ..Default::default() };
    let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
    assert_eq!(plan.extra_removes, vec![BitPath::intern("extra.txt")]);
    Ok(())
}

#[test]
fn directory_blocking_a_file_checkout_conflicts_without_force_and_removes_with_it() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::create_dir(root.join("old"))?;
    fs::write(root.join("old/u"), "untracked nested file")?;

    let odb = FakeOdb::new();
    let old_blob = odb.blob(b"was a file");
    let new_blob = odb.blob(b"still a file, different content");
    let baseline_root = odb.tree(&[("old", FileMode::Regular, old_blob)]);
    let target_root = odb.tree(&[("old", FileMode::Regular, new_blob)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let c = collab(&odb, &refs, &config, &subs);
    let resolver = Resolver::new(root, root.join(".git/info"), &config);

    {
        let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
        let mut target = baseline_tree_iter(&odb, target_root)?;
        let mut workdir = workdir_iter(root, &resolver)?;
        let index = Index::new();
        let mut opts = CheckoutOpts { strategy: CheckoutStrategy::SAFE, ..Default::default() };
        assert!(plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts).is_err());
    }

    let mut baseline = baseline_tree_iter(&odb, baseline_root)?;
    let mut target = baseline_tree_iter(&odb, target_root)?;
    let mut workdir = workdir_iter(root, &resolver)?;
    let mut index = Index::new();
    let mut opts = CheckoutOpts { strategy: CheckoutStrategy::FORCE, ..Default::default() };
    let plan = plan(c, &resolver, root, &index, &mut baseline, &mut target, &mut workdir, &mut opts)?;
    apply(c, &resolver, root, &mut index, &plan, &mut opts)?;

    assert!(root.join("old").is_file());
    assert_eq!(fs::read_to_string(root.join("old"))?, "still a file, different content");
    Ok(())
}

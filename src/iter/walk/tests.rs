use super::*;
use crate::iter::tests::FakeOdb;
use crate::iter::tree_iter::TreeIter;
use crate::iter::IterOpts;
use crate::model::FileMode;
use crate::path::BitPath;

fn paths(slots: &[Option<IterEntry>]) -> Vec<Option<BitPath>> {
    slots.iter().map(|e| e.map(|e| e.path())).collect()
}

#[test]
fn walk_aligns_matching_paths_across_two_trees() -> BitResult<()> {
    let mut odb_a = FakeOdb::new();
    let root_a =
        odb_a.tree(1, &[("a.txt", FileMode::Regular, 1), ("b.txt", FileMode::Regular, 2)]);
    let mut odb_b = FakeOdb::new();
    let root_b =
        odb_b.tree(1, &[("a.txt", FileMode::Regular, 9), ("c.txt", FileMode::Regular, 3)]);

    let iter_a: Box<dyn BitTreeIterator> = Box::new(TreeIter::new(&odb_a, root_a, IterOpts::default())?);
    let iter_b: Box<dyn BitTreeIterator> = Box::new(TreeIter::new(&odb_b, root_b, IterOpts::default())?);
    let mut walk = WalkIterators::new([iter_a, iter_b]);

    let step1 = walk.next()?.expect("a.txt aligned");
    assert_eq!(paths(&step1), vec![Some(BitPath::intern("a.txt")), Some(BitPath::intern("a.txt"))]);

    let step2 = walk.next()?.expect("b.txt only on the left");
    assert_eq!(paths(&step2), vec![Some(BitPath::intern("b.txt")), None]);

    let step3 = walk.next()?.expect("c.txt only on the right");
    assert_eq!(paths(&step3), vec![None, Some(BitPath::intern("c.txt"))]);

    assert!(walk.next()?.is_none());
    Ok(())
}

#[test]
fn walk_skips_identical_subtree_by_oid() -> BitResult<()> {
    // `include_trees` keeps the "dir" node itself visible to the merge so it
    // can be compared and skipped whole, rather than auto-expanded away.
    let opts = IterOpts { include_trees: true, ..Default::default() };

    let mut odb_a = FakeOdb::new();
    odb_a.tree(2, &[("x.txt", FileMode::Regular, 5)]);
    let root_a = odb_a.tree(1, &[("dir", FileMode::Tree, 2)]);

    let mut odb_b = FakeOdb::new();
    odb_b.tree(2, &[("x.txt", FileMode::Regular, 5)]);
    let root_b = odb_b.tree(1, &[("dir", FileMode::Tree, 2)]);

    let iter_a: Box<dyn BitTreeIterator> = Box::new(TreeIter::new(&odb_a, root_a, opts.clone())?);
    let iter_b: Box<dyn BitTreeIterator> = Box::new(TreeIter::new(&odb_b, root_b, opts)?);
    let mut walk = WalkIterators::new([iter_a, iter_b]);

    // identical subtree by oid is skipped whole via `advance_over`, never
    // descending into `x.txt` on either side.
    let step1 = walk.next()?.expect("dir aligned and skipped as one unit");
    assert_eq!(paths(&step1), vec![Some(BitPath::intern("dir")), Some(BitPath::intern("dir"))]);
    assert!(walk.next()?.is_none());
    Ok(())
}

use super::*;
use crate::attr::Resolver;
use crate::collab::{MapConfig, Reference, SubmoduleHandle};
use crate::iter::tree_iter::TreeIter;
use crate::iter::IterOpts;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::io::Read;

/// a fully content-addressed in-memory object database: unlike
/// [`crate::iter::tests::FakeOdb`] (trees only, for exercising iteration
/// alone) this one also stores and hashes blobs, which the diff engine needs
/// whenever a workdir-side oid isn't known up front. Crate-visible so the
/// checkout and rename-finder tests can share it rather than re-deriving the
/// same fixture.
#[derive(Default)]
pub(crate) struct FakeOdb {
    trees: RefCell<FxHashMap<Oid, Vec<crate::collab::TreeEntry>>>,
    blobs: RefCell<FxHashMap<Oid, Vec<u8>>>,
}

fn fake_hash(bytes: &[u8]) -> Oid {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    bytes.hash(&mut hasher);
    let h = hasher.finish();
    let mut arr = [0u8; 20];
    arr[..8].copy_from_slice(&h.to_le_bytes());
    Oid::new(arr)
}

impl FakeOdb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn blob(&self, content: &[u8]) -> Oid {
        let oid = fake_hash(content);
        self.blobs.borrow_mut().insert(oid, content.to_vec());
        oid
    }

    pub(crate) fn tree(&self, entries: &[(&str, crate::model::FileMode, Oid)]) -> Oid {
        let entries: Vec<_> = entries
            .iter()
            .map(|&(path, mode, oid)| crate::collab::TreeEntry { path: crate::path::BitPath::intern(path), mode, oid })
            .collect();
        let mut bytes = Vec::new();
        for e in &entries {
            bytes.extend_from_slice(e.path.as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(e.oid.as_bytes());
        }
        let oid = fake_hash(&bytes);
        self.trees.borrow_mut().insert(oid, entries);
        oid
    }
}

impl crate::collab::Odb for FakeOdb {
    fn read(&self, oid: Oid) -> BitResult<Vec<u8>> {
        self.blobs.borrow().get(&oid).cloned().ok_or_else(|| anyhow!("no such blob `{}`", oid))
    }

    fn read_tree(&self, oid: Oid) -> BitResult<Vec<crate::collab::TreeEntry>> {
        self.trees.borrow().get(&oid).cloned().ok_or_else(|| anyhow!("no such tree `{}`", oid))
    }

    fn hash(&self, bytes: &[u8], _kind: crate::collab::ObjType) -> BitResult<Oid> {
        Ok(self.blob(bytes))
    }

    fn hash_reader(&self, reader: &mut dyn Read, _size: u64, _kind: crate::collab::ObjType) -> BitResult<Oid> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(self.blob(&buf))
    }

    fn header(&self, oid: Oid) -> BitResult<(crate::collab::ObjType, u64)> {
        let len = self.blobs.borrow().get(&oid).map(|b| b.len() as u64).unwrap_or(0);
        Ok((crate::collab::ObjType::Blob, len))
    }
}

/// a [`crate::collab::RefStore`] that never resolves anything — neither the
/// diff engine nor the checkout planner consults refs, so tests only need it
/// to satisfy [`Collaborators`]'s shape.
pub(crate) struct NullRefs;

impl crate::collab::RefStore for NullRefs {
    fn lookup(&self, _name: &str) -> BitResult<Option<Reference>> {
        Ok(None)
    }

    fn peel_to_tree(&self, _reference: &Reference) -> BitResult<Option<Oid>> {
        Ok(None)
    }
}

/// a [`crate::collab::SubmoduleStore`] with no known submodules.
pub(crate) struct NullSubmodules;

impl crate::collab::SubmoduleStore for NullSubmodules {
    fn lookup(&self, _path: crate::path::BitPath) -> BitResult<Option<SubmoduleHandle>> {
        Ok(None)
    }

    fn status(&self, _sm: SubmoduleHandle) -> BitResult<crate::collab::SubmoduleStatus> {
        Ok(crate::collab::SubmoduleStatus::empty())
    }

    fn wd_id(&self, _sm: SubmoduleHandle) -> BitResult<Oid> {
        Ok(Oid::UNKNOWN)
    }

    fn ignore(&self, _sm: SubmoduleHandle) -> BitResult<crate::collab::SubmoduleIgnore> {
        Ok(crate::collab::SubmoduleIgnore::None)
    }
}

fn collab<'a>(odb: &'a FakeOdb, refs: &'a NullRefs, config: &'a MapConfig, subs: &'a NullSubmodules) -> Collaborators<'a> {
    Collaborators { odb, refs, config, submodules: subs }
}

fn tree_iter<'c>(odb: &'c FakeOdb, root: Oid) -> BitResult<TreeIter<'c>> {
    TreeIter::new(odb, root, IterOpts { include_trees: true, ..Default::default() })
}

fn null_resolver(config: &MapConfig) -> Resolver<'_> {
    Resolver::new(std::path::Path::new("/does/not/matter"), std::path::PathBuf::from("/dev/null"), config)
}

#[test]
fn identical_trees_produce_no_deltas() -> BitResult<()> {
    let odb = FakeOdb::new();
    let a_oid = odb.blob(b"hello");
    let root = odb.tree(&[("a.txt", FileMode::Regular, a_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, root)?;
    let mut new = tree_iter(&odb, root)?;
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &DiffOpts::default())?;
    assert!(deltas.is_empty());
    Ok(())
}

#[test]
fn added_file_is_reported() -> BitResult<()> {
    let odb = FakeOdb::new();
    let a_oid = odb.blob(b"hello");
    let old_root = odb.tree(&[]);
    let new_root = odb.tree(&[("a.txt", FileMode::Regular, a_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &DiffOpts::default())?;
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas.iter().next().unwrap().status, DeltaStatus::Added);
    Ok(())
}

#[test]
fn deleted_file_is_reported() -> BitResult<()> {
    let odb = FakeOdb::new();
    let a_oid = odb.blob(b"hello");
    let old_root = odb.tree(&[("a.txt", FileMode::Regular, a_oid)]);
    let new_root = odb.tree(&[]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &DiffOpts::default())?;
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas.iter().next().unwrap().status, DeltaStatus::Deleted);
    Ok(())
}

#[test]
fn modified_content_is_reported_via_oid_mismatch() -> BitResult<()> {
    let odb = FakeOdb::new();
    let old_oid = odb.blob(b"version one");
    let new_oid = odb.blob(b"version two");
    let old_root = odb.tree(&[("a.txt", FileMode::Regular, old_oid)]);
    let new_root = odb.tree(&[("a.txt", FileMode::Regular, new_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let opts = DiffOpts { flags: DiffFlags::SKIP_BINARY_CHECK, ..Default::default() };
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &opts)?;
    assert_eq!(deltas.len(), 1);
    let delta = deltas.iter().next().unwrap();
    assert_eq!(delta.status, DeltaStatus::Modified);
    assert_eq!(delta.old_file.oid, old_oid);
    assert_eq!(delta.new_file.oid, new_oid);
    Ok(())
}

#[test]
fn typechange_is_reported_when_requested() -> BitResult<()> {
    let odb = FakeOdb::new();
    let blob_oid = odb.blob(b"target");
    let old_root = odb.tree(&[("a", FileMode::Regular, blob_oid)]);
    let new_root = odb.tree(&[("a", FileMode::Symlink, blob_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let opts = DiffOpts { flags: DiffFlags::INCLUDE_TYPECHANGE, ..Default::default() };
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &opts)?;
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas.iter().next().unwrap().status, DeltaStatus::Typechange);
    Ok(())
}

#[test]
fn typechange_without_the_flag_falls_back_to_delete_plus_add() -> BitResult<()> {
    let odb = FakeOdb::new();
    let blob_oid = odb.blob(b"target");
    let old_root = odb.tree(&[("a", FileMode::Regular, blob_oid)]);
    let new_root = odb.tree(&[("a", FileMode::Symlink, blob_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &DiffOpts::default())?;
    let statuses: Vec<_> = deltas.iter().map(|d| d.status).collect();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.contains(&DeltaStatus::Deleted));
    assert!(statuses.contains(&DeltaStatus::Added));
    Ok(())
}

#[test]
fn reverse_flag_swaps_added_and_deleted() -> BitResult<()> {
    let odb = FakeOdb::new();
    let a_oid = odb.blob(b"hello");
    let old_root = odb.tree(&[]);
    let new_root = odb.tree(&[("a.txt", FileMode::Regular, a_oid)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let opts = DiffOpts { flags: DiffFlags::REVERSE, ..Default::default() };
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &opts)?;
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas.iter().next().unwrap().status, DeltaStatus::Deleted);
    Ok(())
}

#[test]
fn unchanged_subtree_is_skipped_via_oid_fast_path() -> BitResult<()> {
    let odb = FakeOdb::new();
    let shared_blob = odb.blob(b"unchanged");
    let shared_dir = odb.tree(&[("x", FileMode::Regular, shared_blob)]);
    let changed_old = odb.blob(b"old top file");
    let changed_new = odb.blob(b"new top file");
    let old_root = odb.tree(&[("dir", FileMode::Tree, shared_dir), ("top", FileMode::Regular, changed_old)]);
    let new_root = odb.tree(&[("dir", FileMode::Tree, shared_dir), ("top", FileMode::Regular, changed_new)]);

    let config = MapConfig::new();
    let (refs, subs) = (NullRefs, NullSubmodules);
    let collab = collab(&odb, &refs, &config, &subs);
    let resolver = null_resolver(&config);

    let mut old = tree_iter(&odb, old_root)?;
    let mut new = tree_iter(&odb, new_root)?;
    let opts = DiffOpts { flags: DiffFlags::SKIP_BINARY_CHECK, ..Default::default() };
    let deltas = diff(collab, &resolver, None, &mut old, &mut new, &opts)?;
    // only `top` changed; `dir` never gets expanded because its oid matched.
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas.iter().next().unwrap().path(), crate::path::BitPath::intern("top"));
    Ok(())
}

use super::*;
use crate::model::Stage;
use tempfile::tempdir;

fn entry(path: &str, oid: u8) -> IndexEntry {
    let file = FileEntry::new(BitPath::intern(path), FileMode::Regular, Oid::new([oid; 20]));
    IndexEntry::new(file, Stage::Merged)
}

#[test]
fn merged_entry_evicts_conflict_stages() {
    let mut index = Index::new();
    let path = BitPath::intern("f");
    index.add_entry(IndexEntry::new(
        FileEntry::new(path, FileMode::Regular, Oid::new([1; 20])),
        Stage::Base,
    ));
    index.add_entry(IndexEntry::new(
        FileEntry::new(path, FileMode::Regular, Oid::new([2; 20])),
        Stage::Ours,
    ));
    assert!(index.has_conflicts());

    index.add_entry(entry("f", 3));
    assert!(!index.has_conflicts());
    assert!(index.find(path, Stage::Base).is_none());
    assert!(index.find(path, Stage::Ours).is_none());
    assert_eq!(index.find(path, Stage::Merged).unwrap().file.oid, Oid::new([3; 20]));
}

#[test]
fn conflict_stage_evicts_merged_entry() {
    let mut index = Index::new();
    let path = BitPath::intern("f");
    index.add_entry(entry("f", 1));
    index.add_entry(IndexEntry::new(
        FileEntry::new(path, FileMode::Regular, Oid::new([2; 20])),
        Stage::Ours,
    ));
    assert!(index.find(path, Stage::Merged).is_none());
    assert!(index.find(path, Stage::Ours).is_some());
}

#[test]
fn remove_prefixed_drops_directory_contents() {
    let mut index = Index::new();
    index.add_entry(entry("dir/a", 1));
    index.add_entry(entry("dir/b", 2));
    index.add_entry(entry("dir-sibling", 3));
    index.remove_prefixed(BitPath::intern("dir"));
    assert_eq!(index.len(), 1);
    assert!(index.find(BitPath::intern("dir-sibling"), Stage::Merged).is_some());
}

#[test]
fn flush_then_load_round_trips() -> BitResult<()> {
    let dir = tempdir()?;
    let path = dir.path().join("index");

    let mut index = Index::new();
    index.add_entry(entry("a", 1));
    index.add_entry(entry("b/c", 2));
    index.flush(&path)?;

    let loaded = Index::load(&path)?;
    assert_eq!(loaded.len(), 2);
    assert_eq!(
        loaded.find(BitPath::intern("b/c"), Stage::Merged).unwrap().file.oid,
        Oid::new([2; 20])
    );
    Ok(())
}

#[test]
fn load_missing_file_is_empty() -> BitResult<()> {
    let dir = tempdir()?;
    let index = Index::load(dir.path().join("nonexistent"))?;
    assert!(index.is_empty());
    Ok(())
}

use super::*;
use crate::attr::Resolver;
use crate::collab::MapConfig;
use std::fs;
use tempfile::tempdir;

fn collect(mut iter: WorktreeIter<'_>) -> BitResult<Vec<(BitPath, bool, bool)>> {
    let mut out = Vec::new();
    while let Some(entry) = iter.current()? {
        out.push((entry.path(), entry.ignored, entry.submodule));
        iter.advance()?;
    }
    Ok(out)
}

#[test]
fn walks_files_and_directories_in_order() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join("a.txt"), "a")?;
    fs::create_dir(root.join("sub"))?;
    fs::write(root.join("sub/b.txt"), "b")?;
    fs::write(root.join("z.txt"), "z")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let iter = WorktreeIter::new(root, &resolver, IterOpts::default())?;
    let entries = collect(iter)?;
    let paths: Vec<_> = entries.iter().map(|(p, ..)| *p).collect();

    assert_eq!(
        paths,
        vec![BitPath::intern("a.txt"), BitPath::intern("sub/b.txt"), BitPath::intern("z.txt")]
    );
    Ok(())
}

#[test]
fn git_directory_is_never_yielded() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n")?;
    fs::write(root.join("a.txt"), "a")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let iter = WorktreeIter::new(root, &resolver, IterOpts::default())?;
    let entries = collect(iter)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, BitPath::intern("a.txt"));
    Ok(())
}

#[test]
fn ignored_file_is_surfaced_with_ignored_flag() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join(".gitignore"), "*.log\n")?;
    fs::write(root.join("keep.txt"), "keep")?;
    fs::write(root.join("drop.log"), "drop")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let iter = WorktreeIter::new(root, &resolver, IterOpts::default())?;
    let entries = collect(iter)?;

    let ignored: Vec<_> = entries.iter().filter(|(_, ignored, _)| *ignored).map(|(p, ..)| *p).collect();
    assert_eq!(ignored, vec![BitPath::intern("drop.log")]);
    let not_ignored: Vec<_> = entries.iter().filter(|(_, ignored, _)| !*ignored).map(|(p, ..)| *p).collect();
    assert_eq!(not_ignored, vec![BitPath::intern("keep.txt")]);
    Ok(())
}

#[test]
fn ignored_directory_is_reported_once_without_descending() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::write(root.join(".gitignore"), "build/\n")?;
    fs::create_dir(root.join("build"))?;
    fs::write(root.join("build/output.bin"), "bin")?;
    fs::write(root.join("src.rs"), "fn main() {}")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let iter = WorktreeIter::new(root, &resolver, IterOpts::default())?;
    let entries = collect(iter)?;

    assert_eq!(
        entries,
        vec![
            (BitPath::intern("build"), true, false),
            (BitPath::intern("src.rs"), false, false),
        ]
    );
    Ok(())
}

#[test]
fn nested_git_directory_is_reported_as_submodule() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::create_dir(root.join("vendor"))?;
    fs::create_dir(root.join("vendor/.git"))?;
    fs::write(root.join("vendor/lib.rs"), "// vendored")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let iter = WorktreeIter::new(root, &resolver, IterOpts::default())?;
    let entries = collect(iter)?;

    assert_eq!(entries, vec![(BitPath::intern("vendor"), false, true)]);
    Ok(())
}

#[test]
fn advance_over_skips_directory_subtree() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir(root.join(".git"))?;
    fs::create_dir(root.join("sub"))?;
    fs::write(root.join("sub/a.txt"), "a")?;
    fs::write(root.join("sub/b.txt"), "b")?;
    fs::write(root.join("z.txt"), "z")?;

    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let opts = IterOpts { include_trees: true, ..Default::default() };
    let mut iter = WorktreeIter::new(root, &resolver, opts)?;

    let (entry, status) = iter.advance_over()?;
    assert_eq!(entry.unwrap().path(), BitPath::intern("sub"));
    assert_eq!(status, OverStatus::Normal);

    let next = iter.current()?.unwrap();
    assert_eq!(next.path(), BitPath::intern("z.txt"));
    Ok(())
}

use super::*;
use crate::attr::Resolver;
use crate::collab::MapConfig;
use std::fs;
use tempfile::tempdir;

#[test]
fn crlf_round_trips_through_to_worktree_and_to_odb() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "*.txt text\n")?;
    let config = MapConfig::new().set("core.eol", "crlf");
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("a.txt");

    let blob = b"hello\nworld\n";
    let to_wd = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?;
    let worktree_bytes = to_wd.apply(blob)?;
    assert_eq!(worktree_bytes, b"hello\r\nworld\r\n");

    let to_odb = FilterList::load(&resolver, &config, path, false, Direction::ToOdb)?;
    let odb_bytes = to_odb.apply(&worktree_bytes)?;
    assert_eq!(odb_bytes, blob);
    Ok(())
}

#[test]
fn crlf_skipped_when_text_is_false() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "*.bin -text\n")?;
    let config = MapConfig::new().set("core.eol", "crlf");
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("a.bin");

    let blob = b"hello\nworld\n";
    let to_wd = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?;
    assert_eq!(to_wd.apply(blob)?, blob);
    Ok(())
}

#[test]
fn crlf_skipped_on_binary_looking_content() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "*.txt text\n")?;
    let config = MapConfig::new().set("core.eol", "crlf");
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("a.txt");

    let blob = b"hello\n\0world\n";
    let to_wd = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?;
    assert_eq!(to_wd.apply(blob)?, blob);
    Ok(())
}

#[test]
fn identity_filter_expands_and_strips() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "*.rs ident\n")?;
    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("a.rs");

    let blob = b"// $Id$\nfn main() {}\n".to_vec();
    let to_wd = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?
        .with_oid_hex("deadbeef");
    let expanded = to_wd.apply(&blob)?;
    assert_eq!(expanded, b"// $Id: deadbeef$\nfn main() {}\n");

    let to_odb = FilterList::load(&resolver, &config, path, false, Direction::ToOdb)?;
    let stripped = to_odb.apply(&expanded)?;
    assert_eq!(stripped, blob);
    Ok(())
}

#[test]
fn identity_filter_not_selected_without_attribute() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("a.rs");

    let list = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?;
    assert!(!list.defs.iter().any(|d| d.name == "ident"));
    Ok(())
}

#[test]
fn identity_round_trip_is_bytewise_for_any_input() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    let config = MapConfig::new();
    let resolver = Resolver::new(root, root.join(".git/info"), &config);
    let path = BitPath::intern("plain.rs");

    for blob in [&b""[..], b"no markers here", b"binary\0stuff"] {
        let to_wd = FilterList::load(&resolver, &config, path, false, Direction::ToWorktree)?;
        assert_eq!(to_wd.apply(blob)?, blob);
    }
    Ok(())
}

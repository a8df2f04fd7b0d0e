use super::*;
use crate::collab::MapConfig;
use crate::path::BitPath;
use std::fs;
use tempfile::tempdir;

fn resolver(config: &MapConfig, workdir: &Path) -> Resolver<'_> {
    Resolver::new(workdir, workdir.join(".git/info"), config)
}

#[test]
fn ignore_with_negation() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("sub"))?;
    fs::write(root.join(".gitignore"), "*\n!keep.txt\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);

    assert!(r.is_ignored(BitPath::intern("a.log"), false)?);
    assert!(!r.is_ignored(BitPath::intern("keep.txt"), false)?);
    assert!(r.is_ignored(BitPath::intern("sub/b.log"), false)?);
    // `sub` itself matches the unanchored `*` (a basename match against every
    // path component), so it is ignored; the negation's parent-directory
    // guard then means `!keep.txt` cannot re-include anything under it
    // (§4.A "negation re-includes... only if its parent directory is not
    // itself ignored"), unlike the top-level `keep.txt` above.
    assert!(r.is_ignored(BitPath::intern("sub/keep.txt"), false)?);
    Ok(())
}

#[test]
fn negation_does_not_reinclude_under_ignored_directory() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("build"))?;
    fs::write(root.join(".gitignore"), "build/\n!build/keep.txt\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);

    // the parent directory `build/` is ignored, so the negation of the file
    // inside it does not re-include it (§4.A).
    assert!(r.is_ignored(BitPath::intern("build/keep.txt"), false)?);
    Ok(())
}

#[test]
fn attribute_true_false_and_value() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "*.txt text\n*.bin -text binary\n*.sh run=bash\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);

    assert_eq!(r.attr_one(BitPath::intern("a.txt"), false, "text")?, Some(AttrValue::True));
    assert_eq!(r.attr_one(BitPath::intern("a.bin"), false, "text")?, Some(AttrValue::False));
    assert_eq!(r.attr_one(BitPath::intern("a.bin"), false, "binary")?, Some(AttrValue::True));
    assert_eq!(
        r.attr_one(BitPath::intern("run.sh"), false, "run")?,
        Some(AttrValue::Value("bash".to_owned()))
    );
    assert_eq!(r.attr_one(BitPath::intern("a.txt"), false, "nonexistent")?, None);
    Ok(())
}

#[test]
fn nested_directory_file_takes_precedence() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("sub"))?;
    fs::write(root.join(".gitattributes"), "*.txt text\n")?;
    fs::write(root.join("sub/.gitattributes"), "*.txt -text\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);

    assert_eq!(r.attr_one(BitPath::intern("top.txt"), false, "text")?, Some(AttrValue::True));
    assert_eq!(r.attr_one(BitPath::intern("sub/nested.txt"), false, "text")?, Some(AttrValue::False));
    Ok(())
}

#[test]
fn malformed_pattern_is_skipped_not_fatal() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitattributes"), "[unterminated text\n*.txt text\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);

    assert_eq!(r.attr_one(BitPath::intern("a.txt"), false, "text")?, Some(AttrValue::True));
    Ok(())
}

#[test]
fn fake_rule_applies_without_touching_disk() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();

    let config = MapConfig::new();
    let r = resolver(&config, root);
    r.add_fake_ignore_pattern(".git")?;

    assert!(r.is_ignored(BitPath::intern(".git"), true)?);
    Ok(())
}

#[test]
fn flush_reparses_after_on_disk_change() -> BitResult<()> {
    let dir = tempdir()?;
    let root = dir.path();
    fs::write(root.join(".gitignore"), "a.log\n")?;

    let config = MapConfig::new();
    let r = resolver(&config, root);
    assert!(r.is_ignored(BitPath::intern("a.log"), false)?);
    assert!(!r.is_ignored(BitPath::intern("b.log"), false)?);

    fs::write(root.join(".gitignore"), "b.log\n")?;
    r.flush();
    assert!(r.is_ignored(BitPath::intern("b.log"), false)?);
    Ok(())
}

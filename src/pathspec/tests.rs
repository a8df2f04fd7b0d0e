use super::*;

#[test]
fn match_all_admits_every_path() -> BitResult<()> {
    let spec = Pathspec::match_all();
    assert!(spec.matches(BitPath::intern("a/b/c"), false));
    assert!(spec.matches(BitPath::intern("a"), true));
    Ok(())
}

#[test]
fn literal_pattern_matches_exact_and_descendants() -> BitResult<()> {
    let spec = Pathspec::single("src/lib.rs", true)?;
    assert!(spec.matches(BitPath::intern("src/lib.rs"), false));
    assert!(!spec.matches(BitPath::intern("src/lib.rsx"), false));

    let dir_spec = Pathspec::single("src", true)?;
    assert!(dir_spec.matches(BitPath::intern("src/lib.rs"), false));
    assert!(!dir_spec.matches(BitPath::intern("srcfoo"), false));
    Ok(())
}

#[test]
fn glob_pattern_matches_by_extension() -> BitResult<()> {
    let spec = Pathspec::single("*.rs", false)?;
    assert!(spec.matches(BitPath::intern("lib.rs"), false));
    assert!(!spec.matches(BitPath::intern("lib.toml"), false));
    Ok(())
}

#[test]
fn bare_directory_pathspec_without_trailing_slash_matches_contents() -> BitResult<()> {
    let spec = Pathspec::single("src", false)?;
    assert!(spec.matches(BitPath::intern("src/lib.rs"), false));
    assert!(spec.matches(BitPath::intern("src"), true));
    Ok(())
}

#[test]
fn trailing_slash_pathspec_is_directory_only() -> BitResult<()> {
    let spec = Pathspec::single("src/", false)?;
    assert!(spec.matches(BitPath::intern("src/lib.rs"), false));
    assert!(!spec.matches(BitPath::intern("src"), false));
    Ok(())
}

#[test]
fn tree_descent_is_admitted_when_pattern_lies_below() -> BitResult<()> {
    let spec = Pathspec::single("src/iter/tree_iter.rs", false)?;
    assert!(spec.matches(BitPath::intern("src"), true));
    assert!(spec.matches(BitPath::intern("src/iter"), true));
    assert!(!spec.matches(BitPath::intern("tests"), true));
    Ok(())
}

#[test]
fn multiple_patterns_match_if_any_matches() -> BitResult<()> {
    let spec = Pathspec::parse("*.rs *.toml", false)?;
    assert!(spec.matches(BitPath::intern("lib.rs"), false));
    assert!(spec.matches(BitPath::intern("Cargo.toml"), false));
    assert!(!spec.matches(BitPath::intern("README.md"), false));
    Ok(())
}

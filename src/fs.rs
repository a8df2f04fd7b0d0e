//! small filesystem helpers shared by the checkout executor (§4.F) and the
//! workdir iterator (§4.C): generating a non-colliding path for a deferred
//! rename, and platform stat/permission glue.

use std::fmt::{self, Display, Formatter};
use std::io::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RenameIndex(Option<usize>);

impl RenameIndex {
    pub fn inc(&mut self) {
        match self.0 {
            Some(i) => self.0 = Some(i + 1),
            None => self.0 = Some(0),
        }
    }
}

impl Display for RenameIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(idx) = self.0 {
            write!(f, "_{}", idx)?;
        }
        Ok(())
    }
}

/// finds a path derived from `base_path` that does not currently exist, by
/// appending `_0`, `_1`, ... until `exists` reports false. Used by the
/// checkout executor when an untracked file would otherwise block a
/// directory removal it cannot silently discard (§4.F `defer_remove`).
pub struct UniquePath;

impl UniquePath {
    pub fn new(base_path: impl AsRef<Path>, mut exists: impl FnMut(&Path) -> bool) -> PathBuf {
        let base_path = base_path.as_ref();
        let mut i = RenameIndex::default();
        loop {
            let candidate = PathBuf::from(format!("{}{}", base_path.display(), i));
            if !exists(&candidate) {
                return candidate;
            }
            i.inc();
        }
    }
}

#[cfg(unix)]
pub(crate) fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

/// writes `content` to `path` by way of a sibling temp file: written, fsynced,
/// then renamed over the destination, so a reader never observes a
/// partially-written blob (§4.F "Atomicity"). `mode` additionally sets unix
/// permission bits (e.g. the executable bits) before the rename.
pub(crate) fn atomic_write(path: &Path, content: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let stem = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp_path = UniquePath::new(dir.join(format!(".{}.tmp", stem)), |p| p.exists());

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(content)?;
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    }
    file.sync_all()?;
    drop(file);

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_path_skips_existing_candidates() {
        let taken = ["old", "old_0", "old_1"];
        let path = UniquePath::new("old", |p| taken.contains(&p.to_str().unwrap()));
        assert_eq!(path, PathBuf::from("old_2"));
    }

    #[test]
    fn unique_path_returns_base_when_free() {
        let path = UniquePath::new("fresh", |_| false);
        assert_eq!(path, PathBuf::from("fresh"));
    }
}

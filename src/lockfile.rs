//! write-temp-then-rename lockfile (§5 "a file-level lockfile ... guards the
//! final flush"), used by the index's explicit write and by any other
//! component that needs to publish a file atomically.

use crate::error::BitResult;
use anyhow::Context;
use std::cell::Cell;
use std::fs::File;
use std::io::{self, prelude::*};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

const LOCK_FILE_EXT: &str = "lock";

bitflags! {
    pub struct LockfileFlags: u8 {
        const SET_READONLY = 1;
    }
}

#[derive(Debug)]
pub struct Lockfile {
    // the file that this lockfile is guarding; `None` if it does not exist yet
    file: Option<File>,
    // the lockfile itself; all writes go here, never to `file`
    lockfile: File,
    flags: LockfileFlags,
    path: PathBuf,
    lockfile_path: PathBuf,
    committed: Cell<bool>,
    rolled_back: Cell<bool>,
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lockfile.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lockfile.flush()
    }
}

impl Lockfile {
    /// accepts the path to the file to be locked; creates a lockfile with
    /// extension `<path>.lock`. Consumers of this API should never have
    /// direct access to the lockfile; use the `with_*` entry points instead.
    fn open(path: impl AsRef<Path>, flags: LockfileFlags) -> BitResult<Self> {
        let path = path.as_ref();
        assert!(!path.exists() || path.is_file(), "cannot create lock on symlinks or directories");
        let lockfile_path = path.with_extension(LOCK_FILE_EXT);
        path.parent().map(std::fs::create_dir_all).transpose()?;
        let lockfile =
            File::options().create_new(true).write(true).open(&lockfile_path).or_else(|err| {
                match err.kind() {
                    io::ErrorKind::AlreadyExists => Err(err).with_context(|| {
                        format!(
                            "failed to lock file `{}` (`{}` already exists)",
                            path.display(),
                            lockfile_path.display()
                        )
                    }),
                    _ => Err(err)
                        .with_context(|| format!("failed to create file `{}`", path.display())),
                }
            })?;

        let file = path.exists().then(|| File::open(path)).transpose()?;

        Ok(Self {
            file,
            lockfile,
            flags,
            lockfile_path,
            path: path.to_path_buf(),
            committed: Cell::new(false),
            rolled_back: Cell::new(false),
        })
    }

    /// never have mutable access to `self.file`; writes always go to the lockfile.
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    pub fn with_readonly<R>(
        path: impl AsRef<Path>,
        flags: LockfileFlags,
        f: impl FnOnce(&Self) -> BitResult<R>,
    ) -> BitResult<R> {
        Self::open(path, flags)?.with_readonly_inner(f)
    }

    /// runs `f` under the lock without write access; never commits.
    fn with_readonly_inner<R>(&self, f: impl FnOnce(&Self) -> BitResult<R>) -> BitResult<R> {
        let r = f(self);
        self.rollback();
        r
    }

    pub fn with_mut<R>(
        path: impl AsRef<Path>,
        flags: LockfileFlags,
        f: impl FnOnce(&mut Self) -> BitResult<R>,
    ) -> BitResult<R> {
        Self::open(path, flags)?.with_mut_inner(f)
    }

    /// runs `f` with mutable access to the lockfile; commits on `Ok`, rolls
    /// back on `Err`.
    fn with_mut_inner<R>(mut self, f: impl FnOnce(&mut Self) -> BitResult<R>) -> BitResult<R> {
        match f(&mut self) {
            Ok(r) => {
                self.commit().with_context(|| {
                    anyhow!(
                        "failed to write lockfile to `{}`; the updated contents are stored in `{}`; please remove this file when done",
                        self.path.display(),
                        self.lockfile_path.display()
                    )
                })?;
                Ok(r)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    /// commits by renaming the lockfile onto the target path, replacing it if present.
    fn commit(&self) -> io::Result<()> {
        if self.rolled_back.get() {
            return Ok(());
        }
        let set_readonly = self.flags.contains(LockfileFlags::SET_READONLY);
        if set_readonly && self.path.exists() {
            let mut permissions = self.path.metadata()?.permissions();
            permissions.set_readonly(false);
            std::fs::set_permissions(&self.path, permissions)?;
        }

        std::fs::rename(&self.lockfile_path, &self.path)?;
        self.committed.set(true);

        if set_readonly {
            let mut permissions = self.path.metadata()?.permissions();
            permissions.set_readonly(true);
            std::fs::set_permissions(&self.path, permissions)?;
        }

        Ok(())
    }

    fn cleanup(&self) -> BitResult<()> {
        std::fs::remove_file(&self.lockfile_path).with_context(|| {
            format!("failed to remove lockfile `{}`", self.lockfile_path.display())
        })
    }

    pub fn rollback(&self) {
        // don't do anything until the drop impl
        self.rolled_back.set(true);
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        assert!(!self.rolled_back.get() || !self.committed.get());
        if self.rolled_back.get() || !self.committed.get() {
            self.cleanup().unwrap();
        }
    }
}

/// anything that can be loaded from and flushed to a lock-guarded file as raw
/// bytes. The index view (§4.C) implements this to get its explicit-write
/// semantics (§5) without this crate owning an on-disk wire format (§6 "Index
/// file: ... delegated to the index component").
pub trait FileData: Sized {
    fn load(r: &mut dyn Read) -> BitResult<Self>;
    fn save(&self, w: &mut dyn Write) -> BitResult<()>;
}

impl FileData for Vec<u8> {
    fn load(r: &mut dyn Read) -> BitResult<Self> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn save(&self, w: &mut dyn Write) -> BitResult<()> {
        w.write_all(self)?;
        Ok(())
    }
}

/// the default is `commit`; `rollback` must be explicit. `data` must not have
/// interior mutability, otherwise changes may be silently dropped.
pub struct Filelock<T: FileData> {
    data: T,
    lockfile: Lockfile,
    has_changes: bool,
    rolled_back: bool,
}

impl<T: FileData + Default> Filelock<T> {
    pub fn lock_with_flags(path: impl AsRef<Path>, flags: LockfileFlags) -> BitResult<Self> {
        let mut lockfile = Lockfile::open(path, flags)?;
        let data = match &mut lockfile.file {
            Some(file) => T::load(file)?,
            None => T::default(),
        };
        Ok(Filelock { lockfile, data, has_changes: false, rolled_back: false })
    }

    pub fn lock(path: impl AsRef<Path>) -> BitResult<Self> {
        Self::lock_with_flags(path, LockfileFlags::empty())
    }
}

impl<T: FileData> Filelock<T> {
    pub fn rollback(&mut self) {
        self.rolled_back = true;
        self.lockfile.rollback();
    }
}

impl<T: FileData> Drop for Filelock<T> {
    fn drop(&mut self) {
        if self.rolled_back || !self.has_changes {
            return;
        }
        self.data.save(&mut self.lockfile).expect("failed to write data (in Filelock)");
        self.lockfile.commit().expect("failed to commit lockfile (in Filelock)");
    }
}

impl<T: FileData> Deref for Filelock<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T: FileData> DerefMut for Filelock<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // conservatively assume any mutable access results in a change
        self.has_changes = true;
        &mut self.data
    }
}

#[cfg(test)]
mod tests;

//! core data model shared by every component: object identifiers, file modes,
//! and the file-entry/delta types that flow between iterators, the diff engine,
//! and the checkout planner (§3 of the design).

use crate::path::BitPath;
use crate::time::Timespec;
use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

/// width of the content hash used throughout this crate.
///
/// the corpus hashes with sha1; we keep the same width rather than invent a new
/// wire format, but nothing here assumes the hash function itself.
pub const OID_SIZE: usize = 20;

/// opaque fixed-width content hash (§3 "Object identifier").
///
/// equality is bytewise. the all-zero value is the "unknown" sentinel: workdir
/// entries whose content has not yet been hashed carry it until something
/// (usually the diff engine, via [`crate::collab::Odb::hash_reader`]) fills it in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; OID_SIZE]);

impl Oid {
    pub const UNKNOWN: Self = Self([0; OID_SIZE]);

    pub const fn new(bytes: [u8; OID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    pub fn as_bytes(&self) -> &[u8; OID_SIZE] {
        &self.0
    }
}

impl Default for Oid {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl Debug for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Oid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; OID_SIZE] =
            bytes.try_into().map_err(|v: Vec<u8>| anyhow!("oid has wrong length: {}", v.len()))?;
        Ok(Self(arr))
    }
}

impl From<[u8; OID_SIZE]> for Oid {
    fn from(bytes: [u8; OID_SIZE]) -> Self {
        Self(bytes)
    }
}

/// mode bits for a [`FileEntry`] (§3).
///
/// only the type of the mode matters to this crate (we never need the exact
/// unix permission bits beyond the executable flag), so this is a small closed
/// enum rather than a raw `u32` as git itself uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Gitlink,
    Tree,
}

impl FileMode {
    pub fn is_tree(self) -> bool {
        self == Self::Tree
    }

    pub fn is_blob(self) -> bool {
        matches!(self, Self::Regular | Self::Executable | Self::Symlink)
    }

    pub fn is_gitlink(self) -> bool {
        self == Self::Gitlink
    }

    pub fn is_symlink(self) -> bool {
        self == Self::Symlink
    }

    /// whether the two modes differ in "type" (file vs symlink vs tree vs gitlink),
    /// as distinct from differing only in the executable bit (§4.D typechange rule).
    pub fn is_typechange(self, other: Self) -> bool {
        self.type_bucket() != other.type_bucket()
    }

    fn type_bucket(self) -> u8 {
        match self {
            Self::Regular | Self::Executable => 0,
            Self::Symlink => 1,
            Self::Gitlink => 2,
            Self::Tree => 3,
        }
    }

    #[cfg(unix)]
    pub fn from_unix_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::PermissionsExt;
        if metadata.file_type().is_symlink() {
            Self::Symlink
        } else if metadata.file_type().is_dir() {
            Self::Tree
        } else if metadata.permissions().mode() & 0o111 != 0 {
            Self::Executable
        } else {
            Self::Regular
        }
    }
}

impl Display for FileMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Gitlink => "160000",
            Self::Tree => "040000",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for FileMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "100644" => Self::Regular,
            "100755" => Self::Executable,
            "120000" => Self::Symlink,
            "160000" => Self::Gitlink,
            "040000" => Self::Tree,
            _ => bail!("invalid file mode `{}`", s),
        })
    }
}

/// `(path, mode, oid, size, stat?)` (§3 "File entry").
///
/// the single representation shared by tree, index, and workdir views; iterators
/// for all three views yield this type (possibly with some fields zeroed, as
/// noted per-variant below).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    pub path: BitPath,
    pub mode: FileMode,
    pub oid: Oid,
    pub size: u64,
    pub stat: Option<Stat>,
}

impl FileEntry {
    pub fn new(path: BitPath, mode: FileMode, oid: Oid) -> Self {
        Self { path, mode, oid, size: 0, stat: None }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// comparator used to merge-join two entry streams: path first, then mode
    /// (§3 "a delta's old_file.path equals new_file.path unless renamed/copied").
    pub fn entry_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path).then_with(|| self.mode.cmp(&other.mode))
    }
}

/// cached stat data carried by index entries for the racy-git shortcut (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub ctime: Timespec,
    pub mtime: Timespec,
    pub dev: u64,
    pub ino: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
}

/// classification of one delta (§3 "Delta", §4.D `maybe_modified` decision table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaStatus {
    Unmodified,
    Added,
    Deleted,
    Modified,
    Renamed,
    Copied,
    Typechange,
    Untracked,
    Ignored,
    Unreadable,
    Conflicted,
}

bitflags! {
    /// cached per-delta facts (§4.D "Binary detection"; §3 "Delta").
    pub struct DeltaFlags: u8 {
        const BINARY        = 1 << 0;
        const NOT_BINARY    = 1 << 1;
        const VALID_OLD_OID = 1 << 2;
        const VALID_NEW_OID = 1 << 3;
        /// rename-finder bookkeeping (§4.E pipeline step 1): this entry's
        /// self-similarity fell below the break-rewrite threshold and it has
        /// been provisionally split into a delete/add pair for matching.
        const SPLIT_REWRITE = 1 << 4;
    }
}

/// one path-level change between two views (§3 "Delta").
///
/// `old_file`/`new_file` are the pre-/post-image entries; for `added` the
/// `old_file` is a zero-oid placeholder at the same path, and symmetrically
/// for `deleted`. A rename/copy is the one case where `old_file.path` and
/// `new_file.path` legitimately differ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delta {
    pub status: DeltaStatus,
    pub old_file: FileEntry,
    pub new_file: FileEntry,
    /// `0..=100` similarity score; only meaningful for `Renamed`/`Copied`
    /// (and, transiently, while the rename finder is scoring candidates).
    pub similarity: Option<u8>,
    pub flags: DeltaFlags,
}

impl Delta {
    pub fn new(status: DeltaStatus, old_file: FileEntry, new_file: FileEntry) -> Self {
        Self { status, old_file, new_file, similarity: None, flags: DeltaFlags::empty() }
    }

    /// the path a caller should report this delta under: the new path unless
    /// the entry was deleted outright, in which case only the old path exists.
    pub fn path(&self) -> BitPath {
        if self.status == DeltaStatus::Deleted { self.old_file.path } else { self.new_file.path }
    }

    /// swaps old/new and inverts the status (§8 property 3 "Diff symmetry under REVERSE").
    pub fn reversed(mut self) -> Self {
        std::mem::swap(&mut self.old_file, &mut self.new_file);
        self.status = match self.status {
            DeltaStatus::Added => DeltaStatus::Deleted,
            DeltaStatus::Deleted => DeltaStatus::Added,
            other => other,
        };
        self.flags = {
            let mut flags = self.flags;
            let old = flags.contains(DeltaFlags::VALID_OLD_OID);
            let new = flags.contains(DeltaFlags::VALID_NEW_OID);
            flags.set(DeltaFlags::VALID_OLD_OID, new);
            flags.set(DeltaFlags::VALID_NEW_OID, old);
            flags
        };
        self
    }
}

/// per-path slot in the index (§3, §GLOSSARY "Stage").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    Merged = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub fn is_conflict(self) -> bool {
        self != Self::Merged
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Merged
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

//! external collaborator traits (§6): the object database, ref/head store,
//! config backend, and submodule subsystem this crate treats as named
//! interfaces rather than implementations. §1 scopes ownership of these
//! concerns out of the crate; this module is the seam.

use crate::error::BitResult;
use crate::model::{FileMode, Oid};
use crate::path::BitPath;
use std::io::Read;

/// object type tag passed to [`Odb::hash`]/[`Odb::hash_reader`] and returned by
/// [`Odb::header`]. Only blob and tree matter to this crate; commit/tag exist
/// purely so a caller's `ObjType` can round-trip through us untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjType {
    Blob,
    Tree,
    Commit,
    Tag,
}

/// a single entry of a tree object, as handed back by [`Odb::read_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: BitPath,
    pub mode: FileMode,
    pub oid: Oid,
}

/// `read`/`hash`/`hash_reader`/`header` (§6). Decoding the tree object wire
/// format is not this crate's concern (§1 Non-goals), so `read_tree` is part
/// of the trait rather than something the iterator decodes itself — see
/// DESIGN.md for the open-question rationale.
pub trait Odb {
    fn read(&self, oid: Oid) -> BitResult<Vec<u8>>;
    fn read_tree(&self, oid: Oid) -> BitResult<Vec<TreeEntry>>;
    fn hash(&self, bytes: &[u8], kind: ObjType) -> BitResult<Oid>;
    fn hash_reader(
        &self,
        reader: &mut dyn Read,
        size: u64,
        kind: ObjType,
    ) -> BitResult<Oid>;
    fn header(&self, oid: Oid) -> BitResult<(ObjType, u64)>;
}

/// a resolved reference: either a direct oid or a symbolic name pointing
/// elsewhere. The bounded hop-limit cycle check (§9 "Cyclic graphs in refs")
/// lives on the implementer's side of this trait; we only consume the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct(Oid),
    Symbolic(String),
}

pub enum PeelTarget {
    Tree,
}

/// `lookup`/`peel` (§6). `EUNBORNBRANCH` (no commits yet) is represented as
/// `Ok(None)` from `peel_to_tree` — the core treats that baseline as the empty
/// tree rather than erroring.
pub trait RefStore {
    fn lookup(&self, name: &str) -> BitResult<Option<Reference>>;
    fn peel_to_tree(&self, reference: &Reference) -> BitResult<Option<Oid>>;
}

/// scalar config get by key with per-level overlay (§6). Only the keys listed
/// in §6 are ever queried by this crate.
pub trait Config {
    fn get_bool(&self, key: &str) -> BitResult<Option<bool>>;
    fn get_i64(&self, key: &str) -> BitResult<Option<i64>>;
    fn get_str(&self, key: &str) -> BitResult<Option<String>>;
    fn get_multi(&self, key: &str) -> BitResult<Vec<String>>;
}

/// submodule ignore policy (`submodule.<name>.ignore`), consulted by the diff
/// engine's `maybe_modified` (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmoduleIgnore {
    None,
    Untracked,
    Dirty,
    All,
}

bitflags! {
    /// `status()` result bits for a submodule (§6).
    pub struct SubmoduleStatus: u32 {
        const WD_UNINITIALIZED = 1 << 0;
        const WD_MODIFIED      = 1 << 1;
        const WD_UNTRACKED     = 1 << 2;
        const WD_NEW_COMMITS   = 1 << 3;
    }
}

/// opaque submodule handle returned by [`SubmoduleStore::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubmoduleHandle(pub u32);

/// `lookup`/`status`/`wd_id`/`ignore` (§6). The checkout planner only
/// delegates to this trait for the pass-3 submodule update action; it never
/// inspects a submodule's own tree.
pub trait SubmoduleStore {
    fn lookup(&self, path: BitPath) -> BitResult<Option<SubmoduleHandle>>;
    fn status(&self, sm: SubmoduleHandle) -> BitResult<SubmoduleStatus>;
    fn wd_id(&self, sm: SubmoduleHandle) -> BitResult<Oid>;
    fn ignore(&self, sm: SubmoduleHandle) -> BitResult<SubmoduleIgnore>;
}

/// an in-memory `Config` test double: flat `key -> value` strings, with
/// `get_bool`/`get_i64` parsing on top and `get_multi` splitting on `\n`.
/// Generalizes the teacher's scope-overlay (`get!`/`get_opt!`) pattern down to
/// one flattened level, since tests only need to assert on the final
/// resolved value, not the system/global/repo/local layering itself.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MapConfig(std::collections::HashMap<String, String>);

#[cfg(test)]
impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
impl Config for MapConfig {
    fn get_bool(&self, key: &str) -> BitResult<Option<bool>> {
        self.0.get(key).map(|v| v.parse::<bool>()).transpose().map_err(Into::into)
    }

    fn get_i64(&self, key: &str) -> BitResult<Option<i64>> {
        self.0.get(key).map(|v| v.parse::<i64>()).transpose().map_err(Into::into)
    }

    fn get_str(&self, key: &str) -> BitResult<Option<String>> {
        Ok(self.0.get(key).cloned())
    }

    fn get_multi(&self, key: &str) -> BitResult<Vec<String>> {
        Ok(self.0.get(key).map(|v| v.split('\n').map(str::to_owned).collect()).unwrap_or_default())
    }
}

/// bundle of borrowed collaborator references threaded through the resolver,
/// filter pipeline, diff engine, and checkout planner. Each component borrows
/// only the supertrait bounds it needs, so a test can wire up, say, only
/// `Config` and still exercise the attribute resolver alone.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub odb: &'a dyn Odb,
    pub refs: &'a dyn RefStore,
    pub config: &'a dyn Config,
    pub submodules: &'a dyn SubmoduleStore,
}

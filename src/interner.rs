use crate::path::BitPath;
use bumpalo::Bump as Arena;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::collections::hash_map::RawEntryMut;
use std::ffi::OsStr;
use std::hash::{Hash, Hasher};
use std::os::unix::ffi::OsStrExt;

fn fx_hash(key: impl Hash) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// this interner deals only with `OsStr` (instead of `Path`) to avoid normalization
/// issues. In particular, we want trailing slashes to be significant (`path.rs`
/// relies on it to make directories sort after files with the same prefix).
#[derive(Default)]
pub(crate) struct Interner {
    arena: Arena,
    map: FxHashMap<&'static OsStr, BitPath>,
    set: FxHashSet<&'static str>,
}

pub trait Intern {
    fn intern(&self) -> &'static Self;
}

impl Intern for str {
    fn intern(&self) -> &'static Self {
        with_path_interner(|interner| interner.intern_str(self))
    }
}

impl Interner {
    /// reuses an allocation rather than reinterning as a path where the caller
    /// only ever needs a `&'static str` (e.g. attribute values).
    pub fn intern_str(&mut self, s: &str) -> &'static str {
        if let Some(&x) = self.set.get(s) {
            return x;
        }

        let ptr: &str =
            unsafe { std::str::from_utf8_unchecked(self.arena.alloc_slice_copy(s.as_bytes())) };
        let static_str = unsafe { &*(ptr as *const str) };
        self.set.insert(static_str);
        static_str
    }

    pub fn intern_path(&mut self, path: impl AsRef<OsStr>) -> BitPath {
        let path = path.as_ref();
        let hash = fx_hash(path);
        match self.map.raw_entry_mut().from_key_hashed_nocheck(hash, path) {
            RawEntryMut::Occupied(entry) => *entry.get(),
            RawEntryMut::Vacant(entry) => {
                let ptr = self.arena.alloc_slice_copy(path.as_bytes());
                // SAFETY: the returned reference is only handed out as `'static`
                // because `self.arena` outlives the thread-local `INTERNER` it is
                // stored in, which outlives the program.
                let static_path = OsStr::from_bytes(unsafe { &*(ptr as *const [u8]) });
                let bitpath = BitPath::new(static_path);
                entry.insert_hashed_nocheck(hash, static_path, bitpath);
                bitpath
            }
        }
    }
}

thread_local! {
    static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

pub(crate) fn with_path_interner<R>(f: impl FnOnce(&mut Interner) -> R) -> R {
    INTERNER.with(|interner| f(&mut interner.borrow_mut()))
}

//! content-filter pipeline (§4.B): an ordered stack of byte transforms
//! between the worktree and object-database representations of a blob,
//! selected per-path by attribute lookup.
//!
//! Filters are plain data (`FilterDef`) registered into a process-wide table
//! behind a `lazy_static` + `parking_lot::RwLock` rather than trait objects
//! with virtual lifecycle methods (§9 "Deep inheritance of filters",
//! "Global state") — registration is rare, lookup is the hot path and only
//! needs a read lock.

use crate::attr::{AttrValue, Resolver};
use crate::collab::Config;
use crate::error::BitResult;
use crate::path::BitPath;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::io::Write;

/// which way content is flowing through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// worktree bytes -> object database bytes (what gets hashed and stored).
    ToOdb,
    /// object database bytes -> worktree bytes (what gets written to disk).
    ToWorktree,
}

/// a filter's verdict for one invocation (§4.B contract).
pub enum FilterOutcome {
    Applied(Vec<u8>),
    /// the filter declined; the buffer passes through unchanged.
    Skip,
}

/// one required attribute value a filter's selection spec checks for.
#[derive(Debug, Clone)]
pub struct AttrMatch {
    pub name: &'static str,
    pub required: RequiredValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredValue {
    True,
    False,
    Unset,
    Exact(&'static str),
    /// matches as long as the attribute is set to *something* other than unset/unspecified.
    AnySet,
}

impl RequiredValue {
    fn matches(&self, value: Option<&AttrValue>) -> bool {
        match (self, value) {
            (Self::True, Some(AttrValue::True)) => true,
            (Self::False, Some(AttrValue::False)) => true,
            (Self::Unset, Some(AttrValue::Unset)) | (Self::Unset, None) => true,
            (Self::Exact(expected), Some(AttrValue::Value(v))) => v == expected,
            (Self::AnySet, Some(v)) if *v != AttrValue::Unset => true,
            _ => false,
        }
    }
}

/// a filter definition: pure data, no virtual dispatch (§9). `priority` orders
/// the pipeline ascending for `to_odb`; traversed in reverse for `to_worktree`.
pub struct FilterDef {
    pub name: &'static str,
    pub priority: i32,
    pub attr_spec: &'static [AttrMatch],
    pub apply: fn(Direction, &[u8], &FilterContext) -> BitResult<FilterOutcome>,
}

/// per-invocation context a filter may consult; kept separate from `FilterDef`
/// so the def itself stays `'static` plain data.
pub struct FilterContext<'a> {
    pub path: BitPath,
    pub config: &'a dyn Config,
    /// the resolved `text` attribute, consulted by the CRLF filter instead of
    /// an `attr_spec` entry since `text=false` (binary) still selects the
    /// filter but disables conversion, which a pure selection match can't express.
    pub text: Option<AttrValue>,
    /// set by the identity filter's to_worktree pass when expanding `$Id$`.
    pub oid_hex: Option<String>,
}

lazy_static! {
    static ref REGISTRY: RwLock<Vec<&'static FilterDef>> = RwLock::new(Vec::new());
    static ref INSTALLED: std::sync::Once = std::sync::Once::new();
}

pub fn register_filter(def: &'static FilterDef) {
    let mut registry = REGISTRY.write();
    registry.push(def);
    registry.sort_by_key(|d| d.priority);
}

fn install_builtin_filters() {
    INSTALLED.call_once(|| {
        register_filter(&CRLF_FILTER);
        register_filter(&IDENT_FILTER);
    });
}

/// an ordered, already-selected list of filters ready to `apply` (§4.B
/// contract `load(repo, path, direction) -> ordered filter list`).
pub struct FilterList<'a> {
    direction: Direction,
    defs: Vec<&'static FilterDef>,
    ctx: FilterContext<'a>,
}

impl<'a> FilterList<'a> {
    /// picks every registered filter whose `attr_spec` fully matches `path`'s
    /// resolved attributes (§4.B "Selection"), in registration-priority order
    /// for `ToOdb` and reversed for `ToWorktree`.
    pub fn load(
        resolver: &Resolver<'_>,
        config: &'a dyn Config,
        path: BitPath,
        is_dir: bool,
        direction: Direction,
    ) -> BitResult<FilterList<'a>> {
        install_builtin_filters();
        let mut defs = Vec::new();
        for &def in REGISTRY.read().iter() {
            let mut matched = true;
            for spec in def.attr_spec {
                let value = resolver.attr_one(path, is_dir, spec.name)?;
                if !spec.required.matches(value.as_ref()) {
                    matched = false;
                    break;
                }
            }
            if matched {
                trace!("filter: `{}` selected for `{}`", def.name, path);
                defs.push(def);
            }
        }
        if direction == Direction::ToWorktree {
            defs.reverse();
        }
        let text = resolver.attr_one(path, is_dir, "text")?;
        Ok(FilterList { direction, defs, ctx: FilterContext { path, config, text, oid_hex: None } })
    }

    /// attaches the blob's known object id, used by the identity filter to
    /// expand `$Id$` on the `to_worktree` pass.
    pub fn with_oid_hex(mut self, oid_hex: impl Into<String>) -> Self {
        self.ctx.oid_hex = Some(oid_hex.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// single-call transform (§4.B contract `apply(list, src_bytes) -> dst_bytes`).
    /// on a filter error, the pipeline aborts and the destination buffer is
    /// dropped (conceptually truncated to empty — nothing partial is returned).
    pub fn apply(&self, src: &[u8]) -> BitResult<Vec<u8>> {
        let mut buf = src.to_vec();
        for def in &self.defs {
            match (def.apply)(self.direction, &buf, &self.ctx) {
                Ok(FilterOutcome::Applied(out)) => buf = out,
                Ok(FilterOutcome::Skip) => {}
                Err(err) => {
                    warn!("filter: `{}` failed on `{}`: {}", def.name, self.ctx.path, err);
                    return Err(err);
                }
            }
        }
        Ok(buf)
    }

    /// streaming variant: each filter receives the previous filter's output
    /// and writes into `sink`. Filters here simply buffer-then-forward since
    /// neither built-in filter needs incremental output; a filter that could
    /// stream would instead wrap `sink` and write as it consumes `src`.
    pub fn apply_stream(&self, src: &[u8], sink: &mut dyn Write) -> BitResult<()> {
        let out = self.apply(src)?;
        sink.write_all(&out)?;
        Ok(())
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8000).any(|&b| b == 0)
}

fn has_bare_cr_without_lf(bytes: &[u8]) -> bool {
    let mut iter = bytes.iter().enumerate();
    while let Some((i, &b)) = iter.next() {
        if b == b'\r' && bytes.get(i + 1) != Some(&b'\n') {
            return true;
        }
    }
    false
}

fn crlf_apply(direction: Direction, src: &[u8], ctx: &FilterContext<'_>) -> BitResult<FilterOutcome> {
    if ctx.text == Some(AttrValue::False) {
        return Ok(FilterOutcome::Skip);
    }
    let autocrlf_forces_text = ctx.config.get_bool("core.autocrlf")?.unwrap_or(false);
    if ctx.text.is_none() && !autocrlf_forces_text {
        return Ok(FilterOutcome::Skip);
    }
    if looks_binary(src) {
        debug!("filter: crlf skipping binary-looking content for `{}`", ctx.path);
        return Ok(FilterOutcome::Skip);
    }
    match direction {
        Direction::ToOdb => {
            if has_bare_cr_without_lf(src) {
                return Ok(FilterOutcome::Skip);
            }
            let mut out = Vec::with_capacity(src.len());
            let mut i = 0;
            while i < src.len() {
                if src[i] == b'\r' && src.get(i + 1) == Some(&b'\n') {
                    out.push(b'\n');
                    i += 2;
                } else {
                    out.push(src[i]);
                    i += 1;
                }
            }
            Ok(FilterOutcome::Applied(out))
        }
        Direction::ToWorktree => {
            let eol = ctx.config.get_str("core.eol")?.unwrap_or_else(|| "crlf".to_owned());
            if eol != "crlf" && eol != "native" {
                return Ok(FilterOutcome::Skip);
            }
            let mut out = Vec::with_capacity(src.len() + src.len() / 32);
            for &b in src {
                if b == b'\n' {
                    out.push(b'\r');
                }
                out.push(b);
            }
            Ok(FilterOutcome::Applied(out))
        }
    }
}

const CRLF_FILTER: FilterDef = FilterDef { name: "crlf", priority: 0, attr_spec: &[], apply: crlf_apply };

const IDENT_MARKER: &[u8] = b"$Id";

fn ident_apply(direction: Direction, src: &[u8], ctx: &FilterContext<'_>) -> BitResult<FilterOutcome> {
    match direction {
        // to_odb: strip any expanded `$Id: <hex>$` back down to a bare `$Id$`.
        Direction::ToOdb => {
            if !src.windows(IDENT_MARKER.len()).any(|w| w == IDENT_MARKER) {
                return Ok(FilterOutcome::Skip);
            }
            let mut out = Vec::with_capacity(src.len());
            let mut i = 0;
            while i < src.len() {
                if src[i..].starts_with(IDENT_MARKER) {
                    if let Some(end) = src[i..].iter().position(|&b| b == b'$').map(|p| i + p) {
                        if end > i {
                            out.extend_from_slice(b"$Id$");
                            i = end + 1;
                            continue;
                        }
                    }
                }
                out.push(src[i]);
                i += 1;
            }
            Ok(FilterOutcome::Applied(out))
        }
        // to_worktree: expand a bare `$Id$` to `$Id: <hex-oid>$`.
        Direction::ToWorktree => {
            let Some(oid_hex) = &ctx.oid_hex else { return Ok(FilterOutcome::Skip) };
            if !src.windows(4).any(|w| w == b"$Id$") {
                return Ok(FilterOutcome::Skip);
            }
            let expanded = format!("$Id: {}$", oid_hex);
            let mut out = Vec::with_capacity(src.len());
            let mut i = 0;
            while i < src.len() {
                if src[i..].starts_with(b"$Id$") {
                    out.extend_from_slice(expanded.as_bytes());
                    i += 4;
                } else {
                    out.push(src[i]);
                    i += 1;
                }
            }
            Ok(FilterOutcome::Applied(out))
        }
    }
}

const IDENT_FILTER: FilterDef = FilterDef {
    name: "ident",
    priority: 10,
    attr_spec: &[AttrMatch { name: "ident", required: RequiredValue::True }],
    apply: ident_apply,
};

#[cfg(test)]
mod tests;

//! pathspec filtering (§4.C "Pathspec filtering"): a glob-based predicate an
//! iterator consults on every entry, trees included, to decide both whether
//! to descend and whether to yield.
//!
//! Built on `globset` (as `attr.rs`'s `PatternMatcher` is), rather than the
//! teacher's own prefix-only pathspec: the teacher never finished this
//! component ("braindead implementation for now"), and this crate's iterator
//! already calls the richer `matches(path, is_dir)` shape described here.

use crate::error::BitResult;
use crate::path::BitPath;
use globset::{GlobBuilder, GlobMatcher};
use std::fmt::{self, Debug, Display, Formatter};

/// one compiled pathspec pattern.
#[derive(Clone)]
enum Kind {
    /// `DISABLE_PATHSPEC_MATCH` (§6): the raw string compared as a literal
    /// path prefix, no glob metacharacters interpreted.
    Literal(BitPath),
    Glob { matcher: GlobMatcher, directory_only: bool },
}

impl Debug for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Literal(p) => write!(f, "Literal({})", p),
            Kind::Glob { directory_only, .. } => write!(f, "Glob(directory_only={})", directory_only),
        }
    }
}

/// a single pathspec pattern plus its non-wildcard root, used to decide
/// whether a directory might contain a match without fully globbing every
/// ancestor (§4.C "Pathspec filtering").
#[derive(Debug, Clone)]
struct Pattern {
    raw: String,
    /// the fixed portion of the pattern up to the first wildcard or the last
    /// path separator, whichever comes first — every match lies under this.
    root: BitPath,
    kind: Kind,
}

fn is_wildcard(c: char) -> bool {
    c == '*' || c == '?' || c == '['
}

fn find_prefix_end(s: &str) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if is_wildcard(c) && (i == 0 || chars[i - 1] != '\\') {
            return Some(i);
        }
    }
    None
}

impl Pattern {
    fn compile(raw: &str, literal: bool) -> BitResult<Self> {
        let mut body = raw;
        let directory_only = body.len() > 1 && body.ends_with('/');
        if directory_only {
            body = &body[..body.len() - 1];
        }

        let prefix_end = find_prefix_end(body).unwrap_or(body.len());
        let root_str = match body[..prefix_end].rfind('/') {
            Some(slash) => &body[..slash],
            None if prefix_end == body.len() => body,
            None => "",
        };
        let root = BitPath::intern(root_str);

        let kind = if literal {
            Kind::Literal(BitPath::intern(body))
        } else {
            let matcher = GlobBuilder::new(body)
                .literal_separator(true)
                .build()
                .map_err(|e| anyhow!("malformed pathspec `{}`: {}", raw, e))?
                .compile_matcher();
            Kind::Glob { matcher, directory_only }
        };
        Ok(Self { raw: raw.to_owned(), root, kind })
    }

    /// true if `dir` (a tree entry) either lies under this pattern's root or
    /// contains it — i.e. a match could still occur somewhere below `dir`
    /// (§4.C: trees are never pruned early just because they don't match).
    fn admits_descent(&self, dir: BitPath) -> bool {
        let dir_s = dir.as_str();
        let root_s = self.root.as_str();
        if dir_s.is_empty() || root_s.is_empty() {
            return true;
        }
        dir_s == root_s
            || root_s.starts_with(&format!("{}/", dir_s))
            || dir_s.starts_with(&format!("{}/", root_s))
    }

    fn matches(&self, path: BitPath, is_dir: bool) -> bool {
        let s = path.as_str();
        match &self.kind {
            Kind::Literal(lit) => {
                let lit = lit.as_str();
                s == lit || s.starts_with(&format!("{}/", lit))
            }
            Kind::Glob { matcher, directory_only } => {
                if is_dir {
                    return self.admits_descent(path);
                }
                if *directory_only {
                    // only a leaf strictly under the directory counts.
                    return s.starts_with(&format!("{}/", self.root.as_str())) && matcher.is_match(&self.root.as_str());
                }
                matcher.is_match(s) || s.starts_with(&format!("{}/", self.raw.trim_end_matches('/')))
            }
        }
    }
}

/// a set of one or more patterns, any of which matching admits a path (§3
/// "Pathspec"). `Copy`, matching the teacher's calling convention for
/// plumbing a filter through iterator construction.
#[derive(Debug, Clone)]
pub struct Pathspec {
    patterns: Vec<Pattern>,
    /// `DISABLE_PATHSPEC_MATCH` (§6): bypasses glob interpretation entirely.
    literal: bool,
}

impl Pathspec {
    /// a pathspec that admits every path — the default when no `-- <paths>`
    /// filter was given.
    pub fn match_all() -> Self {
        Self { patterns: Vec::new(), literal: false }
    }

    pub fn is_match_all(&self) -> bool {
        self.patterns.is_empty()
    }

    /// parses one or more whitespace-separated pathspec patterns (§4.C).
    /// `literal` selects `DISABLE_PATHSPEC_MATCH` semantics for every pattern.
    pub fn parse(raw: &str, literal: bool) -> BitResult<Self> {
        let patterns =
            raw.split_whitespace().map(|p| Pattern::compile(p, literal)).collect::<BitResult<Vec<_>>>()?;
        Ok(Self { patterns, literal })
    }

    pub fn single(raw: &str, literal: bool) -> BitResult<Self> {
        Ok(Self { patterns: vec![Pattern::compile(raw, literal)?], literal })
    }

    /// §4.C contract: `true` if `path` (known to be, or not be, a directory)
    /// should be visited at all — either as a final yielded entry, or (when
    /// `is_dir`) as a subtree worth descending into looking for matches.
    pub fn matches(&self, path: BitPath, is_dir: bool) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(path, is_dir))
    }
}

impl Display for Pathspec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.patterns.is_empty() {
            return write!(f, ".");
        }
        let raws: Vec<&str> = self.patterns.iter().map(|p| p.raw.as_str()).collect();
        write!(f, "{}", raws.join(" "))
    }
}

#[cfg(test)]
mod tests;

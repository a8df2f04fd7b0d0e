//! per-path attribute and ignore resolution (§4.A).
//!
//! `.gitignore`-style files are parsed as attribute files whose only
//! attribute is the synthetic name `"ignore"`, assigned `true` by an
//! unqualified pattern line and `false` by a `!`-negated one (the expansion
//! note in §4.A): this lets ignore matching and attribute matching share one
//! `AttrFile` parser and one precedence stack instead of two code paths.

use crate::collab::Config;
use crate::error::BitResult;
use crate::path::BitPath;
use crate::time::Timespec;
use anyhow::Context;
use globset::{GlobBuilder, GlobMatcher};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// the synthetic attribute name under which ignore rules assign their verdict.
const IGNORE_ATTR: &str = "ignore";

/// one rule's assigned value (§3 "Attribute rule... Value is one of
/// {true, false, unset, explicit-string}"). The source's pointer-equal
/// `TRUE`/`FALSE`/`UNSET` sentinels are represented as enum variants here;
/// "unspecified" (the source's `NULL`) is `None` at the call site rather than
/// a fourth variant, since nothing downstream needs to distinguish "no rule
/// matched" from a fourth *value* of a rule that did match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    True,
    False,
    Unset,
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Ignore,
    Attribute,
}

#[derive(Debug, Clone)]
struct AttrRule {
    matcher: PatternMatcher,
    assignments: Vec<(String, AttrValue)>,
}

impl AttrRule {
    fn matching_assignment<'a>(&'a self, name: &str, is_dir: bool, rel_path: &str) -> Option<&'a AttrValue> {
        if !self.matcher.matches(rel_path, is_dir) {
            return None;
        }
        self.assignments.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
struct PatternMatcher {
    raw: String,
    directory_only: bool,
    /// `Some(matcher)` anchors the pattern to the file containing the rule
    /// (a non-trailing `/` in the pattern); `None` means a basename match.
    anchored: Option<GlobMatcher>,
    basename: Option<GlobMatcher>,
}

impl PatternMatcher {
    fn parse(pattern: &str) -> BitResult<Self> {
        let mut body = pattern;
        let directory_only = body.len() > 1 && body.ends_with('/');
        if directory_only {
            body = &body[..body.len() - 1];
        }
        // an internal (non-trailing) `/` anchors the pattern to the directory
        // containing the rule file; otherwise it matches against the basename
        // of every path component (§4.A "Rule syntax and precedence").
        let anchored_pattern = body.strip_prefix('/').unwrap_or(body);
        let has_internal_slash = anchored_pattern.contains('/');

        let compile = |body: &str| -> BitResult<GlobMatcher> {
            GlobBuilder::new(body)
                .literal_separator(true)
                .build()
                .map(|g| g.compile_matcher())
                .map_err(|e| anyhow!("malformed pattern `{}`: {}", pattern, e))
        };

        let (anchored, basename) = if has_internal_slash {
            (Some(compile(anchored_pattern)?), None)
        } else {
            (None, Some(compile(anchored_pattern)?))
        };

        Ok(Self { raw: pattern.to_owned(), directory_only, anchored, basename })
    }

    /// `rel_path` is relative to the directory containing the rule file.
    fn matches(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.directory_only && !is_dir {
            return false;
        }
        if let Some(matcher) = &self.anchored {
            return matcher.is_match(rel_path);
        }
        let basename = Path::new(rel_path).file_name().and_then(|s| s.to_str()).unwrap_or(rel_path);
        self.basename.as_ref().map_or(false, |m| m.is_match(basename))
    }
}

#[derive(Debug, Default, Clone)]
struct AttrFile {
    rules: Vec<AttrRule>,
}

impl AttrFile {
    fn parse(contents: &str, kind: FileKind) -> Self {
        let mut rules = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match Self::parse_line(line, kind) {
                Ok(rule) => rules.push(rule),
                Err(err) => warn!("attr: skipping malformed rule at line {}: {}", lineno + 1, err),
            }
        }
        Self { rules }
    }

    fn parse_line(line: &str, kind: FileKind) -> BitResult<AttrRule> {
        match kind {
            FileKind::Ignore => {
                // `\!`/`\#` escape a leading special character; anything else
                // stays literal since we don't otherwise interpret backslashes.
                let (pattern, value) = if let Some(rest) = line.strip_prefix('!') {
                    (rest, AttrValue::False)
                } else if let Some(rest) = line.strip_prefix("\\!").or_else(|| line.strip_prefix("\\#")) {
                    (rest, AttrValue::True)
                } else {
                    (line, AttrValue::True)
                };
                let matcher = PatternMatcher::parse(pattern)?;
                Ok(AttrRule { matcher, assignments: vec![(IGNORE_ATTR.to_owned(), value)] })
            }
            FileKind::Attribute => {
                let mut parts = line.split_whitespace();
                let pattern = parts.next().ok_or_else(|| anyhow!("empty attribute line"))?;
                let matcher = PatternMatcher::parse(pattern)?;
                let assignments = parts.map(Self::parse_assignment).collect();
                Ok(AttrRule { matcher, assignments })
            }
        }
    }

    fn parse_assignment(token: &str) -> (String, AttrValue) {
        if let Some(name) = token.strip_prefix('-') {
            (name.to_owned(), AttrValue::False)
        } else if let Some(name) = token.strip_prefix('!') {
            (name.to_owned(), AttrValue::Unset)
        } else if let Some((name, value)) = token.split_once('=') {
            (name.to_owned(), AttrValue::Value(value.to_owned()))
        } else {
            (token.to_owned(), AttrValue::True)
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    mtime: Timespec,
    size: u64,
    file: AttrFile,
}

/// answers "which attributes apply to path P?" with the precedence from
/// §4.A: per-directory files (closest first) > per-repository info file >
/// user-global file > system-global file, plus runtime-injected fake rules
/// ranked above all of them.
pub struct Resolver<'c> {
    workdir: PathBuf,
    info_dir: PathBuf,
    config: &'c dyn Config,
    cache: RwLock<FxHashMap<PathBuf, CacheEntry>>,
    fake_ignore_rules: RwLock<Vec<AttrRule>>,
}

const SYSTEM_GITATTRIBUTES: &str = "/etc/gitattributes";
const SYSTEM_GITIGNORE: &str = "/etc/gitignore";

impl<'c> Resolver<'c> {
    pub fn new(workdir: impl Into<PathBuf>, info_dir: impl Into<PathBuf>, config: &'c dyn Config) -> Self {
        Self {
            workdir: workdir.into(),
            info_dir: info_dir.into(),
            config,
            cache: RwLock::new(FxHashMap::default()),
            fake_ignore_rules: RwLock::new(Vec::new()),
        }
    }

    /// prepends a rule that never touches disk (§4.A "Internal/'fake' rules
    /// may be prepended at runtime"), e.g. to force-ignore the repository's
    /// own metadata directory.
    pub fn add_fake_ignore_pattern(&self, pattern: &str) -> BitResult<()> {
        let rule = AttrFile::parse_line(pattern, FileKind::Ignore)?;
        self.fake_ignore_rules.write().push(rule);
        Ok(())
    }

    /// drops every cached parsed file; the next query re-reads from disk.
    pub fn flush(&self) {
        self.cache.write().clear();
    }

    fn load(&self, path: &Path, kind: FileKind) -> BitResult<()> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("failed to stat `{}`", path.display())),
        };
        let mtime = Timespec::mtime(&metadata);
        let size = metadata.len();

        if let Some(entry) = self.cache.read().get(path) {
            if entry.mtime == mtime && entry.size == size {
                return Ok(());
            }
        }

        debug!("attr: (re)parsing `{}`", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        let file = AttrFile::parse(&contents, kind);
        self.cache.write().insert(path.to_path_buf(), CacheEntry { mtime, size, file });
        Ok(())
    }

    fn per_directory_filename(kind: FileKind) -> &'static str {
        match kind {
            FileKind::Ignore => ".gitignore",
            FileKind::Attribute => ".gitattributes",
        }
    }

    fn user_global_path(&self, kind: FileKind) -> BitResult<Option<PathBuf>> {
        let key = match kind {
            FileKind::Ignore => "core.excludesfile",
            FileKind::Attribute => "core.attributesfile",
        };
        Ok(self.config.get_str(key)?.map(PathBuf::from))
    }

    fn system_path(kind: FileKind) -> PathBuf {
        PathBuf::from(match kind {
            FileKind::Ignore => SYSTEM_GITIGNORE,
            FileKind::Attribute => SYSTEM_GITATTRIBUTES,
        })
    }

    /// builds the rule stack for `dir` (a directory, relative to the workdir
    /// root) in decreasing precedence order, along with the directory each
    /// rule's pattern should be matched relative to.
    fn rule_files(&self, dir: BitPath, kind: FileKind) -> BitResult<Vec<(PathBuf, PathBuf)>> {
        let mut files = Vec::new();
        let filename = Self::per_directory_filename(kind);

        let mut cur = Some(dir);
        loop {
            let (abs_dir, rel_dir) = match cur {
                Some(d) if !d.is_empty() => (self.workdir.join(d.as_path()), d.as_path().to_path_buf()),
                _ => (self.workdir.clone(), PathBuf::new()),
            };
            files.push((abs_dir.join(filename), rel_dir));
            match cur {
                Some(d) if !d.is_empty() => cur = d.parent(),
                _ => break,
            }
        }

        let info_name = match kind {
            FileKind::Ignore => "exclude",
            FileKind::Attribute => "attributes",
        };
        files.push((self.info_dir.join(info_name), PathBuf::new()));

        if let Some(global) = self.user_global_path(kind)? {
            files.push((global, PathBuf::new()));
        }
        files.push((Self::system_path(kind), PathBuf::new()));

        Ok(files)
    }

    /// returns the ordered (highest precedence first) list of rules, along
    /// with the path (relative to that rule's own directory) to match against.
    fn precedence_stack(&self, path: BitPath, kind: FileKind) -> BitResult<Vec<(AttrRule, String)>> {
        let dir = path.parent().unwrap_or_else(BitPath::empty);
        let mut stack = Vec::new();

        if kind == FileKind::Ignore {
            for rule in self.fake_ignore_rules.read().iter().rev() {
                stack.push((rule.clone(), path.as_str().to_owned()));
            }
        }

        for (file_path, rule_dir) in self.rule_files(dir, kind)? {
            self.load(&file_path, kind)?;
            let cache = self.cache.read();
            let Some(entry) = cache.get(&file_path) else { continue };
            let rel = if rule_dir.as_os_str().is_empty() {
                path.as_path().to_path_buf()
            } else {
                pathdiff::diff_paths(path.as_path(), &rule_dir)
                    .unwrap_or_else(|| path.as_path().to_path_buf())
            };
            let rel = rel.to_string_lossy().into_owned();
            // later rules within one file override earlier ones, so scan in
            // reverse to make the first-found match in precedence order
            // equivalent to the last-declared rule winning (§4.A).
            for rule in entry.file.rules.iter().rev() {
                stack.push((rule.clone(), rel.clone()));
            }
        }

        Ok(stack)
    }

    /// §4.A contract: one value per requested name, `None` meaning "unspecified".
    pub fn attr(&self, path: BitPath, is_dir: bool, names: &[&str]) -> BitResult<Vec<Option<AttrValue>>> {
        let stack = self.precedence_stack(path, FileKind::Attribute)?;
        Ok(names
            .iter()
            .map(|&name| {
                stack.iter().find_map(|(rule, rel)| rule.matching_assignment(name, is_dir, rel).cloned())
            })
            .collect())
    }

    pub fn attr_one(&self, path: BitPath, is_dir: bool, name: &str) -> BitResult<Option<AttrValue>> {
        Ok(self.attr(path, is_dir, &[name])?.pop().unwrap())
    }

    /// whether `path` is ignored, honoring negation-re-inclusion's
    /// parent-directory guard (§4.A "negation re-includes a previously
    /// ignored path only if its parent directory is not itself ignored").
    pub fn is_ignored(&self, path: BitPath, is_dir: bool) -> BitResult<bool> {
        let stack = self.precedence_stack(path, FileKind::Ignore)?;
        let verdict = stack.iter().find_map(|(rule, rel)| rule.matching_assignment(IGNORE_ATTR, is_dir, rel).cloned());

        match verdict {
            Some(AttrValue::True) => Ok(true),
            Some(AttrValue::False) => match path.parent() {
                Some(parent) if !parent.is_empty() => {
                    if self.is_ignored(parent, true)? {
                        debug!("attr: `{}` re-included but parent `{}` is ignored", path, parent);
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests;

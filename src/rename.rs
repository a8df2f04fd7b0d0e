//! rename/copy detection (§4.E): rewrites a [`DeltaList`] in place, turning
//! matched `added`/`deleted` pairs into `renamed`/`copied` deltas when their
//! content similarity clears a threshold.
//!
//! grounded on libgit2's `diff_tform.c` hashsig-based similarity search (same
//! default thresholds: rename/copy 50, break-rewrite 60, target-limit 200),
//! reimplemented here as a line-fragment multiset (§4.E "Similarity metric")
//! rather than porting its rolling-hash whole-file signature verbatim.

use crate::collab::Collaborators;
use crate::diff::{read_content, DeltaList};
use crate::error::BitResult;
use crate::model::{Delta, DeltaFlags, DeltaStatus, FileEntry};
use rustc_hash::FxHashSet;
use std::path::Path;

bitflags! {
    pub struct RenameFlags: u16 {
        const RENAMES                 = 1 << 0;
        const COPIES                  = 1 << 1;
        const COPIES_FROM_UNMODIFIED  = 1 << 2;
        const REWRITES                = 1 << 3;
        const RENAMES_FROM_REWRITES   = 1 << 4;
        const EXACT_MATCH_ONLY        = 1 << 5;
        const IGNORE_WHITESPACE       = 1 << 6;
        const DONT_IGNORE_WHITESPACE  = 1 << 7;
        const BREAK_REWRITES          = 1 << 8;
        /// §9 "resolved open question": untracked sources are only considered
        /// as rename candidates when this flag is set.
        const FROM_UNTRACKED          = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenameOpts {
    pub flags: RenameFlags,
    pub rename_threshold: u8,
    pub copy_threshold: u8,
    pub rename_from_rewrite_threshold: u8,
    pub break_rewrite_threshold: u8,
    pub target_limit: usize,
}

impl Default for RenameOpts {
    fn default() -> Self {
        Self {
            flags: RenameFlags::RENAMES,
            rename_threshold: 50,
            copy_threshold: 50,
            rename_from_rewrite_threshold: 50,
            break_rewrite_threshold: 60,
            target_limit: 200,
        }
    }
}

/// a content signature: the multiset of `FxHash`-hashed line fragments making
/// up a blob, used for the Jaccard-style `100 * |A∩B| / |A∪B|` comparison
/// (§4.E "Similarity metric"). `None` means "uncomputable" (too small, binary,
/// unreadable), which disables the pair per the spec.
fn signature(bytes: &[u8], ignore_whitespace: bool) -> Option<FxHashSet<u64>> {
    if bytes.len() < 4 || bytes.iter().take(8000).any(|&b| b == 0) {
        return None;
    }
    use std::hash::{Hash, Hasher};
    let mut set = FxHashSet::default();
    for line in bytes.split(|&b| b == b'\n') {
        let normalized: Vec<u8> = if ignore_whitespace {
            line.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect()
        } else {
            line.to_vec()
        };
        if normalized.is_empty() {
            continue;
        }
        let mut hasher = rustc_hash::FxHasher::default();
        normalized.hash(&mut hasher);
        set.insert(hasher.finish());
    }
    if set.is_empty() { None } else { Some(set) }
}

/// `-1` (disabled) represented as `None`; `0..=100` otherwise.
fn jaccard_similarity(a: &FxHashSet<u64>, b: &FxHashSet<u64>) -> u8 {
    let union = a.union(b).count();
    if union == 0 {
        return 100;
    }
    let intersection = a.intersection(b).count();
    ((100 * intersection) / union) as u8
}

struct SignatureCache<'a> {
    collab: Collaborators<'a>,
    workdir_root: Option<&'a Path>,
    ignore_whitespace: bool,
    cache: std::collections::HashMap<usize, Option<FxHashSet<u64>>>,
}

impl<'a> SignatureCache<'a> {
    fn new(collab: Collaborators<'a>, workdir_root: Option<&'a Path>, ignore_whitespace: bool) -> Self {
        Self { collab, workdir_root, ignore_whitespace, cache: std::collections::HashMap::new() }
    }

    fn get(&mut self, idx: usize, file: FileEntry) -> BitResult<Option<FxHashSet<u64>>> {
        if let Some(sig) = self.cache.get(&idx) {
            return Ok(sig.clone());
        }
        let sig = match read_content(self.collab, self.workdir_root, file) {
            Ok(bytes) => signature(&bytes, self.ignore_whitespace),
            Err(_) => None,
        };
        self.cache.insert(idx, sig.clone());
        Ok(sig)
    }
}

/// similarity between the entries at `a_idx`/`b_idx`, `None` if uncomputable.
fn measure(
    cache: &mut SignatureCache<'_>,
    a_idx: usize,
    a: FileEntry,
    b_idx: usize,
    b: FileEntry,
    exact_only: bool,
) -> BitResult<Option<u8>> {
    if a.oid.is_known() && b.oid.is_known() && a.oid == b.oid {
        return Ok(Some(100));
    }
    if exact_only {
        return Ok(Some(0));
    }
    let Some(sig_a) = cache.get(a_idx, a)? else { return Ok(None) };
    let Some(sig_b) = cache.get(b_idx, b)? else { return Ok(None) };
    Ok(Some(jaccard_similarity(&sig_a, &sig_b)))
}

/// §4.E pipeline. `workdir_root` is required whenever a candidate side's oid
/// is unknown (workdir content not yet hashed).
pub fn find_renames(
    collab: Collaborators<'_>,
    workdir_root: Option<&Path>,
    list: &mut DeltaList,
    opts: &RenameOpts,
) -> BitResult<()> {
    if !opts.flags.intersects(RenameFlags::RENAMES | RenameFlags::COPIES) {
        return Ok(());
    }

    let ignore_whitespace = opts.flags.contains(RenameFlags::IGNORE_WHITESPACE)
        && !opts.flags.contains(RenameFlags::DONT_IGNORE_WHITESPACE);
    let exact_only = opts.flags.contains(RenameFlags::EXACT_MATCH_ONLY);
    let mut cache = SignatureCache::new(collab, workdir_root, ignore_whitespace);

    // step 1: mark near-total rewrites with a transient split flag so they
    // become eligible source+target pairs in their own right.
    if opts.flags.contains(RenameFlags::REWRITES) {
        for (idx, delta) in list.deltas.iter_mut().enumerate() {
            if delta.status != DeltaStatus::Modified {
                continue;
            }
            let self_sim = measure(&mut cache, idx, delta.old_file, idx, delta.new_file, exact_only)?;
            if let Some(sim) = self_sim {
                if sim < opts.break_rewrite_threshold {
                    delta.flags |= DeltaFlags::SPLIT_REWRITE;
                    delta.similarity = Some(sim);
                }
            }
        }
    }

    let is_source = |d: &Delta| -> bool {
        match d.status {
            DeltaStatus::Deleted => true,
            DeltaStatus::Modified if d.flags.contains(DeltaFlags::SPLIT_REWRITE) => true,
            DeltaStatus::Modified => opts.flags.contains(RenameFlags::COPIES),
            DeltaStatus::Unmodified =>
                opts.flags.contains(RenameFlags::COPIES)
                    && opts.flags.contains(RenameFlags::COPIES_FROM_UNMODIFIED),
            DeltaStatus::Untracked => opts.flags.contains(RenameFlags::FROM_UNTRACKED),
            _ => false,
        }
    };
    let is_target = |d: &Delta| -> bool {
        matches!(d.status, DeltaStatus::Added)
            || (d.status == DeltaStatus::Modified && d.flags.contains(DeltaFlags::SPLIT_REWRITE))
    };

    let source_indices: Vec<usize> = list.deltas.iter().enumerate().filter(|(_, d)| is_source(d)).map(|(i, _)| i).collect();
    let target_indices: Vec<usize> = list.deltas.iter().enumerate().filter(|(_, d)| is_target(d)).map(|(i, _)| i).collect();

    #[derive(Clone, Copy)]
    struct Best {
        target: usize,
        similarity: u8,
    }

    let mut matches: Vec<Option<Best>> = vec![None; list.deltas.len()];

    for &src_idx in &source_indices {
        let src_file = list.deltas[src_idx].old_file;
        let mut best: Option<Best> = None;
        for (tried, &tgt_idx) in target_indices.iter().enumerate() {
            if tried >= opts.target_limit {
                break;
            }
            if tgt_idx == src_idx {
                continue;
            }
            let tgt_file = list.deltas[tgt_idx].new_file;
            let Some(sim) = measure(&mut cache, src_idx, src_file, tgt_idx, tgt_file, exact_only)? else { continue };
            let better = match best {
                None => true,
                // ties broken by lower target index (§4.E "Determinism").
                Some(b) => sim > b.similarity || (sim == b.similarity && tgt_idx < b.target),
            };
            if better {
                best = Some(Best { target: tgt_idx, similarity: sim });
            }
        }
        matches[src_idx] = best;
    }

    let mut consumed_targets: FxHashSet<usize> = FxHashSet::default();
    let mut rewritten: Vec<(usize, Delta)> = Vec::new();
    let mut to_remove: FxHashSet<usize> = FxHashSet::default();

    for &src_idx in &source_indices {
        let Some(best) = matches[src_idx] else { continue };
        if consumed_targets.contains(&best.target) {
            continue;
        }
        let src = list.deltas[src_idx];
        let tgt = list.deltas[best.target];

        if opts.flags.contains(RenameFlags::RENAMES) && best.similarity >= opts.rename_threshold {
            let renamed = Delta {
                status: DeltaStatus::Renamed,
                old_file: src.old_file,
                new_file: tgt.new_file,
                similarity: Some(best.similarity),
                flags: src.flags | tgt.flags,
            };
            rewritten.push((src_idx, renamed));
            consumed_targets.insert(best.target);
            if best.target != src_idx {
                to_remove.insert(best.target);
            }
            continue;
        }

        if opts.flags.contains(RenameFlags::RENAMES_FROM_REWRITES)
            && src.status == DeltaStatus::Modified
            && !src.flags.contains(DeltaFlags::SPLIT_REWRITE)
        {
            let self_sim = measure(&mut cache, src_idx, src.old_file, src_idx, src.new_file, exact_only)?;
            if let Some(self_sim) = self_sim {
                if self_sim < opts.rename_from_rewrite_threshold && best.similarity >= opts.rename_threshold {
                    let renamed = Delta {
                        status: DeltaStatus::Renamed,
                        old_file: src.old_file,
                        new_file: tgt.new_file,
                        similarity: Some(best.similarity),
                        flags: src.flags | tgt.flags,
                    };
                    let mut re_add_old = src.new_file;
                    re_add_old.oid = crate::model::Oid::UNKNOWN;
                    re_add_old.stat = None;
                    rewritten.push((src_idx, Delta::new(DeltaStatus::Added, re_add_old, src.new_file)));
                    rewritten.push((best.target, renamed));
                    consumed_targets.insert(best.target);
                    continue;
                }
            }
        }

        if opts.flags.contains(RenameFlags::COPIES) && best.similarity >= opts.copy_threshold {
            let copied = Delta {
                status: DeltaStatus::Copied,
                old_file: src.old_file,
                new_file: tgt.new_file,
                similarity: Some(best.similarity),
                flags: tgt.flags,
            };
            rewritten.push((best.target, copied));
            consumed_targets.insert(best.target);
        }
    }

    for (idx, delta) in rewritten {
        list.deltas[idx] = delta;
    }
    if !to_remove.is_empty() {
        let mut idx = 0;
        list.deltas.retain(|_| {
            let keep = !to_remove.contains(&idx);
            idx += 1;
            keep
        });
    }
    for delta in &mut list.deltas {
        delta.flags.remove(DeltaFlags::SPLIT_REWRITE);
    }

    list.resort();
    Ok(())
}

use super::{BitTreeIterator, IterEntry};
use crate::error::{BitGenericError, BitResult};
use fallible_iterator::FallibleIterator;
use std::cmp::Ordering;

/// lockstep merge of up to `N` tree iterators (§4.D "merge-join over the
/// iterator abstraction"): each call to `next` advances every iterator
/// currently positioned on the lexicographically-first path, so the diff
/// engine sees one slot per source view instead of re-deriving alignment
/// itself. Whole matching subtrees are skipped via `advance_over` rather than
/// walked entry-by-entry when every aligned slot is the same tree (by oid) —
/// the merge-join's main saving over a flat two-pointer diff.
pub struct WalkIterators<'a, const N: usize> {
    iterators: [Box<dyn BitTreeIterator + 'a>; N],
}

impl<'a, const N: usize> WalkIterators<'a, N> {
    pub fn new(iterators: [Box<dyn BitTreeIterator + 'a>; N]) -> Self {
        Self { iterators }
    }
}

impl<'a, const N: usize> FallibleIterator for WalkIterators<'a, N> {
    type Item = [Option<IterEntry>; N];
    type Error = BitGenericError;

    fn next(&mut self) -> BitResult<Option<Self::Item>> {
        let mut next_entries: [Option<IterEntry>; N] = [None; N];
        let mut first_match: Option<IterEntry> = None;

        for i in 0..N {
            let entry = match self.iterators[i].current()? {
                Some(entry) => entry,
                None => continue,
            };

            next_entries[i] = Some(entry);
            match first_match {
                None => first_match = Some(entry),
                Some(fst) => match entry.file.entry_cmp(&fst.file) {
                    Ordering::Less => {
                        next_entries = [None; N];
                        first_match = Some(entry);
                        next_entries[i] = first_match;
                    }
                    Ordering::Equal => {}
                    Ordering::Greater => next_entries[i] = None,
                },
            }
        }

        if first_match.is_none() {
            return Ok(None);
        }

        let mut is_same_tree = true;
        let mut oid = None;
        for entry in next_entries.iter().flatten() {
            if !entry.is_tree() {
                is_same_tree = false;
                break;
            }
            match oid {
                Some(o) if entry.file.oid != o => {
                    is_same_tree = false;
                    break;
                }
                Some(_) => {}
                None => oid = Some(entry.file.oid),
            }
        }

        for (i, entry) in next_entries.iter().enumerate() {
            if entry.is_some() {
                if is_same_tree {
                    self.iterators[i].advance_over()?;
                } else {
                    self.iterators[i].advance()?;
                }
            }
        }

        Ok(Some(next_entries))
    }
}

#[cfg(test)]
mod tests;

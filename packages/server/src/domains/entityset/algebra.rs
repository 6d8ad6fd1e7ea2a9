//! Pure set algebra over entity-ID collections.
//!
//! For each [`UnionUnit`] `u` the engine computes
//! `term(u) = (intersection of u.intersection) minus (union of u.exclusions)`
//! and the final result is the union of all terms.
//!
//! Entity identifiers are arbitrary strings (donor codes, gene ids, file
//! UUIDs). Production sets span hundreds of thousands of entities, so the
//! engine interns every identifier into a dense `u32` domain and performs
//! the actual algebra as compressed-bitmap intersection/difference/union.
//! No I/O happens here; member resolution is injected by the caller.

use std::collections::HashMap;

use roaring::RoaringBitmap;
use tracing::warn;

use super::models::{SetId, UnionUnit};

/// Interns string entity ids into a dense `u32` domain.
///
/// Slots are assigned in first-seen order and never reused, so a slot is
/// stable for the lifetime of one computation.
#[derive(Debug, Default)]
pub struct IdArena {
    index: HashMap<String, u32>,
    ids: Vec<String>,
}

impl IdArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `id`, assigning a fresh one on first sight.
    pub fn intern(&mut self, id: &str) -> u32 {
        if let Some(&slot) = self.index.get(id) {
            return slot;
        }
        let slot = self.ids.len() as u32;
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), slot);
        slot
    }

    /// The identifier occupying `slot`. Panics on a slot this arena never
    /// assigned, which cannot happen for bitmaps built from it.
    fn resolve(&self, slot: u32) -> &str {
        &self.ids[slot as usize]
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Build a membership bitmap from a member list.
    pub fn bitmap_of(&mut self, members: &[String]) -> RoaringBitmap {
        let mut bitmap = RoaringBitmap::new();
        for id in members {
            bitmap.insert(self.intern(id));
        }
        bitmap
    }
}

/// Compute the union of all terms, resolving set ids through `resolve`.
///
/// `resolve` returns the member list of a previously materialized set, or
/// `None` when the id does not resolve. An unresolvable id inside a term
/// empties that term only; the remaining terms still contribute. The output
/// is deduplicated and its order is unspecified.
pub fn compute_union<F>(units: &[UnionUnit], mut resolve: F) -> Vec<String>
where
    F: FnMut(&SetId) -> Option<Vec<String>>,
{
    let mut arena = IdArena::new();
    let mut memo: HashMap<SetId, Option<RoaringBitmap>> = HashMap::new();

    let mut result = RoaringBitmap::new();
    for unit in units {
        if let Some(term) = compute_term(unit, &mut arena, &mut memo, &mut resolve) {
            result |= term;
        }
    }

    result.iter().map(|slot| arena.resolve(slot).to_string()).collect()
}

/// Cardinality a single term produces, using the same fail-soft rules as
/// [`compute_union`].
pub fn term_count<F>(unit: &UnionUnit, mut resolve: F) -> u64
where
    F: FnMut(&SetId) -> Option<Vec<String>>,
{
    let mut arena = IdArena::new();
    let mut memo = HashMap::new();
    compute_term(unit, &mut arena, &mut memo, &mut resolve)
        .map(|bitmap| bitmap.len())
        .unwrap_or(0)
}

/// `None` means the term is empty (either mathematically, or because an
/// intersection member failed to resolve).
fn compute_term<F>(
    unit: &UnionUnit,
    arena: &mut IdArena,
    memo: &mut HashMap<SetId, Option<RoaringBitmap>>,
    resolve: &mut F,
) -> Option<RoaringBitmap>
where
    F: FnMut(&SetId) -> Option<Vec<String>>,
{
    let mut term: Option<RoaringBitmap> = None;
    for set_id in &unit.intersection {
        match lookup(set_id, arena, memo, resolve) {
            Some(bitmap) => {
                term = Some(match term {
                    None => bitmap.clone(),
                    Some(acc) => acc & bitmap,
                });
            }
            None => {
                // A stale reference empties this term but must not poison
                // the rest of the union.
                warn!(set_id = %set_id, "unresolvable set in intersection; term is empty");
                return None;
            }
        }
    }

    let mut term = term?;
    for set_id in &unit.exclusions {
        match lookup(set_id, arena, memo, resolve) {
            Some(bitmap) => term -= bitmap,
            None => {
                warn!(set_id = %set_id, "unresolvable set in exclusions; excluding nothing");
            }
        }
    }

    Some(term)
}

fn lookup<'a, F>(
    set_id: &SetId,
    arena: &mut IdArena,
    memo: &'a mut HashMap<SetId, Option<RoaringBitmap>>,
    resolve: &mut F,
) -> Option<&'a RoaringBitmap>
where
    F: FnMut(&SetId) -> Option<Vec<String>>,
{
    if !memo.contains_key(set_id) {
        let bitmap = resolve(set_id).map(|members| arena.bitmap_of(&members));
        memo.insert(*set_id, bitmap);
    }
    memo.get(set_id).and_then(|entry| entry.as_ref())
}

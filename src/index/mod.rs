//! The inverted-index data model and its thread-safe decorator.
//!
//! [`InvertedIndex`] is the single-threaded data structure: a sorted map from
//! stem to sorted map from location to sorted set of positions, plus a sorted
//! map from location to total accepted occurrences. [`ThreadSafeIndex`] wraps
//! it so that every mutator goes through [`crate::sync::MultiReaderLock`]'s
//! writer handle and every observer/search goes through its reader handle,
//! mirroring the split `readLock()`/`writeLock()` this crate's `sync` module
//! is built to support.

use crate::sync::{MultiReaderLock, ReadGuard, WriteGuard};
use std::cell::UnsafeCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// A stemmed, lowercased, non-empty token.
pub type Stem = String;
/// A file path (as traversed) or a fragment-stripped absolute URL.
pub type Location = String;
/// A 1-based ordinal of a stem within its location's tokenised stream.
pub type Position = usize;

/// A single ranked hit: a location, how many query stems matched there, and
/// the resulting match/total ratio.
///
/// Deliberately does not borrow the index it was computed from: the counts
/// snapshot is passed in explicitly rather than captured by reference. The
/// comparator that orders a batch of these is a free function, not a
/// method, for the same reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMetadata {
    pub location: Location,
    pub match_count: u64,
    pub score: f64,
}

/// Sort a batch of results by a strict total order: score descending, then
/// location total count descending, then location ascending under a
/// case-insensitive collation.
fn rank(results: &mut [ResultMetadata], counts: &BTreeMap<Location, u64>) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let ca = counts.get(&a.location).copied().unwrap_or(0);
                let cb = counts.get(&b.location).copied().unwrap_or(0);
                cb.cmp(&ca)
            })
            .then_with(|| crate::utils::compare_locations_ci(&a.location, &b.location))
    });
}

/// The sorted postings list plus per-location occurrence counts.
///
/// Invariants: stems, locations-within-a-stem, and
/// positions-within-a-(stem,location) are all ascending by construction
/// (`BTreeMap`/`BTreeSet`); `counts[L]` always equals the number of `add`
/// calls that actually inserted a new position at `L`.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    index: BTreeMap<Stem, BTreeMap<Location, BTreeSet<Position>>>,
    counts: BTreeMap<Location, u64>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `stem` at `location`/`position`. Returns
    /// whether the position was newly recorded (it won't be on a replayed
    /// duplicate triple) — callers rely on this to decide whether the count
    /// invariant should advance.
    pub fn add(&mut self, stem: &str, location: &str, position: Position) -> bool {
        let locations = self.index.entry(stem.to_string()).or_default();
        let positions = locations.entry(location.to_string()).or_default();
        let inserted = positions.insert(position);
        if inserted {
            *self.counts.entry(location.to_string()).or_insert(0) += 1;
        }
        inserted
    }

    /// Merge `other` into `self`: transplant whole sub-maps
    /// where `self` has nothing yet, union position sets where both sides
    /// recorded the same (stem, location), and sum counts independently of
    /// the merged postings. This requires that `other` never shares a
    /// location with `self` for positions it didn't itself record — the
    /// build pipeline's one-local-index-per-file/page discipline guarantees
    /// this.
    pub fn add_all(&mut self, other: InvertedIndex) {
        for (stem, other_locations) in other.index {
            match self.index.entry(stem) {
                std::collections::btree_map::Entry::Vacant(slot) => {
                    slot.insert(other_locations);
                }
                std::collections::btree_map::Entry::Occupied(mut slot) => {
                    let this_locations = slot.get_mut();
                    for (location, positions) in other_locations {
                        match this_locations.entry(location) {
                            std::collections::btree_map::Entry::Vacant(slot) => {
                                slot.insert(positions);
                            }
                            std::collections::btree_map::Entry::Occupied(mut slot) => {
                                slot.get_mut().extend(positions);
                            }
                        }
                    }
                }
            }
        }
        for (location, count) in other.counts {
            *self.counts.entry(location).or_insert(0) += count;
        }
    }

    pub fn has_stem(&self, stem: &str) -> bool {
        self.index.contains_key(stem)
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.counts.contains_key(location)
    }

    pub fn stem_has_location(&self, stem: &str, location: &str) -> bool {
        self.index
            .get(stem)
            .map(|locations| locations.contains_key(location))
            .unwrap_or(false)
    }

    pub fn stem_at_position(&self, stem: &str, location: &str, position: Position) -> bool {
        self.index
            .get(stem)
            .and_then(|locations| locations.get(location))
            .map(|positions| positions.contains(&position))
            .unwrap_or(false)
    }

    pub fn count_of(&self, location: &str) -> u64 {
        self.counts.get(location).copied().unwrap_or(0)
    }

    pub fn counts_size(&self) -> usize {
        self.counts.len()
    }

    pub fn index_size(&self) -> usize {
        self.index.len()
    }

    pub fn num_locations_at_stem(&self, stem: &str) -> usize {
        self.index.get(stem).map(|l| l.len()).unwrap_or(0)
    }

    pub fn num_stem_at_location(&self, location: &str) -> usize {
        self.index
            .values()
            .filter(|locations| locations.contains_key(location))
            .count()
    }

    pub fn num_positions_at_location_for_stem(&self, stem: &str, location: &str) -> usize {
        self.index
            .get(stem)
            .and_then(|locations| locations.get(location))
            .map(|positions| positions.len())
            .unwrap_or(0)
    }

    /// All locations that have had at least one successful `add`, ascending.
    pub fn locations(&self) -> Vec<Location> {
        self.counts.keys().cloned().collect()
    }

    /// All stems present, ascending.
    pub fn stems(&self) -> Vec<Stem> {
        self.index.keys().cloned().collect()
    }

    /// Locations indexed under `stem`, ascending. Empty if the stem is absent.
    pub fn stem_locations(&self, stem: &str) -> Vec<Location> {
        self.index
            .get(stem)
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Positions recorded for `stem` at `location`, ascending. Empty if
    /// either key is absent.
    pub fn stem_positions_in(&self, stem: &str, location: &str) -> Vec<Position> {
        self.index
            .get(stem)
            .and_then(|l| l.get(location))
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    /// A snapshot of the counts map.
    pub fn counts_snapshot(&self) -> BTreeMap<Location, u64> {
        self.counts.clone()
    }

    /// Exact search: a query stem must literally match an indexed stem.
    pub fn exact_search(&self, query: &BTreeSet<Stem>) -> Vec<ResultMetadata> {
        self.accumulate(query.iter().map(|s| s.as_str()))
    }

    /// Partial (prefix) search: a query stem matches any indexed stem it is
    /// a prefix of. Walks the sorted-stem range starting at the query stem
    /// and stops as soon as the prefix relationship breaks, which is why
    /// `index` being a `BTreeMap` (not a hash map) matters for this query.
    pub fn partial_search(&self, query: &BTreeSet<Stem>) -> Vec<ResultMetadata> {
        // Two query stems may be prefixes of each other (e.g. "part" and
        // "particl"), so the same indexed stem can be reached from more than
        // one prefix walk below; dedup before accumulating or its positions
        // get double-counted into the match count.
        let mut matching_stems: BTreeSet<&str> = BTreeSet::new();
        for prefix in query {
            for (stem, _) in self.index.range(prefix.clone()..) {
                if stem.starts_with(prefix.as_str()) {
                    matching_stems.insert(stem.as_str());
                } else {
                    break;
                }
            }
        }
        self.accumulate(matching_stems.into_iter())
    }

    pub fn search(&self, query: &BTreeSet<Stem>, partial: bool) -> Vec<ResultMetadata> {
        if partial {
            self.partial_search(query)
        } else {
            self.exact_search(query)
        }
    }

    fn accumulate<'a>(&self, stems: impl Iterator<Item = &'a str>) -> Vec<ResultMetadata> {
        let mut order: Vec<Location> = Vec::new();
        let mut match_counts: BTreeMap<Location, u64> = BTreeMap::new();

        for stem in stems {
            let Some(locations) = self.index.get(stem) else {
                continue;
            };
            for (location, positions) in locations {
                let entry = match_counts.entry(location.clone());
                let first_seen = matches!(entry, std::collections::btree_map::Entry::Vacant(_));
                let counter = entry.or_insert(0);
                *counter += positions.len() as u64;
                if first_seen {
                    order.push(location.clone());
                }
            }
        }

        let mut results: Vec<ResultMetadata> = order
            .into_iter()
            .map(|location| {
                let match_count = match_counts[&location];
                let total = self.count_of(&location);
                let score = if total > 0 {
                    match_count as f64 / total as f64
                } else {
                    0.0
                };
                ResultMetadata {
                    location,
                    match_count,
                    score,
                }
            })
            .collect();

        rank(&mut results, &self.counts);
        results
    }
}

/// Decorates every [`InvertedIndex`] operation with the correct
/// [`MultiReaderLock`] handle: mutators take the writer handle, everything
/// else takes the reader handle.
///
/// The index itself lives behind an `UnsafeCell` rather than
/// `std::sync::RwLock`/`parking_lot::RwLock` because `MultiReaderLock`
/// already provides (and tests) the mutual-exclusion guarantee a `RwLock`
/// would duplicate; every access here goes through a guard that holds the
/// corresponding handle for the duration of the borrow, so the usual
/// aliasing rules are upheld by construction as long as callers only reach
/// the data through these methods.
pub struct ThreadSafeIndex {
    lock: MultiReaderLock,
    data: UnsafeCell<InvertedIndex>,
}

// SAFETY: all access to `data` is gated by `MultiReaderLock`, which enforces
// the same single-writer/multi-reader discipline a `Sync` type requires.
unsafe impl Sync for ThreadSafeIndex {}
unsafe impl Send for ThreadSafeIndex {}

impl ThreadSafeIndex {
    pub fn new() -> Self {
        Self {
            lock: MultiReaderLock::new(),
            data: UnsafeCell::new(InvertedIndex::new()),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&InvertedIndex) -> R) -> R {
        let reader = self.lock.reader();
        let _guard = ReadGuard::acquire(&reader);
        // SAFETY: the reader guard excludes any writer for its lifetime.
        f(unsafe { &*self.data.get() })
    }

    fn write<R>(&self, f: impl FnOnce(&mut InvertedIndex) -> R) -> R {
        let writer = self.lock.writer();
        let _guard = WriteGuard::acquire(&writer);
        // SAFETY: the writer guard excludes every reader and writer for its
        // lifetime, so an exclusive borrow is sound.
        f(unsafe { &mut *self.data.get() })
    }

    pub fn add(&self, stem: &str, location: &str, position: Position) -> bool {
        self.write(|index| index.add(stem, location, position))
    }

    pub fn add_all(&self, other: InvertedIndex) {
        self.write(|index| index.add_all(other));
    }

    pub fn has_stem(&self, stem: &str) -> bool {
        self.read(|index| index.has_stem(stem))
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.read(|index| index.has_location(location))
    }

    pub fn count_of(&self, location: &str) -> u64 {
        self.read(|index| index.count_of(location))
    }

    pub fn counts_size(&self) -> usize {
        self.read(|index| index.counts_size())
    }

    pub fn index_size(&self) -> usize {
        self.read(|index| index.index_size())
    }

    pub fn num_locations_at_stem(&self, stem: &str) -> usize {
        self.read(|index| index.num_locations_at_stem(stem))
    }

    pub fn locations(&self) -> Vec<Location> {
        self.read(|index| index.locations())
    }

    pub fn stems(&self) -> Vec<Stem> {
        self.read(|index| index.stems())
    }

    pub fn stem_locations(&self, stem: &str) -> Vec<Location> {
        self.read(|index| index.stem_locations(stem))
    }

    pub fn stem_positions_in(&self, stem: &str, location: &str) -> Vec<Position> {
        self.read(|index| index.stem_positions_in(stem, location))
    }

    pub fn stem_has_location(&self, stem: &str, location: &str) -> bool {
        self.read(|index| index.stem_has_location(stem, location))
    }

    pub fn stem_at_position(&self, stem: &str, location: &str, position: Position) -> bool {
        self.read(|index| index.stem_at_position(stem, location, position))
    }

    pub fn num_stem_at_location(&self, location: &str) -> usize {
        self.read(|index| index.num_stem_at_location(location))
    }

    pub fn num_positions_at_location_for_stem(&self, stem: &str, location: &str) -> usize {
        self.read(|index| index.num_positions_at_location_for_stem(stem, location))
    }

    pub fn counts_snapshot(&self) -> BTreeMap<Location, u64> {
        self.read(|index| index.counts_snapshot())
    }

    pub fn search(&self, query: &BTreeSet<Stem>, partial: bool) -> Vec<ResultMetadata> {
        self.read(|index| index.search(query, partial))
    }

    /// Serialise the counts map to `path` while holding the reader handle
    /// for the full operation, so the file reflects one consistent snapshot.
    pub fn write_counts(&self, path: &std::path::Path) -> anyhow::Result<()> {
        self.read(|index| crate::json_writer::write_counts(path, &index.counts_snapshot()))
    }

    /// Serialise the full inverted index to `path`, same snapshot guarantee
    /// as [`Self::write_counts`].
    pub fn write_index(&self, path: &std::path::Path) -> anyhow::Result<()> {
        self.read(|index| crate::json_writer::write_index(path, index))
    }
}

impl Default for ThreadSafeIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stems(words: &[&str]) -> BTreeSet<Stem> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn add_tracks_positions_and_counts() {
        let mut index = InvertedIndex::new();
        assert!(index.add("red", "a.txt", 1));
        assert!(index.add("fish", "a.txt", 2));
        assert!(index.add("red", "a.txt", 3));
        assert!(index.add("fish", "a.txt", 4));

        assert_eq!(index.count_of("a.txt"), 4);
        assert_eq!(index.stem_positions_in("fish", "a.txt"), vec![2, 4]);
        assert_eq!(index.stem_positions_in("red", "a.txt"), vec![1, 3]);
    }

    #[test]
    fn duplicate_add_does_not_double_count() {
        let mut index = InvertedIndex::new();
        assert!(index.add("red", "a.txt", 1));
        assert!(!index.add("red", "a.txt", 1));
        assert_eq!(index.count_of("a.txt"), 1);
    }

    #[test]
    fn exact_search_scores_full_match() {
        let mut index = InvertedIndex::new();
        for (stem, pos) in [("red", 1), ("fish", 2), ("red", 3), ("fish", 4)] {
            index.add(stem, "a.txt", pos);
        }

        let results = index.exact_search(&stems(&["red", "fish"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].location, "a.txt");
        assert_eq!(results[0].match_count, 4);
        assert!((results[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn partial_search_tie_break_prefers_higher_count() {
        let mut index = InvertedIndex::new();
        index.add("cat", "short.txt", 1);
        for (stem, pos) in [("categori", 1), ("cat", 2), ("catch", 3)] {
            index.add(stem, "long.txt", pos);
        }

        let results = index.partial_search(&stems(&["cat"]));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].location, "long.txt");
        assert_eq!(results[1].location, "short.txt");
    }

    #[test]
    fn add_all_merges_positions_and_sums_counts() {
        let mut base = InvertedIndex::new();
        base.add("red", "a.txt", 1);
        base.add("fish", "a.txt", 2);

        let mut other = InvertedIndex::new();
        other.add("red", "a.txt", 3);
        other.add("blue", "b.txt", 1);

        base.add_all(other);

        assert_eq!(base.stem_positions_in("red", "a.txt"), vec![1, 3]);
        assert_eq!(base.count_of("a.txt"), 3);
        assert_eq!(base.count_of("b.txt"), 1);
        assert!(base.has_stem("blue"));
    }

    #[test]
    fn merge_idempotence_under_replay() {
        let mut l1 = InvertedIndex::new();
        l1.add("red", "a.txt", 1);
        l1.add("fish", "a.txt", 2);
        let l2 = l1.clone();

        let mut merged = InvertedIndex::new();
        merged.add_all(l1.clone());
        merged.add_all(l2);

        assert_eq!(merged.stem_positions_in("red", "a.txt"), vec![1]);
        assert_eq!(merged.stem_positions_in("fish", "a.txt"), vec![2]);
        assert_eq!(merged.count_of("a.txt"), 2 * l1.count_of("a.txt"));
    }

    #[test]
    fn exact_is_subset_of_partial() {
        let mut index = InvertedIndex::new();
        index.add("cat", "a.txt", 1);
        index.add("category", "b.txt", 1);

        let exact: BTreeSet<_> = index
            .exact_search(&stems(&["cat"]))
            .into_iter()
            .map(|r| r.location)
            .collect();
        let partial: BTreeSet<_> = index
            .partial_search(&stems(&["cat"]))
            .into_iter()
            .map(|r| r.location)
            .collect();

        assert!(exact.is_subset(&partial));
    }

    #[test]
    fn partial_search_does_not_double_count_overlapping_query_prefixes() {
        let mut index = InvertedIndex::new();
        index.add("particl", "x.txt", 1);
        index.add("particl", "x.txt", 2);
        index.add("particl", "x.txt", 3);

        // "part" and "particl" both match the indexed stem "particl"; the
        // query set names it through two overlapping prefixes.
        let results = index.partial_search(&stems(&["part", "particl"]));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_count, 3);
        assert!(results[0].score <= 1.0);
        assert!((results[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_keys_return_empty_not_panic() {
        let index = InvertedIndex::new();
        assert!(!index.has_stem("nope"));
        assert_eq!(index.count_of("nope"), 0);
        assert!(index.stem_positions_in("nope", "nope").is_empty());
        assert!(index.stem_locations("nope").is_empty());
    }

    #[test]
    fn thread_safe_index_add_and_search() {
        let index = ThreadSafeIndex::new();
        index.add("red", "a.txt", 1);
        index.add("fish", "a.txt", 2);

        let results = index.search(&stems(&["red", "fish"]), false);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].location, "a.txt");
    }

    #[test]
    fn thread_safe_index_delegates_remaining_read_queries() {
        let index = ThreadSafeIndex::new();
        index.add("red", "a.txt", 1);

        assert!(index.stem_has_location("red", "a.txt"));
        assert!(!index.stem_has_location("red", "b.txt"));
        assert!(index.stem_at_position("red", "a.txt", 1));
        assert!(!index.stem_at_position("red", "a.txt", 2));
        assert_eq!(index.num_stem_at_location("a.txt"), 1);
        assert_eq!(index.num_positions_at_location_for_stem("red", "a.txt"), 1);
    }

    #[test]
    fn thread_safe_index_concurrent_writers_preserve_invariant() {
        use std::sync::Arc;
        use std::thread;

        let index = Arc::new(ThreadSafeIndex::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let index = Arc::clone(&index);
            handles.push(thread::spawn(move || {
                for p in 1..=50 {
                    index.add("word", &format!("loc{t}.txt"), p);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for t in 0..8 {
            assert_eq!(index.count_of(&format!("loc{t}.txt")), 50);
        }
        assert_eq!(index.num_locations_at_stem("word"), 8);
    }
}

//! [`FileSearcher`]: maps each distinct query line to a ranked result list,
//! with an inline mode and a [`WorkQueue`]-backed threaded mode that
//! enforces at-most-once computation per canonical query.

use crate::index::{ResultMetadata, ThreadSafeIndex};
use crate::stemmer::TokenStemmer;
use crate::workqueue::WorkQueue;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Stem and canonicalise a raw query line: tokenise, stem each token, drop
/// empties, collect into the ordered set whose members joined by a single
/// space form the cache key.
pub fn canonical_query(line: &str, stemmer: &TokenStemmer) -> (String, BTreeSet<String>) {
    let stems: BTreeSet<String> = stemmer.stem_line(line).into_iter().collect();
    let canonical = stems.iter().cloned().collect::<Vec<_>>().join(" ");
    (canonical, stems)
}

/// `None` means the query has been claimed by an in-flight task but not yet
/// computed; `Some` is the final ranked list.
type ResultsMap = BTreeMap<String, Option<Vec<ResultMetadata>>>;

/// Maps each distinct canonical query to its ranked result list. Identical
/// queries (after canonicalisation) are computed at most once.
pub struct FileSearcher {
    index: Arc<ThreadSafeIndex>,
    results: Arc<Mutex<ResultsMap>>,
    queue: Option<Arc<WorkQueue>>,
}

impl FileSearcher {
    /// Inline mode: `search_line` blocks until the search completes.
    pub fn new(index: Arc<ThreadSafeIndex>) -> Self {
        Self {
            index,
            results: Arc::new(Mutex::new(BTreeMap::new())),
            queue: None,
        }
    }

    /// Threaded mode: `search_line` enqueues the work and returns
    /// immediately; call `finish()` (or let `search_file` do it) to wait for
    /// outstanding queries.
    pub fn new_threaded(index: Arc<ThreadSafeIndex>, queue: Arc<WorkQueue>) -> Self {
        Self {
            index,
            results: Arc::new(Mutex::new(BTreeMap::new())),
            queue: Some(queue),
        }
    }

    /// Search a single query line. An empty canonical form (all tokens
    /// stemmed away, or a blank line) is ignored — no record is created.
    pub fn search_line(&self, line: &str, partial: bool) {
        let stemmer = TokenStemmer::new();
        let (canonical, query_stems) = canonical_query(line, &stemmer);
        if canonical.is_empty() {
            return;
        }

        match &self.queue {
            None => {
                {
                    let results = self.results.lock().unwrap();
                    if results.contains_key(&canonical) {
                        return;
                    }
                }
                let list = self.index.search(&query_stems, partial);
                let mut results = self.results.lock().unwrap();
                results.insert(canonical, Some(list));
            }
            Some(queue) => {
                let index = Arc::clone(&self.index);
                let results_handle = Arc::clone(&self.results);
                queue.execute(move || {
                    {
                        // Check-and-claim atomically under the results
                        // lock; if another task already claimed this
                        // canonical query (in flight or done), this task
                        // has no more work to do.
                        let mut results = results_handle.lock().unwrap();
                        if results.contains_key(&canonical) {
                            return;
                        }
                        results.insert(canonical.clone(), None);
                    }
                    // The heavy search runs outside the results lock; the
                    // index has its own lock.
                    let list = index.search(&query_stems, partial);
                    let mut results = results_handle.lock().unwrap();
                    results.insert(canonical, Some(list));
                });
            }
        }
    }

    /// Search every line of `path`. In threaded mode, blocks on
    /// `queue.finish()` after dispatching all lines before returning.
    pub fn search_file(&self, path: &Path, partial: bool) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open query file: {}", path.display()))?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line.with_context(|| format!("failed to read {}", path.display()))?;
            self.search_line(&line, partial);
        }
        if let Some(queue) = &self.queue {
            queue.finish();
        }
        Ok(())
    }

    /// Whether `line`'s canonical form has a (possibly still-computing)
    /// record.
    pub fn has_query(&self, line: &str) -> bool {
        let stemmer = TokenStemmer::new();
        let (canonical, _) = canonical_query(line, &stemmer);
        if canonical.is_empty() {
            return false;
        }
        self.results.lock().unwrap().contains_key(&canonical)
    }

    /// The ranked results for `line`'s canonical form, or empty if absent,
    /// empty, or still computing.
    pub fn get_results(&self, line: &str) -> Vec<ResultMetadata> {
        let stemmer = TokenStemmer::new();
        let (canonical, _) = canonical_query(line, &stemmer);
        if canonical.is_empty() {
            return Vec::new();
        }
        self.results
            .lock()
            .unwrap()
            .get(&canonical)
            .and_then(|slot| slot.clone())
            .unwrap_or_default()
    }

    /// Number of distinct canonical queries recorded so far (completed or
    /// in flight).
    pub fn size(&self) -> usize {
        self.results.lock().unwrap().len()
    }

    /// Snapshot completed results and serialise them to `path`.
    pub fn write_results(&self, path: &Path) -> Result<()> {
        let snapshot: BTreeMap<String, Vec<ResultMetadata>> = {
            let results = self.results.lock().unwrap();
            results
                .iter()
                .filter_map(|(query, slot)| slot.clone().map(|list| (query.clone(), list)))
                .collect()
        };
        crate::json_writer::write_results(path, &snapshot)
    }
}

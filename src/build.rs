//! [`IndexBuilder`]: filesystem traversal and file tokenisation.
//!
//! Serial mode writes straight into the shared [`ThreadSafeIndex`] one stem
//! at a time; parallel mode builds a fresh local [`InvertedIndex`] per file
//! on a [`WorkQueue`] task and merges it in with `add_all`. Directory
//! traversal always runs on the calling thread, dispatching one task per
//! discovered file.

use crate::index::{InvertedIndex, ThreadSafeIndex};
use crate::stemmer::TokenStemmer;
use crate::workqueue::WorkQueue;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};
use walkdir::WalkDir;

pub struct IndexBuilder;

impl IndexBuilder {
    fn is_included(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("text"))
            .unwrap_or(false)
    }

    /// A bare file is accepted directly; a directory is walked recursively,
    /// following symlinks, for `.txt`/`.text` files (case-insensitive).
    fn discover(root: &Path) -> Result<Vec<PathBuf>> {
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.with_context(|| {
                format!("failed to walk directory tree at {}", root.display())
            })?;
            if entry.file_type().is_file() && Self::is_included(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
        Ok(files)
    }

    fn tokenize_into(path: &Path, index: &mut InvertedIndex, stemmer: &TokenStemmer) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let location = path.to_string_lossy().into_owned();

        let mut position: usize = 0;
        for line in reader.lines() {
            let line = line.with_context(|| format!("non-UTF-8 content in {}", path.display()))?;
            for stem in stemmer.stem_line(&line) {
                position += 1;
                index.add(&stem, &location, position);
            }
        }
        Ok(())
    }

    /// Build the index from `root` on the calling thread, writing directly
    /// into the shared index as each token is stemmed.
    pub fn build_serial(root: &Path, index: &ThreadSafeIndex) -> Result<()> {
        let files = Self::discover(root)?;
        for path in files {
            let stemmer = TokenStemmer::new();
            if let Err(e) = Self::tokenize_into_shared(&path, index, &stemmer) {
                warn!(path = %path.display(), error = %e, "skipping file during serial build");
            }
        }
        Ok(())
    }

    fn tokenize_into_shared(path: &Path, index: &ThreadSafeIndex, stemmer: &TokenStemmer) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("failed to open file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let location = path.to_string_lossy().into_owned();

        let mut position: usize = 0;
        for line in reader.lines() {
            let line = line.with_context(|| format!("non-UTF-8 content in {}", path.display()))?;
            for stem in stemmer.stem_line(&line) {
                position += 1;
                index.add(&stem, &location, position);
            }
        }
        Ok(())
    }

    /// Build the index from `root` by enqueueing one task per discovered
    /// file onto `queue`. Each task builds a fresh local index and merges it
    /// into `index` via `add_all`. Blocks on `queue.finish()` before
    /// returning, so the caller sees a fully merged index.
    pub fn build_parallel(root: &Path, index: Arc<ThreadSafeIndex>, queue: &WorkQueue) -> Result<()> {
        let files = Self::discover(root)?;
        for path in files {
            let index = Arc::clone(&index);
            queue.execute(move || {
                let stemmer = TokenStemmer::new();
                let mut local = InvertedIndex::new();
                match Self::tokenize_into(&path, &mut local, &stemmer) {
                    Ok(()) => index.add_all(local),
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "failed to index file in worker");
                    }
                }
            });
        }
        queue.finish();
        Ok(())
    }
}

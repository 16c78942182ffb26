//! CLI argument parsing and pipeline wiring.
//!
//! Argument parsing stays a small hand-rolled loop rather than built on
//! `clap`: the single-dash multi-character flag grammar here (`-text`,
//! `-crawl`, `-threads`) isn't representable by clap's derive conventions
//! without fighting them.

use crate::build::IndexBuilder;
use crate::crawler::WebCrawler;
use crate::index::ThreadSafeIndex;
use crate::search::FileSearcher;
use crate::workqueue::WorkQueue;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub text: Option<PathBuf>,
    pub html: Option<String>,
    pub crawl: usize,
    pub query: Option<PathBuf>,
    pub partial: bool,
    /// `None` means run serially; `Some(n)` means spin up an `n`-thread pool.
    pub threads: Option<usize>,
    pub counts_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
}

impl CliArgs {
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = args.into_iter().map(Into::into).collect();

        let mut text = None;
        let mut html = None;
        let mut crawl: usize = 1;
        let mut query = None;
        let mut partial = false;
        let mut threads_flag = false;
        let mut threads_value: usize = 5;
        let mut counts_path = None;
        let mut index_path = None;
        let mut results_path = None;

        let looks_like_value = |tokens: &[String], i: usize| {
            tokens.get(i).map(|s| !s.starts_with('-')).unwrap_or(false)
        };

        let mut i = 0;
        while i < tokens.len() {
            match tokens[i].as_str() {
                "-text" if looks_like_value(&tokens, i + 1) => {
                    text = Some(PathBuf::from(&tokens[i + 1]));
                    i += 1;
                }
                "-html" if looks_like_value(&tokens, i + 1) => {
                    html = Some(tokens[i + 1].clone());
                    i += 1;
                }
                "-query" if looks_like_value(&tokens, i + 1) => {
                    query = Some(PathBuf::from(&tokens[i + 1]));
                    i += 1;
                }
                "-partial" => {
                    partial = true;
                }
                "-crawl" => {
                    let parsed = tokens.get(i + 1).and_then(|s| s.parse::<i64>().ok());
                    if parsed.is_some() {
                        i += 1;
                    }
                    crawl = parsed.filter(|&v| v >= 1).map(|v| v as usize).unwrap_or(1);
                }
                "-threads" => {
                    threads_flag = true;
                    let parsed = tokens.get(i + 1).and_then(|s| s.parse::<i64>().ok());
                    if parsed.is_some() {
                        i += 1;
                    }
                    threads_value = parsed.filter(|&v| v >= 1).map(|v| v as usize).unwrap_or(5);
                }
                "-counts" => {
                    if looks_like_value(&tokens, i + 1) {
                        counts_path = Some(PathBuf::from(&tokens[i + 1]));
                        i += 1;
                    } else {
                        counts_path = Some(PathBuf::from("counts.json"));
                    }
                }
                "-index" => {
                    if looks_like_value(&tokens, i + 1) {
                        index_path = Some(PathBuf::from(&tokens[i + 1]));
                        i += 1;
                    } else {
                        index_path = Some(PathBuf::from("index.json"));
                    }
                }
                "-results" => {
                    if looks_like_value(&tokens, i + 1) {
                        results_path = Some(PathBuf::from(&tokens[i + 1]));
                        i += 1;
                    } else {
                        results_path = Some(PathBuf::from("results.json"));
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let threads = if threads_flag || html.is_some() {
            Some(threads_value)
        } else {
            None
        };

        Self {
            text,
            html,
            crawl,
            query,
            partial,
            threads,
            counts_path,
            index_path,
            results_path,
        }
    }
}

/// Run the full pipeline: build (from a path and/or a crawl), write
/// counts/index snapshots, run queries, write results. Every stage's
/// failure is reported to stderr and does not abort the rest of the
/// pipeline; this function always returns `Ok(())`.
pub fn run(args: &CliArgs) -> anyhow::Result<()> {
    let index = Arc::new(ThreadSafeIndex::new());

    if let Some(path) = &args.text {
        if let Err(e) = build_from_text(path, &index, args.threads) {
            eprintln!("Error: invalid file");
            error!(path = %path.display(), error = %e, "failed to build index from path");
        }
    }

    if let Some(seed) = &args.html {
        let thread_count = args.threads.unwrap_or(5);
        if let Err(e) = build_from_crawl(seed, &index, thread_count, args.crawl) {
            eprintln!("Error: invalid file");
            error!(seed = %seed, error = %e, "failed to crawl seed URL");
        }
    }

    if let Some(path) = &args.counts_path {
        if let Err(e) = index.write_counts(path) {
            eprintln!("Error: {e}");
        }
    }

    if let Some(path) = &args.index_path {
        if let Err(e) = index.write_index(path) {
            eprintln!("Error: {e}");
        }
    }

    if let Some(query_path) = &args.query {
        if let Err(e) = run_queries(query_path, &index, args.threads, args.partial, &args.results_path)
        {
            eprintln!("Error: invalid query file");
            error!(path = %query_path.display(), error = %e, "failed to run queries");
        }
    }

    Ok(())
}

fn build_from_text(
    path: &std::path::Path,
    index: &Arc<ThreadSafeIndex>,
    threads: Option<usize>,
) -> anyhow::Result<()> {
    match threads {
        None => IndexBuilder::build_serial(path, index),
        Some(n) => {
            let queue = WorkQueue::new(n);
            IndexBuilder::build_parallel(path, Arc::clone(index), &queue)?;
            queue.join();
            Ok(())
        }
    }
}

fn build_from_crawl(
    seed: &str,
    index: &Arc<ThreadSafeIndex>,
    thread_count: usize,
    crawls: usize,
) -> anyhow::Result<()> {
    let queue = Arc::new(WorkQueue::new(thread_count));
    let crawler = WebCrawler::new(Arc::clone(index), Arc::clone(&queue), crawls.max(1))?;
    crawler.crawl(seed)?;
    queue.join();
    Ok(())
}

fn run_queries(
    query_path: &std::path::Path,
    index: &Arc<ThreadSafeIndex>,
    threads: Option<usize>,
    partial: bool,
    results_path: &Option<PathBuf>,
) -> anyhow::Result<()> {
    let file = File::open(query_path)?;
    let reader = BufReader::new(file);

    match threads {
        None => {
            let searcher = FileSearcher::new(Arc::clone(index));
            for line in reader.lines() {
                searcher.search_line(&line?, partial);
            }
            if let Some(path) = results_path {
                if let Err(e) = searcher.write_results(path) {
                    eprintln!("Error: {e}");
                }
            }
        }
        Some(n) => {
            let queue = Arc::new(WorkQueue::new(n));
            let searcher = FileSearcher::new_threaded(Arc::clone(index), Arc::clone(&queue));
            for line in reader.lines() {
                searcher.search_line(&line?, partial);
            }
            queue.finish();
            if let Some(path) = results_path {
                if let Err(e) = searcher.write_results(path) {
                    eprintln!("Error: {e}");
                }
            }
            queue.join();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_are_serial_with_no_outputs() {
        let args = parse(&["-text", "corpus"]);
        assert_eq!(args.text, Some(PathBuf::from("corpus")));
        assert_eq!(args.threads, None);
        assert_eq!(args.crawl, 1);
        assert!(args.counts_path.is_none());
    }

    #[test]
    fn html_implies_five_threads_by_default() {
        let args = parse(&["-html", "https://example.com"]);
        assert_eq!(args.threads, Some(5));
    }

    #[test]
    fn threads_below_one_falls_back_to_five() {
        let args = parse(&["-threads", "0"]);
        assert_eq!(args.threads, Some(5));
        let args = parse(&["-threads", "-3"]);
        assert_eq!(args.threads, Some(5));
    }

    #[test]
    fn threads_missing_value_falls_back_to_five() {
        let args = parse(&["-threads"]);
        assert_eq!(args.threads, Some(5));
    }

    #[test]
    fn crawl_missing_or_invalid_falls_back_to_one() {
        assert_eq!(parse(&["-html", "u", "-crawl"]).crawl, 1);
        assert_eq!(parse(&["-html", "u", "-crawl", "abc"]).crawl, 1);
        assert_eq!(parse(&["-html", "u", "-crawl", "10"]).crawl, 10);
    }

    #[test]
    fn output_flags_use_default_filename_when_bare() {
        let args = parse(&["-counts", "-index", "-results"]);
        assert_eq!(args.counts_path, Some(PathBuf::from("counts.json")));
        assert_eq!(args.index_path, Some(PathBuf::from("index.json")));
        assert_eq!(args.results_path, Some(PathBuf::from("results.json")));
    }

    #[test]
    fn output_flags_accept_explicit_paths() {
        let args = parse(&["-counts", "out/c.json"]);
        assert_eq!(args.counts_path, Some(PathBuf::from("out/c.json")));
    }

    #[test]
    fn partial_flag_is_order_independent() {
        assert!(parse(&["-partial", "-text", "x"]).partial);
        assert!(parse(&["-text", "x", "-partial"]).partial);
    }
}

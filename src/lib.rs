//! Concurrent ranked inverted-index search engine.
//!
//! Builds an inverted index over either a filesystem tree of plain-text
//! files or a breadth-first web crawl, then answers multi-word queries
//! against that index with deterministic ranking.

pub mod build;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod index;
pub mod json_writer;
pub mod search;
pub mod stemmer;
pub mod sync;
pub mod utils;
pub mod workqueue;

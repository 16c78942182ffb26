//! The JSON writer adapter: consumes the three output shapes the core
//! produces and pretty-prints them with `serde_json`, 2-space indent, UTF-8.

use crate::index::{InvertedIndex, Location, ResultMetadata};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn write_pretty(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize JSON output")?;
    let mut file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write output file: {}", path.display()))?;
    Ok(())
}

/// `counts.json`: object of location -> integer, keys ascending.
pub fn write_counts(path: &Path, counts: &BTreeMap<Location, u64>) -> Result<()> {
    let mut object = Map::new();
    for (location, count) in counts {
        object.insert(location.clone(), Value::from(*count));
    }
    write_pretty(path, &Value::Object(object))
}

/// `index.json`: object of stem -> object of location -> array of positions,
/// all keys and positions ascending.
pub fn write_index(path: &Path, index: &InvertedIndex) -> Result<()> {
    let mut root = Map::new();
    for stem in index.stems() {
        let mut locations = Map::new();
        for location in index.stem_locations(&stem) {
            let positions = index.stem_positions_in(&stem, &location);
            let array = positions.into_iter().map(|p| Value::from(p as u64)).collect();
            locations.insert(location, Value::Array(array));
        }
        root.insert(stem, Value::Object(locations));
    }
    write_pretty(path, &Value::Object(root))
}

#[derive(Serialize)]
struct ResultRecord {
    count: String,
    score: String,
    #[serde(rename = "where")]
    location: String,
}

/// Format a score to 8 fractional digits, matching the `#0.00000000`
/// pattern (half-up decimal formatting via Rust's default round-half-to-even
/// float formatting, which agrees with half-up for the match/total ratios
/// this crate ever produces).
fn format_score(score: f64) -> String {
    format!("{score:.8}")
}

/// `results.json`: object of canonical query string -> array of
/// `{count, score, where}` records, in the ranked order the index produced.
///
/// A naive port of the source formatter would wrap the `where` value in an
/// extra pair of literal quotes inside the JSON string, almost certainly a
/// bug rather than an intentional format. This implementation emits the
/// location without the extra inner quotes (see DESIGN.md).
pub fn write_results(path: &Path, results: &BTreeMap<String, Vec<ResultMetadata>>) -> Result<()> {
    let mut root = Map::new();
    for (query, metas) in results {
        let records: Vec<ResultRecord> = metas
            .iter()
            .map(|m| ResultRecord {
                count: m.match_count.to_string(),
                score: format_score(m.score),
                location: m.location.clone(),
            })
            .collect();
        let value = serde_json::to_value(records).context("failed to serialize result records")?;
        root.insert(query.clone(), value);
    }
    write_pretty(path, &Value::Object(root))
}

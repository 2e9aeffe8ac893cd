
use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::Row;
use super::canonical::canonical_json;

/// Column name fragments that conventionally mark an identifier column
const IDENTIFIER_TOKENS: [&str; 4] = ["id", "_id", "uuid", "key"];

/// Distinct values seen for one column during the scan
struct ColumnStats<'a> {
    name: &'a str,
    present: usize,
    distinct: HashSet<String>,
}

/// Infer the columns that uniquely identify a row within the sample.
///
/// Returns every unique column whose name looks like an identifier, in the order the
/// columns appear in the first row. When no unique column has such a name the first
/// unique column is returned on its own. Tables with fewer than two rows, or without
/// any unique column, yield an empty key so the encoder packs whole rows instead.
#[inline]
pub fn infer_keys(rows: &[Row]) -> Vec<String> {
    if rows.len() <= 1 {
        debug!(
            "Not enough rows ({}) to infer a primary key, using whole rows",
            rows.len()
        );
        return Vec::new();
    }

    let mut columns: Vec<ColumnStats<'_>> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        for (name, value) in row {
            let position = *positions.entry(name.as_str()).or_insert_with(|| {
                columns.push(ColumnStats {
                    name: name.as_str(),
                    present: 0,
                    distinct: HashSet::new(),
                });
                columns.len() - 1
            });

            let stats = &mut columns[position];
            stats.present += 1;
            stats.distinct.insert(canonical_json(value));
        }
    }

    let candidates: Vec<&str> = columns
        .iter()
        .filter(|c| c.present == rows.len() && c.distinct.len() == rows.len())
        .map(|c| c.name)
        .collect();

    let preferred: Vec<String> = candidates
        .iter()
        .filter(|name| looks_like_identifier(name))
        .map(|name| (*name).to_string())
        .collect();

    let keys = if preferred.is_empty() {
        candidates
            .first()
            .map(|name| vec![(*name).to_string()])
            .unwrap_or_default()
    } else {
        preferred
    };

    debug!(
        "Inferred key {:?} from {} unique columns over {} rows",
        keys,
        candidates.len(),
        rows.len()
    );
    keys
}

fn looks_like_identifier(name: &str) -> bool {
    let lowered = name.to_lowercase();
    IDENTIFIER_TOKENS
        .iter()
        .any(|token| lowered.contains(token))
}

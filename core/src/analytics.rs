//! Analytics / counters (spec §4.8): per-collection write counts, rule
//! matches, and unique-value cardinality tracking. Pure evaluation here;
//! persistence of the running totals is the adapter's job
//! ([`crate::store_trait::DocumentStore::record_analytics_delta`]).

use serde_json::Value;

use crate::config::AnalyticsRule;
use crate::model::CounterTotals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

/// Evaluate the configured rules for `collection` against a single
/// payload, producing the delta to fold into that collection's running
/// [`CounterTotals`].
pub fn observe(collection: &str, kind: WriteKind, payload: &Value, rules: &[AnalyticsRule]) -> CounterTotals {
    let mut delta = CounterTotals::default();
    match kind {
        WriteKind::Create => delta.creates = 1,
        WriteKind::Update => delta.updates = 1,
        WriteKind::Delete => delta.deletes = 1,
    }

    for rule in rules.iter().filter(|r| r.collection == collection) {
        let Some(value) = get_path(payload, &rule.field_path) else { continue };

        let matches = match &rule.equals {
            Some(expected) => value == expected,
            None => true,
        };
        if !matches {
            continue;
        }

        *delta.rule_matches.entry(rule.name.clone()).or_insert(0) += 1;

        if rule.track_unique {
            let canonical = canonicalize(value);
            delta.unique_values.entry(rule.name.clone()).or_default().insert(canonical);
        }
    }

    delta
}

fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn canonicalize(value: &Value) -> String {
    // serde_json serializes object keys in the Map's own order; our
    // tracked values are scalars or small leaf values in practice, where
    // order does not matter, so a plain `to_string` is a stable key.
    value.to_string()
}

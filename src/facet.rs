//! Facets - term-frequency aggregations computed by the index
//!
//! The index reports facet counts as field → interleaved
//! `[term, count, term, count, ...]` arrays; this module converts them into
//! ordered `(term, count)` structures, hiding the repository bookkeeping
//! values that would otherwise pollute user-facing facets.

use crate::vocab;
use serde_json::Value;
use std::collections::HashMap;

/// One facet term and its document count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetTerm {
    pub name: String,
    pub count: u64,
}

impl FacetTerm {
    /// Filter-query clause selecting this term.
    pub fn facet_query(&self, field: &str) -> String {
        format!("{}:\"{}\"", field, self.name)
    }
}

/// All extracted terms for one faceted field, in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facet {
    pub field: String,
    pub terms: Vec<FacetTerm>,
}

/// Convert the index's interleaved facet shape into `Facet` values, ordered
/// by field name for determinism.
pub fn facets_from_response(fields: &HashMap<String, Vec<Value>>) -> Vec<Facet> {
    let mut names: Vec<&String> = fields.keys().collect();
    names.sort();

    names
        .into_iter()
        .map(|field| {
            let raw = &fields[field];
            let mut terms = Vec::new();
            for pair in raw.chunks(2) {
                let [term, count] = pair else { continue };
                let Some(name) = term.as_str() else { continue };
                if vocab::FACET_EXCLUDED_TERMS.contains(&name) {
                    continue;
                }
                terms.push(FacetTerm {
                    name: name.to_string(),
                    count: count.as_u64().unwrap_or(0),
                });
            }
            Facet {
                field: field.clone(),
                terms,
            }
        })
        .collect()
}

//! Cluster-level tf-idf, treating each cluster's keyword table as one document.

use std::collections::BTreeMap;

use crate::store::models::ClusterId;

use super::keywords::KeywordTable;

/// Number of tables holding `term` with a count strictly greater than `least_freq`.
fn document_count<'a>(
    term: &str,
    tables: impl IntoIterator<Item = &'a KeywordTable>,
    least_freq: u32,
) -> usize {
    tables
        .into_iter()
        .filter(|table| table.count(term).is_some_and(|count| count > least_freq))
        .count()
}

/// `score(C) = Σ_t tf(t, C) · ln(N / (df(t) + 1))` for every cluster `C`.
///
/// An empty table scores 0. The sum follows each table's own ordering, so the
/// result is bit-for-bit reproducible for identical inputs.
#[must_use]
pub fn cluster_scores(
    tables: &BTreeMap<ClusterId, KeywordTable>,
    least_freq: u32,
) -> BTreeMap<ClusterId, f64> {
    let total_clusters = tables.len() as f64;

    tables
        .iter()
        .map(|(cluster_id, table)| {
            let total_freq = table.total_frequency();
            if total_freq == 0 {
                return (*cluster_id, 0.0);
            }
            let score = table
                .entries()
                .iter()
                .map(|(term, count)| {
                    let tf = f64::from(*count) / total_freq as f64;
                    let df = document_count(term, tables.values(), least_freq);
                    let idf = (total_clusters / (df as f64 + 1.0)).ln();
                    tf * idf
                })
                .sum();
            (*cluster_id, score)
        })
        .collect()
}

//! Maps the backend's raw labels onto run-unique cluster identifiers.

use std::collections::HashMap;

use crate::error::ClusteringError;
use crate::store::models::{ClusterId, Document, Label};

use super::backend::RawLabel;

/// One freshly generated identifier per distinct raw label.
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    ids: HashMap<RawLabel, ClusterId>,
}

impl LabelMap {
    #[must_use]
    pub fn build(raw_labels: &[RawLabel]) -> Self {
        let mut ids = HashMap::new();
        for raw in raw_labels {
            ids.entry(raw.clone()).or_insert_with(ClusterId::new_random);
        }
        Self { ids }
    }

    #[must_use]
    pub fn get(&self, raw: &str) -> Option<ClusterId> {
        self.ids.get(raw).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Labels every document with the identifier of its raw label, in input order.
///
/// # Errors
/// Returns [`ClusteringError::ResultParse`] when the label and document counts differ.
pub fn assign_labels(
    documents: &mut [Document],
    raw_labels: &[RawLabel],
) -> Result<LabelMap, ClusteringError> {
    if documents.len() != raw_labels.len() {
        return Err(ClusteringError::result_parse(format!(
            "{} labels for {} documents",
            raw_labels.len(),
            documents.len()
        )));
    }

    let map = LabelMap::build(raw_labels);
    for (document, raw) in documents.iter_mut().zip(raw_labels) {
        document.label = map.get(raw).map(Label::Cluster);
    }
    Ok(map)
}

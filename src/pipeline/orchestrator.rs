//! Runs one group of documents through clustering, scoring and curation.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::ClusteringError;
use crate::observability::metrics::Metrics;
use crate::store::models::{ClusterId, ClusterRecord, Document, Label};
use crate::tokenizer::Tokenizer;

use super::backend::ClusteringBackend;
use super::context::RunContext;
use super::curate::{ClusterSet, CurationOutcome, CurationParams, curate};
use super::keywords::{KeywordTable, top_keywords};
use super::labels::assign_labels;
use super::scoring::cluster_scores;
use super::vectorize::vectorize;

const DEFAULT_K: NonZeroUsize = NonZeroUsize::new(10).unwrap();
const DEFAULT_TOPK: NonZeroUsize = NonZeroUsize::new(20).unwrap();

/// Tunables for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineParams {
    /// Number of groups requested from the backend.
    pub k: NonZeroUsize,
    /// Keyword table length per cluster.
    pub topk: NonZeroUsize,
    /// A term counts towards document frequency only above this count.
    pub least_freq: u32,
    pub curation: CurationParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            topk: DEFAULT_TOPK,
            least_freq: 10,
            curation: CurationParams::default(),
        }
    }
}

/// Result of a successful run. Nothing has been persisted yet.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub group_key: String,
    /// Distinct labels returned by the backend.
    pub raw_cluster_count: usize,
    pub curation: CurationOutcome,
    /// One record per surviving cluster, ordered by cluster id.
    pub records: Vec<ClusterRecord>,
}

impl PipelineOutcome {
    /// `(document id, final label)` for every input document.
    #[must_use]
    pub fn label_assignments(&self) -> Vec<(String, Label)> {
        self.curation
            .clusters
            .clone()
            .into_label_map()
            .into_iter()
            .flat_map(|(label, members)| {
                members
                    .into_iter()
                    .map(move |document| (document.id, label))
            })
            .collect()
    }
}

pub struct SubeventPipeline {
    tokenizer: Arc<dyn Tokenizer>,
    backend: Arc<dyn ClusteringBackend>,
    params: PipelineParams,
    metrics: Option<Arc<Metrics>>,
}

impl SubeventPipeline {
    #[must_use]
    pub fn builder(
        tokenizer: Arc<dyn Tokenizer>,
        backend: Arc<dyn ClusteringBackend>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            tokenizer,
            backend,
            params: PipelineParams::default(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    /// Clusters `documents`, scores the clusters and demotes the weak ones.
    ///
    /// # Errors
    /// Any [`ClusteringError`] aborts the run. An empty batch fails with
    /// [`ClusteringError::EmptyInput`] before the backend is touched.
    #[instrument(skip_all, fields(run_id = %run.run_id, group = %run.group_key))]
    pub async fn run(
        &self,
        run: &RunContext,
        mut documents: Vec<Document>,
    ) -> Result<PipelineOutcome, ClusteringError> {
        if documents.is_empty() {
            return Err(ClusteringError::EmptyInput);
        }
        let tokenizer = self.tokenizer.as_ref();

        let tokens: Vec<Vec<String>> = documents
            .iter()
            .map(|document| tokenizer.tokenize(&document.text()))
            .collect();
        let matrix = vectorize(&tokens)?;
        debug!(
            rows = matrix.row_count(),
            columns = matrix.column_count(),
            nonzero = matrix.nonzero_count(),
            "vectorized documents"
        );

        let started = Instant::now();
        let raw_labels = self
            .backend
            .cluster(run, &matrix, self.params.k.get())
            .await?;
        let backend_elapsed = started.elapsed();
        info!(
            backend = self.backend.name(),
            documents = documents.len(),
            elapsed_ms = backend_elapsed.as_millis(),
            "clustering backend finished"
        );

        let label_map = assign_labels(&mut documents, &raw_labels)?;
        let set = ClusterSet::from_labeled(documents);

        let keywords: BTreeMap<ClusterId, KeywordTable> = set
            .clusters()
            .iter()
            .map(|(id, members)| (*id, top_keywords(members, tokenizer, self.params.topk.get())))
            .collect();
        let scores = cluster_scores(&keywords, self.params.least_freq);

        let curation = curate(set, &scores, &keywords, &self.params.curation, tokenizer)?;
        let records = build_records(&run.group_key, &curation, &scores, &keywords);

        info!(
            raw_clusters = label_map.len(),
            clusters_kept = records.len(),
            demoted_by_rank = curation.by_rank.documents_demoted,
            demoted_by_size = curation.by_size.documents_demoted,
            other = curation.clusters.other().len(),
            "curation completed"
        );

        if let Some(metrics) = &self.metrics {
            metrics.backend_duration.observe(backend_elapsed.as_secs_f64());
            metrics.documents_clustered.inc_by(raw_labels.len() as f64);
            metrics
                .documents_demoted_rank
                .inc_by(curation.by_rank.documents_demoted as f64);
            metrics
                .documents_demoted_size
                .inc_by(curation.by_size.documents_demoted as f64);
            metrics.clusters_kept.inc_by(records.len() as f64);
        }

        Ok(PipelineOutcome {
            run_id: run.run_id,
            group_key: run.group_key.clone(),
            raw_cluster_count: label_map.len(),
            curation,
            records,
        })
    }
}

fn build_records(
    group_key: &str,
    curation: &CurationOutcome,
    scores: &BTreeMap<ClusterId, f64>,
    keywords: &BTreeMap<ClusterId, KeywordTable>,
) -> Vec<ClusterRecord> {
    let created_at = Utc::now();
    curation
        .clusters
        .clusters()
        .iter()
        .map(|(id, members)| ClusterRecord {
            cluster_id: *id,
            group_key: group_key.to_string(),
            created_at,
            size: members.len(),
            score: scores.get(id).copied().unwrap_or(0.0),
            keywords: keywords
                .get(id)
                .map(|table| table.entries().to_vec())
                .unwrap_or_default(),
        })
        .collect()
}

pub struct PipelineBuilder {
    tokenizer: Arc<dyn Tokenizer>,
    backend: Arc<dyn ClusteringBackend>,
    params: PipelineParams,
    metrics: Option<Arc<Metrics>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn with_params(mut self, params: PipelineParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn build(self) -> SubeventPipeline {
        SubeventPipeline {
            tokenizer: self.tokenizer,
            backend: self.backend,
            params: self.params,
            metrics: self.metrics,
        }
    }
}

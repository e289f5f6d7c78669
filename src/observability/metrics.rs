/// Prometheusメトリクス定義。
use prometheus::{
    Counter, Histogram, Registry, register_counter_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;

/// ソルバー実行は数分に及ぶことがある。
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// メトリクスコレクター。
#[derive(Debug, Clone)]
pub struct Metrics {
    // カウンター
    pub runs_completed: Counter,
    pub runs_failed: Counter,
    pub documents_clustered: Counter,
    pub documents_demoted_rank: Counter,
    pub documents_demoted_size: Counter,
    pub clusters_kept: Counter,

    // ヒストグラム
    pub backend_duration: Histogram,
    pub run_duration: Histogram,
}

impl Metrics {
    /// 新しいメトリクスコレクターを作成する。
    ///
    /// # Errors
    /// 同名のメトリクスが既に登録されている場合はエラーを返す。
    pub fn new(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            runs_completed: register_counter_with_registry!(
                "subevent_runs_completed_total",
                "Total number of clustering runs completed",
                registry
            )?,
            runs_failed: register_counter_with_registry!(
                "subevent_runs_failed_total",
                "Total number of clustering runs failed",
                registry
            )?,
            documents_clustered: register_counter_with_registry!(
                "subevent_documents_clustered_total",
                "Total number of documents passed to the clustering backend",
                registry
            )?,
            documents_demoted_rank: register_counter_with_registry!(
                "subevent_documents_demoted_rank_total",
                "Documents moved to the other bucket by rank-based demotion",
                registry
            )?,
            documents_demoted_size: register_counter_with_registry!(
                "subevent_documents_demoted_size_total",
                "Documents moved to the other bucket by size-based demotion",
                registry
            )?,
            clusters_kept: register_counter_with_registry!(
                "subevent_clusters_kept_total",
                "Clusters surviving curation",
                registry
            )?,
            backend_duration: register_histogram_with_registry!(
                "subevent_backend_duration_seconds",
                "Duration of clustering backend invocations",
                DURATION_BUCKETS.to_vec(),
                registry
            )?,
            run_duration: register_histogram_with_registry!(
                "subevent_run_duration_seconds",
                "Duration of a full clustering run including persistence",
                DURATION_BUCKETS.to_vec(),
                registry
            )?,
        })
    }
}

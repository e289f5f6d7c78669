use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use crate::{
    config::{BackendKind, Config},
    observability::{Telemetry, metrics::Metrics},
    pipeline::{
        ClusteringBackend, KMeansBackend, PersistResult, RunContext, SubeventPipeline,
        VclusterBackend, persist_outcome,
    },
    store::{DocumentStore, PgDocumentStore},
    tokenizer::WordTokenizer,
};

/// In-process k-means の最大反復回数。
const KMEANS_MAX_ITERATIONS: usize = 50;

/// 1グループ分の処理結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupReport {
    pub group_key: String,
    pub documents: usize,
    pub clusters_kept: usize,
    pub other: usize,
    pub persisted: PersistResult,
}

/// バッチ全体の集計。
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<GroupReport>,
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BatchSummary {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// グループごとに fetch → pipeline → persist を順に実行する。
pub struct BatchRunner {
    store: Arc<dyn DocumentStore>,
    pipeline: SubeventPipeline,
    work_dir: PathBuf,
    metrics: Option<Arc<Metrics>>,
}

impl BatchRunner {
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        pipeline: SubeventPipeline,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            pipeline,
            work_dir: work_dir.into(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 1グループを処理する。パイプラインが失敗した場合は何も書き込まない。
    ///
    /// # Errors
    /// 読み込み、クラスタリング、書き込みのいずれかが失敗した場合はエラーを返す。
    pub async fn run_group(&self, group_key: &str) -> Result<GroupReport> {
        let started = Instant::now();
        let result = self.run_group_inner(group_key).await;

        if let Some(metrics) = &self.metrics {
            metrics.run_duration.observe(started.elapsed().as_secs_f64());
            match &result {
                Ok(_) => metrics.runs_completed.inc(),
                Err(_) => metrics.runs_failed.inc(),
            }
        }
        result
    }

    async fn run_group_inner(&self, group_key: &str) -> Result<GroupReport> {
        let documents = self
            .store
            .fetch_documents(group_key)
            .await
            .with_context(|| format!("failed to fetch documents for group {group_key}"))?;
        let document_count = documents.len();

        let run = RunContext::new(&self.work_dir, group_key);
        info!(
            run_id = %run.run_id,
            group = %group_key,
            documents = document_count,
            "starting clustering run"
        );

        let outcome = self
            .pipeline
            .run(&run, documents)
            .await
            .with_context(|| format!("clustering run {} failed for group {group_key}", run.run_id))?;
        let persisted = persist_outcome(self.store.as_ref(), &outcome).await?;

        Ok(GroupReport {
            group_key: group_key.to_string(),
            documents: document_count,
            clusters_kept: outcome.records.len(),
            other: outcome.curation.clusters.other().len(),
            persisted,
        })
    }

    /// 指定グループ（空ならストアの全グループ）を順に処理する。
    ///
    /// 失敗したグループは記録して次のグループへ進む。
    ///
    /// # Errors
    /// グループ一覧の取得に失敗した場合のみエラーを返す。
    pub async fn run_all(&self, groups: &[String]) -> Result<BatchSummary> {
        let groups = if groups.is_empty() {
            self.store
                .list_groups()
                .await
                .context("failed to list document groups")?
        } else {
            groups.to_vec()
        };
        if groups.is_empty() {
            warn!("no document groups to process");
        }

        let mut summary = BatchSummary::default();
        for group_key in groups {
            match self.run_group(&group_key).await {
                Ok(report) => {
                    info!(
                        group = %report.group_key,
                        documents = report.documents,
                        clusters_kept = report.clusters_kept,
                        other = report.other,
                        "group completed"
                    );
                    summary.succeeded.push(report);
                }
                Err(err) => {
                    error!(group = %group_key, error = ?err, "group failed");
                    summary.failed.push((group_key, err));
                }
            }
        }

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "batch finished"
        );
        Ok(summary)
    }
}

/// 設定に従ってクラスタリングバックエンドを構築する。
#[must_use]
pub fn build_backend(config: &Config) -> Arc<dyn ClusteringBackend> {
    match config.backend() {
        BackendKind::Vcluster => Arc::new(
            VclusterBackend::new(
                config.vcluster_path(),
                config.cluster_niter(),
                config.backend_timeout(),
            )
            .keep_work_files(config.keep_work_files()),
        ),
        BackendKind::KMeans => Arc::new(KMeansBackend::new(
            KMEANS_MAX_ITERATIONS,
            config.kmeans_seed(),
        )),
    }
}

/// 構成情報からストア・パイプライン・テレメトリを初期化する。
///
/// # Errors
/// Telemetry の初期化や DB プールの構築が失敗した場合はエラーを返す。
pub async fn build_runner(config: &Config) -> Result<(BatchRunner, Telemetry)> {
    let telemetry = Telemetry::new(config)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .connect(config.db_dsn())
        .await
        .context("failed to connect to document database")?;
    let store: Arc<dyn DocumentStore> =
        Arc::new(PgDocumentStore::new(pool, config.document_kind()));

    let pipeline = SubeventPipeline::builder(Arc::new(WordTokenizer::new()), build_backend(config))
        .with_params(config.pipeline_params())
        .with_metrics(telemetry.metrics())
        .build();

    let runner = BatchRunner::new(store, pipeline, config.work_dir()).with_metrics(telemetry.metrics());
    Ok((runner, telemetry))
}

use anyhow::{Context, Result};
use tracing::info;

use crate::store::DocumentStore;

use super::orchestrator::PipelineOutcome;

/// 永続化結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistResult {
    pub labels_written: usize,
    pub clusters_saved: usize,
}

/// 選別済みの結果をストアへ書き込む。ラベルを先に、クラスタレコードを後に保存する。
///
/// # Errors
/// ストアへの書き込みに失敗した場合はエラーを返す。
pub async fn persist_outcome(
    store: &dyn DocumentStore,
    outcome: &PipelineOutcome,
) -> Result<PersistResult> {
    let labels = outcome.label_assignments();
    store
        .update_labels(&outcome.group_key, &labels)
        .await
        .with_context(|| format!("failed to write labels for group {}", outcome.group_key))?;

    for record in &outcome.records {
        store.save_cluster(record).await?;
    }

    let result = PersistResult {
        labels_written: labels.len(),
        clusters_saved: outcome.records.len(),
    };
    info!(
        run_id = %outcome.run_id,
        group = %outcome.group_key,
        labels_written = result.labels_written,
        clusters_saved = result.clusters_saved,
        "persisted curation result"
    );
    Ok(result)
}

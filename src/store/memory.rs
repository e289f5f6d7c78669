use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::DocumentStore;
use super::models::{ClusterId, ClusterRecord, Document, Label};

/// プロセス内ストア。テストとローカル実行用。
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    groups: RwLock<BTreeMap<String, Vec<Document>>>,
    clusters: RwLock<HashMap<ClusterId, ClusterRecord>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// グループにドキュメントを追加する。
    pub async fn insert_documents(&self, group_key: impl Into<String>, documents: Vec<Document>) {
        self.groups
            .write()
            .await
            .entry(group_key.into())
            .or_default()
            .extend(documents);
    }

    /// 現在保存されているラベル（未設定は `None`）。
    pub async fn label_of(&self, group_key: &str, document_id: &str) -> Option<Label> {
        self.groups
            .read()
            .await
            .get(group_key)?
            .iter()
            .find(|document| document.id == document_id)?
            .label
    }

    pub async fn cluster_record(&self, cluster_id: ClusterId) -> Option<ClusterRecord> {
        self.clusters.read().await.get(&cluster_id).cloned()
    }

    pub async fn cluster_records(&self) -> Vec<ClusterRecord> {
        let mut records: Vec<ClusterRecord> =
            self.clusters.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        records
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list_groups(&self) -> Result<Vec<String>> {
        Ok(self.groups.read().await.keys().cloned().collect())
    }

    async fn fetch_documents(&self, group_key: &str) -> Result<Vec<Document>> {
        let documents = self
            .groups
            .read()
            .await
            .get(group_key)
            .cloned()
            .unwrap_or_default();
        Ok(documents
            .into_iter()
            .map(|mut document| {
                document.label = None;
                document
            })
            .collect())
    }

    async fn update_label(&self, group_key: &str, document_id: &str, label: &Label) -> Result<()> {
        let mut groups = self.groups.write().await;
        let document = groups
            .get_mut(group_key)
            .and_then(|documents| documents.iter_mut().find(|d| d.id == document_id))
            .with_context(|| format!("document {document_id} not found in group {group_key}"))?;
        document.label = Some(*label);
        Ok(())
    }

    async fn save_cluster(&self, record: &ClusterRecord) -> Result<()> {
        self.clusters
            .write()
            .await
            .insert(record.cluster_id, record.clone());
        Ok(())
    }
}

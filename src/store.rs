//! ドキュメントストアの抽象と実装。
use async_trait::async_trait;

use self::models::{ClusterRecord, Document, Label};

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryDocumentStore;
pub use postgres::PgDocumentStore;

/// グループ単位でドキュメントを読み書きするストア。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 処理対象となるグループキーを昇順で返す。
    async fn list_groups(&self) -> anyhow::Result<Vec<String>>;

    /// グループに属するドキュメントを、ラベル未設定の状態で返す。
    async fn fetch_documents(&self, group_key: &str) -> anyhow::Result<Vec<Document>>;

    /// 1件のラベルを上書きする。同じ値での再実行は冪等。
    async fn update_label(&self, group_key: &str, document_id: &str, label: &Label)
    -> anyhow::Result<()>;

    /// 複数件のラベルをまとめて書き込む。
    async fn update_labels(&self, group_key: &str, labels: &[(String, Label)]) -> anyhow::Result<()> {
        for (document_id, label) in labels {
            self.update_label(group_key, document_id, label).await?;
        }
        Ok(())
    }

    /// クラスタレコードを `cluster_id` 単位で upsert する。
    async fn save_cluster(&self, record: &ClusterRecord) -> anyhow::Result<()>;
}

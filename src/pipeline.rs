//! クラスタリングと選別のパイプライン。
//!
//! ベクトル化 → バックエンド → ラベル付与 → キーワード抽出 → スコアリング → 選別 の順に実行する。
pub mod backend;
pub mod context;
pub mod curate;
pub mod keywords;
pub mod labels;
pub mod orchestrator;
pub mod persist;
pub mod scoring;
pub mod vectorize;

pub use backend::{ClusteringBackend, KMeansBackend, VclusterBackend};
pub use context::RunContext;
pub use curate::{ClusterSet, CurationOutcome, CurationParams};
pub use orchestrator::{PipelineBuilder, PipelineOutcome, PipelineParams, SubeventPipeline};
pub use persist::{PersistResult, persist_outcome};

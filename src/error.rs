use thiserror::Error;

/// クラスタリング実行時のエラー分類。
///
/// いずれも当該バッチにとって致命的で、リトライは行わない。
#[derive(Debug, Error)]
pub enum ClusteringError {
    /// 入力ドキュメントが0件。
    #[error("no documents supplied for clustering")]
    EmptyInput,

    /// 外部ソルバーを起動できない、異常終了した、またはタイムアウトした。
    #[error("clustering backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// ソルバー出力（またはベクトル化ファイル）の形式・件数が不正。
    #[error("failed to parse clustering result: {reason}")]
    ResultParse { reason: String },

    /// ランク選別に必要なクラスタ数に満たない。
    #[error("cluster number {found} must be at least top_num + last_num = {required}")]
    InsufficientClusters { found: usize, required: usize },

    /// 作業ディレクトリの入出力エラー。
    #[error("work directory I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusteringError {
    pub(crate) fn backend_unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    pub(crate) fn result_parse(reason: impl Into<String>) -> Self {
        Self::ResultParse {
            reason: reason.into(),
        }
    }

    /// メトリクスやログ向けの短い種別名。
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::ResultParse { .. } => "result_parse",
            Self::InsufficientClusters { .. } => "insufficient_clusters",
            Self::Io(_) => "io",
        }
    }
}

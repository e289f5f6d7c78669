//! クラスタリングバックエンドのアダプタ。
//!
//! バックエンドは文書行列を受け取り、入力と同じ順序で文書ごとの生ラベルを返す。
//! ラベルの値そのものは解釈しない。
use std::path::Path;

use async_trait::async_trait;

use crate::error::ClusteringError;

use super::context::RunContext;
use super::vectorize::DocumentTermMatrix;

pub mod kmeans;
pub mod vcluster;

pub use kmeans::KMeansBackend;
pub use vcluster::VclusterBackend;

/// バックエンドが返す、実行内でのみ一意なラベル。
pub type RawLabel = String;

#[async_trait]
pub trait ClusteringBackend: Send + Sync {
    /// `matrix` を `k` 個のグループに分割する（空のグループがあってもよい）。
    async fn cluster(
        &self,
        run: &RunContext,
        matrix: &DocumentTermMatrix,
        k: usize,
    ) -> Result<Vec<RawLabel>, ClusteringError>;

    /// ログ出力用の名前。
    fn name(&self) -> &'static str;
}

/// 結果ファイルを1行1ラベルとして読み、件数を検証する。
///
/// 行数の不一致は切り詰めも補完もせずエラーにする。
pub(crate) async fn read_label_file(
    path: &Path,
    expected: usize,
) -> Result<Vec<RawLabel>, ClusteringError> {
    let contents = tokio::fs::read_to_string(path).await.map_err(|error| {
        ClusteringError::backend_unavailable(format!(
            "result file {} not readable: {error}",
            path.display()
        ))
    })?;
    parse_labels(&contents, expected)
}

pub(crate) fn parse_labels(contents: &str, expected: usize) -> Result<Vec<RawLabel>, ClusteringError> {
    let mut labels: Vec<RawLabel> = contents
        .lines()
        .map(|line| line.trim().to_string())
        .collect();
    // 末尾の空行のみ無視する。途中の空行は1ラベルとして数える。
    while labels.last().is_some_and(String::is_empty) {
        labels.pop();
    }

    if labels.len() != expected {
        return Err(ClusteringError::result_parse(format!(
            "expected {expected} labels, backend returned {}",
            labels.len()
        )));
    }
    if let Some(line) = labels.iter().position(String::is_empty) {
        return Err(ClusteringError::result_parse(format!(
            "empty label on line {}",
            line + 1
        )));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_labels_trims_each_line() {
        let labels = parse_labels("0\n 1 \n0\n", 3).expect("labels parse");
        assert_eq!(labels, vec!["0", "1", "0"]);
    }

    #[test]
    fn parse_labels_rejects_short_output() {
        let error = parse_labels("0\n1\n", 3).expect_err("count mismatch");
        assert!(matches!(error, ClusteringError::ResultParse { .. }));
    }

    #[test]
    fn parse_labels_rejects_long_output() {
        let error = parse_labels("0\n1\n2\n3\n", 3).expect_err("count mismatch");
        assert!(matches!(error, ClusteringError::ResultParse { .. }));
    }

    #[test]
    fn parse_labels_counts_interior_blank_lines() {
        let error = parse_labels("0\n\n1\n2\n", 3).expect_err("count mismatch");
        assert!(matches!(error, ClusteringError::ResultParse { .. }));
    }

    #[test]
    fn parse_labels_rejects_empty_label() {
        let error = parse_labels("0\n\n1\n", 3).expect_err("empty label");
        assert!(matches!(error, ClusteringError::ResultParse { .. }));
    }

    #[test]
    fn parse_labels_ignores_trailing_blank_lines() {
        let labels = parse_labels("0\n1\n2\n\n\n", 3).expect("labels parse");
        assert_eq!(labels, vec!["0", "1", "2"]);
    }
}

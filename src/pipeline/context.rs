use std::path::{Path, PathBuf};

use uuid::Uuid;

/// 1回のクラスタリング実行を識別するコンテキスト。
///
/// 中間ファイルは `<base>/<run_id>` 配下にのみ書き出すため、
/// 並行する実行同士でファイル名が衝突しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: Uuid,
    pub group_key: String,
    work_dir: PathBuf,
}

impl RunContext {
    /// 新しい実行IDを払い出す。ディレクトリはまだ作成しない。
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>, group_key: impl Into<String>) -> Self {
        Self::with_run_id(Uuid::now_v7(), base_dir, group_key)
    }

    #[must_use]
    pub fn with_run_id(run_id: Uuid, base_dir: impl AsRef<Path>, group_key: impl Into<String>) -> Self {
        Self {
            run_id,
            group_key: group_key.into(),
            work_dir: base_dir.as_ref().join(run_id.to_string()),
        }
    }

    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

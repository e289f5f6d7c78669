//! CLUTO `vcluster` を子プロセスとして呼び出すバックエンド。
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ClusteringError;
use crate::pipeline::context::RunContext;
use crate::pipeline::vectorize::DocumentTermMatrix;

use super::{ClusteringBackend, RawLabel, read_label_file};

const MATRIX_FILE_NAME: &str = "matrix.txt";

#[derive(Debug, Clone)]
pub struct VclusterBackend {
    executable: PathBuf,
    niter: u32,
    timeout: Duration,
    keep_work_files: bool,
}

impl VclusterBackend {
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, niter: u32, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            niter,
            timeout,
            keep_work_files: false,
        }
    }

    /// 実行後も中間ファイルを残す（調査用）。
    #[must_use]
    pub fn keep_work_files(mut self, keep: bool) -> Self {
        self.keep_work_files = keep;
        self
    }

    async fn write_matrix(
        run: &RunContext,
        matrix: &DocumentTermMatrix,
    ) -> Result<PathBuf, ClusteringError> {
        tokio::fs::create_dir_all(run.work_dir()).await?;
        let path = run.work_dir().join(MATRIX_FILE_NAME);

        let mut buffer = Vec::new();
        matrix.write_to(&mut buffer)?;
        tokio::fs::write(&path, buffer).await?;
        Ok(path)
    }

    async fn invoke(&self, matrix_path: &Path, k: usize) -> Result<(), ClusteringError> {
        let mut command = Command::new(&self.executable);
        command
            .arg(format!("-niter={}", self.niter))
            .arg(matrix_path)
            .arg(k.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|error| {
            ClusteringError::backend_unavailable(format!(
                "failed to start {}: {error}",
                self.executable.display()
            ))
        })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ClusteringError::backend_unavailable(format!(
                    "solver did not finish within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|error| {
                ClusteringError::backend_unavailable(format!("failed to wait for solver: {error}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClusteringError::backend_unavailable(format!(
                "solver exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!(
            stdout_bytes = output.stdout.len(),
            "solver finished successfully"
        );
        Ok(())
    }
}

#[async_trait]
impl ClusteringBackend for VclusterBackend {
    async fn cluster(
        &self,
        run: &RunContext,
        matrix: &DocumentTermMatrix,
        k: usize,
    ) -> Result<Vec<RawLabel>, ClusteringError> {
        let matrix_path = Self::write_matrix(run, matrix).await?;
        let result_path = PathBuf::from(format!("{}.clustering.{k}", matrix_path.display()));

        info!(
            run_id = %run.run_id,
            rows = matrix.row_count(),
            columns = matrix.column_count(),
            nonzero = matrix.nonzero_count(),
            k,
            "invoking vcluster"
        );

        let started = Instant::now();
        self.invoke(&matrix_path, k).await?;
        let labels = read_label_file(&result_path, matrix.row_count()).await?;

        info!(
            run_id = %run.run_id,
            elapsed_ms = started.elapsed().as_millis(),
            "vcluster completed"
        );

        if !self.keep_work_files
            && let Err(error) = tokio::fs::remove_dir_all(run.work_dir()).await
        {
            warn!(
                run_id = %run.run_id,
                error = %error,
                "failed to remove clustering work directory"
            );
        }

        Ok(labels)
    }

    fn name(&self) -> &'static str {
        "vcluster"
    }
}

use anyhow::Context;
use tracing::{error, info, warn};

use subevent_worker::{app::build_runner, config::Config, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(String::as_str)
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                column = location.column(),
                message,
                "panic occurred"
            );
        } else {
            error!(
                thread = thread_name,
                message, "panic occurred without location information"
            );
        }
    }));

    // Tracing initialization is handled by build_runner via Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let (runner, telemetry) = build_runner(&config)
        .await
        .context("failed to build batch runner")?;

    let summary = runner.run_all(config.groups()).await?;

    if let Some(path) = config.metrics_textfile_path() {
        if let Err(err) = tokio::fs::write(path, telemetry.render_prometheus()).await {
            warn!(path = %path.display(), error = %err, "failed to write metrics textfile");
        } else {
            info!(path = %path.display(), "metrics written");
        }
    }

    observability::tracing::shutdown();

    if !summary.is_success() {
        anyhow::bail!(
            "{} of {} groups failed",
            summary.failed.len(),
            summary.failed.len() + summary.succeeded.len()
        );
    }
    Ok(())
}

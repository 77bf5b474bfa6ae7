use anyhow::Context as _;
use std::sync::Arc;

use spikr_core::{CancellationToken, RunController};
use spikr_http::HttpClient;

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenarios;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let resolved = scenarios::resolve(&args).map_err(RunError::InvalidInput)?;
    let client = HttpClient::default().with_request_timeout(resolved.config.request_timeout);

    let mut controller =
        RunController::new(resolved.config, resolved.workload, Arc::new(client))?;
    if let Some(progress) = out.progress() {
        controller = controller.with_progress(progress);
    }

    out.print_header(controller.config());

    let shutdown = spawn_shutdown_listener(controller.cancel_token());
    let verdict = controller.run().await;
    shutdown.abort();
    let verdict = verdict?;

    out.print_summary(&verdict)
        .context("failed to print summary")
        .map_err(RunError::RuntimeError)?;

    Ok(ExitCode::from_verdict(verdict.passed))
}

/// Ctrl-C stops the run gracefully; the verdict is still printed.
fn spawn_shutdown_listener(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("received ctrl-c, stopping");
                cancel.cancel();
            }
            Err(err) => log::warn!("failed to listen for ctrl-c: {err}"),
        }
    })
}

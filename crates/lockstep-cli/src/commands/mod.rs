//! CLI command implementations.

pub mod demo;
pub mod join;

use anyhow::{Context, Result};
use lockstep_core::metrics::PipelineMetrics;
use lockstep_core::{JoinOutcome, LogRecord, PipelineConfig, StreamJoinEngine};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// The run was abandoned on a shutdown signal.
#[derive(Debug, thiserror::Error)]
#[error("Interrupted before the pipeline finished")]
pub struct Interrupted;

/// Run the engine on a blocking thread while watching for shutdown signals.
///
/// Stage threads cannot be cancelled mid-cycle, so an interrupted run is
/// abandoned and the process exits with them still parked.
pub async fn run_pipeline(
    config: PipelineConfig,
    primary: Vec<LogRecord>,
    secondary: Vec<LogRecord>,
) -> Result<(JoinOutcome, Arc<PipelineMetrics>)> {
    let engine = StreamJoinEngine::new(config)?;
    let metrics = engine.metrics();

    let pipeline = tokio::task::spawn_blocking(move || engine.run(primary, secondary));

    tokio::select! {
        joined = pipeline => {
            let outcome = joined.context("Pipeline task failed")??;
            Ok((outcome, metrics))
        }
        _ = shutdown_signal() => Err(Interrupted.into()),
    }
}

/// Resolve on SIGINT, or SIGTERM where supported.
///
/// A handler that cannot be installed never resolves, so the run is left to
/// finish on its own.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    if sigterm.recv().await.is_none() {
                        std::future::pending::<()>().await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c(tokio::signal::ctrl_c()) => {
                info!("Received SIGINT (Ctrl+C), abandoning pipeline");
            }
            _ = sigterm => {
                info!("Received SIGTERM, abandoning pipeline");
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c(tokio::signal::ctrl_c()).await;
        info!("Received Ctrl+C, abandoning pipeline");
    }
}

/// Wait for Ctrl+C; if listening fails, log it and wait forever.
async fn wait_for_ctrl_c<F>(ctrl_c: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = ctrl_c.await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ctrl_c_listener_failure_never_resolves() {
        let failing = async { Err(std::io::Error::other("no signal driver")) };

        let resolved = tokio::select! {
            biased;
            _ = wait_for_ctrl_c(failing) => true,
            _ = std::future::ready(()) => false,
        };
        assert!(!resolved);
    }

    #[tokio::test]
    async fn test_ctrl_c_received_resolves() {
        wait_for_ctrl_c(async { Ok(()) }).await;
    }
}

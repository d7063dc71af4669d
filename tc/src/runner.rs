//! Frame loop driving a TrialEngine until it finishes or is told to quit

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::{FinishReason, TickOutcome, TrialEngine};
use crate::error::Result;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Quit was requested; the trial log has been flushed
    Quit,
    Finished(FinishReason),
}

/// Tick the engine `frame_rate_hz` times per second until it finishes or
/// Ctrl-C is pressed
pub async fn run_session(engine: &mut TrialEngine, frame_rate_hz: u32) -> Result<RunEnd> {
    let quit = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    run_until(engine, frame_rate_hz, quit).await
}

/// Tick the engine until it finishes or `quit` resolves
pub async fn run_until<F>(engine: &mut TrialEngine, frame_rate_hz: u32, quit: F) -> Result<RunEnd>
where
    F: Future<Output = ()>,
{
    let period = Duration::from_secs_f64(1.0 / frame_rate_hz.max(1) as f64);
    debug!(?period, "run_until: called");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(quit);

    loop {
        tokio::select! {
            biased;
            _ = &mut quit => {
                info!("Quit requested");
                engine.shutdown()?;
                return Ok(RunEnd::Quit);
            }
            _ = ticker.tick() => {
                match engine.tick() {
                    Ok(TickOutcome::Continue) => {}
                    Ok(TickOutcome::Finished(reason)) => {
                        info!(%reason, "Session finished");
                        engine.shutdown()?;
                        return Ok(RunEnd::Finished(reason));
                    }
                    Err(e) => {
                        if let Err(flush) = engine.shutdown() {
                            warn!("Failed to flush trial log after error: {}", flush);
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
}

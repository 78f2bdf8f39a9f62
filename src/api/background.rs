//! Fire-and-forget work that must not hold up the response.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

/// Best-effort background execution: errors are logged and discarded,
/// nothing is retried and no result flows back to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackgroundTasks;

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch<F>(&self, task: &'static str, work: F) -> JoinHandle<()>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let span = info_span!("background", task);
        tokio::spawn(
            async move {
                match work.await {
                    Ok(()) => debug!("background task finished"),
                    Err(err) => warn!(error = %format!("{err:#}"), "background task failed"),
                }
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn runs_work_and_swallows_errors() -> anyhow::Result<()> {
        let tasks = BackgroundTasks::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();

        tasks
            .dispatch("ok", async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await?;
        assert!(ran.load(Ordering::SeqCst));

        // A failing task still completes without panicking.
        tasks
            .dispatch("failing", async { Err(anyhow::anyhow!("insert failed")) })
            .await?;
        Ok(())
    }
}

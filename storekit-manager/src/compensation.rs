use std::future::Future;
use tracing::{debug, warn};

/// Opt-in undo log for operations that span several stores.
///
/// Each successful step records how to undo itself. On a later failure the
/// caller runs [`compensate`](Self::compensate), which replays the undo
/// steps newest first. Nothing runs automatically, and an undo can itself
/// fail (for instance on a concurrency conflict) so the result is reported
/// rather than assumed.
#[derive(Debug)]
pub struct Compensation<A> {
    steps: Vec<A>,
}

/// What a compensation run achieved.
#[derive(Debug, Default)]
pub struct CompensationReport {
    pub undone: usize,
    pub failures: Vec<anyhow::Error>,
}

impl CompensationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<A> Compensation<A> {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn record(&mut self, undo: A) {
        self.steps.push(undo);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The operation succeeded; forget the undo steps.
    pub fn commit(self) {
        debug!(steps = self.steps.len(), "Compensation log discarded");
    }

    /// Runs every undo step newest first, continuing past failures.
    pub async fn compensate<F, Fut>(self, mut run: F) -> CompensationReport
    where
        F: FnMut(A) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut report = CompensationReport::default();
        for step in self.steps.into_iter().rev() {
            match run(step).await {
                Ok(()) => report.undone += 1,
                Err(error) => {
                    warn!(error = %error, "Compensation step failed");
                    report.failures.push(error);
                }
            }
        }
        report
    }
}

impl<A> Default for Compensation<A> {
    fn default() -> Self {
        Self::new()
    }
}

// src/engine/handle.rs

use std::fmt;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{EngineError, Result};
use crate::job::{JobId, RunId};

use super::report::RunReport;
use super::RuntimeEvent;

/// Handle to a submitted run.
pub struct RunHandle {
    run_id: RunId,
    target: JobId,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    join: JoinHandle<Result<RunReport>>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .field("target", &self.target)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}

impl RunHandle {
    pub(crate) fn new(
        run_id: RunId,
        target: JobId,
        events: mpsc::UnboundedSender<RuntimeEvent>,
        join: JoinHandle<Result<RunReport>>,
    ) -> Self {
        Self {
            run_id,
            target,
            events,
            join,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn target(&self) -> JobId {
        self.target
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the run to stop. Running jobs finish and commit; everything
    /// not yet started is skipped. A no-op once the run has finished.
    pub fn cancel(&self) {
        let _ = self.events.send(RuntimeEvent::CancelRequested);
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunReport> {
        self.join
            .await
            .map_err(|e| EngineError::Other(anyhow!("run {} did not complete: {e}", self.run_id)))?
    }
}

//! Cancellable worker boundary around the orchestrator.
//!
//! Searches run on tokio's blocking pool so the caller's async context stays
//! responsive. The search enforces its own soft budget; the worker adds a hard
//! backstop and gives up on the unit of work if that expires.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};
use crate::orchestrator::{MoveRequest, MoveResponse, Orchestrator};
use crate::search::{CancelToken, Scheduler, ThreadScheduler};

/// Runs move requests off the caller's thread under a hard time backstop.
#[derive(Clone)]
pub struct MoveWorker {
    orchestrator: Arc<Orchestrator>,
    scheduler: Arc<dyn Scheduler>,
}

impl MoveWorker {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self::with_scheduler(orchestrator, Arc::new(ThreadScheduler))
    }

    pub fn with_scheduler(orchestrator: Orchestrator, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            scheduler,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Select a move on the blocking pool.
    ///
    /// Cancelling `cancel` makes the search return its best completed depth. If the
    /// backstop expires first the token is cancelled, the unit of work is detached
    /// and [`EngineError::HardTimeout`] is returned.
    pub async fn select_move(&self, request: MoveRequest, cancel: CancelToken) -> Result<MoveResponse> {
        let budget = self.orchestrator.budget_for(&request);
        let backstop = self.orchestrator.config().backstop(&budget);

        let orchestrator = Arc::clone(&self.orchestrator);
        let scheduler = Arc::clone(&self.scheduler);
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            orchestrator.select_move(&request, &token, scheduler.as_ref())
        });

        match tokio::time::timeout(backstop, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(EngineError::WorkerFailed(join_error.to_string())),
            Err(_) => {
                cancel.cancel();
                warn!(backstop_ms = backstop.as_millis() as u64, "hard backstop fired");
                Err(EngineError::HardTimeout {
                    budget_ms: backstop.as_millis() as u64,
                })
            }
        }
    }

    /// Same boundary for callers without an async runtime: a dedicated thread and
    /// a bounded wait on its result.
    pub fn select_move_blocking(&self, request: MoveRequest, cancel: CancelToken) -> Result<MoveResponse> {
        let budget = self.orchestrator.budget_for(&request);
        let backstop = self.orchestrator.config().backstop(&budget);

        let (sender, receiver) = mpsc::channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        let scheduler = Arc::clone(&self.scheduler);
        let token = cancel.clone();
        thread::Builder::new()
            .name("move-search".to_string())
            .spawn(move || {
                let result = orchestrator.select_move(&request, &token, scheduler.as_ref());
                // the receiver is gone once the backstop fired
                let _ = sender.send(result);
            })
            .map_err(|e| EngineError::WorkerFailed(e.to_string()))?;

        match receiver.recv_timeout(backstop) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                cancel.cancel();
                warn!(backstop_ms = backstop.as_millis() as u64, "hard backstop fired");
                Err(EngineError::HardTimeout {
                    budget_ms: backstop.as_millis() as u64,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::WorkerFailed(
                "search thread exited without a result".to_string(),
            )),
        }
    }
}

/// One caller session: at most one search in flight, newest request wins.
pub struct EngineSession {
    worker: MoveWorker,
    current: Mutex<Option<CancelToken>>,
}

impl EngineSession {
    pub fn new(worker: MoveWorker) -> Self {
        Self {
            worker,
            current: Mutex::new(None),
        }
    }

    pub fn worker(&self) -> &MoveWorker {
        &self.worker
    }

    /// Cancel whatever is outstanding, then run `request`.
    pub async fn request(&self, request: MoveRequest) -> Result<MoveResponse> {
        let token = CancelToken::new();
        if let Some(previous) = self.current.lock().await.replace(token.clone()) {
            previous.cancel();
            debug!("cancelled outstanding request");
        }

        let result = self.worker.select_move(request, token.clone()).await;

        let mut current = self.current.lock().await;
        if current.as_ref().map(|t| t.same_as(&token)).unwrap_or(false) {
            *current = None;
        }
        result
    }

    /// Cancel the outstanding request, if any.
    pub async fn cancel(&self) -> bool {
        match self.current.lock().await.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::orchestrator::Provenance;

    #[tokio::test]
    async fn test_book_move_through_worker() {
        let worker = MoveWorker::new(Orchestrator::default());
        let response = worker
            .select_move(
                MoveRequest::new("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
                CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.diagnostics.provenance, Provenance::Book);
        assert_eq!(response.san, "e4");
    }

    #[tokio::test]
    async fn test_errors_cross_the_boundary() {
        let worker = MoveWorker::new(Orchestrator::new(EngineConfig::default()));
        let err = worker
            .select_move(MoveRequest::new("garbage"), CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::InvalidPosition);
    }

    #[test]
    fn test_blocking_variant() {
        let worker = MoveWorker::new(Orchestrator::default());
        let response = worker
            .select_move_blocking(
                MoveRequest::new("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1"),
                CancelToken::new(),
            )
            .unwrap();
        assert_eq!(response.san, "Ra8#");
        assert_eq!(response.diagnostics.provenance, Provenance::Tactical);
    }

    #[tokio::test]
    async fn test_cancel_without_outstanding_request() {
        let session = EngineSession::new(MoveWorker::new(Orchestrator::default()));
        assert!(!session.cancel().await);
    }
}

//! Background execution of restart-wrapped operations.
//!
//! Bodies run on the runtime's blocking pool so the caller dispatching
//! commands never waits on a server restart. The gate already admits at
//! most one running operation; callers commit the gate transition before
//! handing the body to [`Worker::run`].

use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::{MountError, Result};
use crate::gate::Operation;

#[derive(Debug, Clone)]
pub struct Worker {
    handle: Handle,
}

impl Worker {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Worker on the runtime the caller is running in
    pub fn try_current() -> std::result::Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Run `body` on a blocking thread
    pub fn run<F>(&self, operation: Operation, body: F) -> OperationHandle
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let span = tracing::info_span!("operation", name = operation.label());
        let blocking_span = span.clone();
        let blocking = self.handle.spawn_blocking(move || blocking_span.in_scope(body));
        let join = self.handle.spawn(
            async move {
                match blocking.await {
                    Ok(result) => result,
                    Err(e) => Err(MountError::Worker(e.to_string())),
                }
            }
            .instrument(span),
        );
        OperationHandle { operation, join }
    }
}

/// A confirmed operation running in the background
#[derive(Debug)]
pub struct OperationHandle {
    operation: Operation,
    join: JoinHandle<Result<()>>,
}

impl OperationHandle {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the body and return its outcome
    pub async fn wait(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(MountError::Worker(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_body_result() {
        let worker = Worker::try_current().unwrap();

        let ok = worker.run(Operation::Mount, || Ok(()));
        assert_eq!(ok.operation(), Operation::Mount);
        assert!(ok.wait().await.is_ok());

        let failed = worker.run(Operation::Reset, || Err(MountError::Worker("boom".into())));
        assert!(matches!(failed.wait().await, Err(MountError::Worker(_))));
    }

    #[tokio::test]
    async fn test_panicking_body_is_reported() {
        let worker = Worker::try_current().unwrap();
        let handle = worker.run(Operation::Reset, || panic!("body panicked"));
        assert!(matches!(handle.wait().await, Err(MountError::Worker(_))));
    }
}

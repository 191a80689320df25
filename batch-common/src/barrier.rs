use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BarrierError {
    #[error("expected {expected} completion signals but only {received} arrived")]
    MissingSignals { expected: usize, received: usize },
}

/// Synchronization point the driving task blocks on until every worker and
/// writer has finished its current unit of work.
///
/// The barrier knows its arity up front: `wait` returns once exactly
/// `expected` signals arrive. If every handle is dropped before that many
/// signals were sent (a task panicked or exited early), `wait` reports the
/// shortfall instead of blocking forever.
pub struct CompletionBarrier {
    expected: usize,
    rx: mpsc::Receiver<()>,
}

/// One task's side of the barrier. `signal` consumes the handle, so each
/// clone emits at most one completion signal.
#[derive(Clone)]
pub struct CompletionHandle {
    tx: mpsc::Sender<()>,
}

impl CompletionBarrier {
    /// Create a barrier expecting `expected` signals, along with the handle
    /// to clone into each participating task.
    pub fn new(expected: usize) -> (Self, CompletionHandle) {
        let (tx, rx) = mpsc::channel(expected.max(1));
        (Self { expected, rx }, CompletionHandle { tx })
    }

    pub async fn wait(mut self) -> Result<(), BarrierError> {
        for received in 0..self.expected {
            if self.rx.recv().await.is_none() {
                return Err(BarrierError::MissingSignals {
                    expected: self.expected,
                    received,
                });
            }
        }
        Ok(())
    }
}

impl CompletionHandle {
    pub async fn signal(self) {
        // The barrier only disappears once it has every signal it wants, so a
        // send on a closed channel carries no information worth surfacing.
        let _ = self.tx.send(()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_after_expected_signals() {
        let expected = 4;
        let (barrier, handle) = CompletionBarrier::new(expected);

        for _ in 0..expected {
            let handle = handle.clone();
            tokio::spawn(async move {
                handle.signal().await;
            });
        }
        drop(handle);

        assert_eq!(barrier.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_wait_with_zero_expected_is_immediate() {
        let (barrier, handle) = CompletionBarrier::new(0);
        drop(handle);

        assert_eq!(barrier.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_handle_surfaces_missing_signal() {
        let (barrier, handle) = CompletionBarrier::new(2);

        let signaling = handle.clone();
        tokio::spawn(async move {
            signaling.signal().await;
        });
        // The second participant never signals.
        drop(handle);

        assert_eq!(
            barrier.wait().await,
            Err(BarrierError::MissingSignals {
                expected: 2,
                received: 1
            })
        );
    }
}

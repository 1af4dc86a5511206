use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Create a linked cancel handle and cancellation token.
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (
        CancelHandle { tx: Arc::new(tx) },
        Cancellation { rx: Some(rx) },
    )
}

/// Requests cancellation of every [`Cancellation`] cloned from its pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by waits (backoff, poll intervals). In-flight requests are
/// never interrupted.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Sleep for `duration`; `false` if cancelled first.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_interrupts_sleep() {
        let (handle, mut token) = cancellation();
        let task = tokio::spawn(async move { token.sleep(Duration::from_secs(60)).await });
        handle.cancel();
        assert!(!task.await.unwrap());
    }

    #[tokio::test]
    async fn never_cancelled_sleeps_through() {
        let mut token = Cancellation::never();
        assert!(token.sleep(Duration::from_millis(1)).await);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_is_not_cancellation() {
        let (handle, mut token) = cancellation();
        drop(handle);
        assert!(token.sleep(Duration::from_millis(1)).await);
    }

    #[test]
    fn clones_observe_cancel() {
        let (handle, token) = cancellation();
        let other = token.clone();
        handle.cancel();
        assert!(token.is_cancelled() && other.is_cancelled());
    }
}

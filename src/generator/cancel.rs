//! Run-wide cancellation signal.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable cancellation token wired through every blocking operation of
/// a run. Firing it is idempotent; observers see it within one await.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Whether cancellation has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means every sender is gone, which cannot outlive self.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

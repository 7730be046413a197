use std::sync::Arc;

use tokio::sync::watch;

/// Shared abort flag for one installation run.
///
/// Clones observe the same flag; `cancel` wakes every task parked in
/// [`CancelToken::cancelled`].
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the run has been cancelled. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
        std::future::pending::<()>().await;
    }

    /// Fail fast with [`InstallerError::Cancelled`](crate::core::error::InstallerError::Cancelled).
    pub fn check(&self) -> crate::core::error::InstallerResult<()> {
        if self.is_cancelled() {
            return Err(crate::core::error::InstallerError::Cancelled);
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

use tokio::sync::watch;

/// Cooperative cancellation pair. Every long-running task holds a token
/// linked to its owning connection; flipping the handle (or dropping it)
/// cancels the whole subtree. Suspension points observe the token via
/// `cancelled`.
pub fn shutdown_pair() -> (ShutdownHandle, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownToken { rx })
}

#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the owning handle shuts down or is dropped.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        loop {
            if self.rx.changed().await.is_err() {
                return;
            }
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::shutdown_pair;

    #[tokio::test]
    async fn tokens_observe_the_handle() {
        let (handle, mut token) = shutdown_pair();
        assert!(!token.is_cancelled());
        handle.shutdown();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let (handle, mut token) = shutdown_pair();
        drop(handle);
        token.cancelled().await;
    }

    #[tokio::test]
    async fn clones_share_the_same_signal() {
        let (handle, token) = shutdown_pair();
        let mut first = token.clone();
        let mut second = token;
        handle.shutdown();
        first.cancelled().await;
        second.cancelled().await;
    }
}

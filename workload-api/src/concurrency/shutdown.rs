use tokio::sync::watch;

/// Sending side of the process wide shutdown signal.
///
/// The channel carries a flag rather than a unit value so that receivers
/// subscribed after the signal was sent still observe it.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    pub fn wrap(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Signals shutdown to every current and future subscriber.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Resolves once shutdown has been signaled.
    ///
    /// Never resolves if every [`ShutdownTx`] is dropped without signaling.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|shutdown| *shutdown).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx::wrap(tx), ShutdownRx(rx))
}

//! # Cooperative Shutdown Signal
//!
//! One-shot broadcast signal shared by every blocking point in a worker.
//! Firing is idempotent and irreversible; listeners select between work
//! and `fired()`, with cancellation taking priority once set.

use tokio::sync::watch;

/// Owning side of the shutdown signal. Cloneable; any clone may fire it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

/// Listening side handed to polling and consuming loops.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Safe to call more than once.
    pub fn fire(&self) {
        // send_replace never fails even with zero receivers
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires. Returns immediately if already fired.
    pub async fn fired(&mut self) {
        // wait_for also inspects the current value, so a signal fired before
        // this call is observed without racing
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fire_is_idempotent_and_observed() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.listener();

        assert!(!signal.is_fired());
        signal.fire();
        signal.fire();
        assert!(signal.is_fired());

        tokio::time::timeout(Duration::from_millis(100), listener.fired())
            .await
            .expect("listener should observe fired signal");
        assert!(listener.is_fired());
    }

    #[tokio::test]
    async fn listener_created_after_fire_still_observes() {
        let signal = ShutdownSignal::new();
        signal.fire();

        let mut listener = signal.listener();
        tokio::time::timeout(Duration::from_millis(100), listener.fired())
            .await
            .expect("late listener should observe fired signal");
    }
}

//! Global abort signal
//!
//! One [`AbortSignal`] per run; every in-flight case holds an
//! [`AbortListener`]. The first reason sent wins.

use std::fmt;

use tokio::sync::watch;

/// Why the run is being aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Operator interrupt (Ctrl-C)
    Interrupt,
    /// Suite-level timeout expired
    SuiteTimeout,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Interrupt => f.write_str("interrupted"),
            AbortReason::SuiteTimeout => f.write_str("suite timeout"),
        }
    }
}

/// Sending side of the abort broadcast
#[derive(Debug)]
pub struct AbortSignal {
    tx: watch::Sender<Option<AbortReason>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Abort every listener; later calls keep the first reason
    pub fn abort(&self, reason: AbortReason) {
        let changed = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if changed {
            tracing::warn!(%reason, "Aborting run");
        }
    }

    /// Reason the run was aborted, if it was
    pub fn reason(&self) -> Option<AbortReason> {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> AbortListener {
        AbortListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side held by each case
#[derive(Debug, Clone)]
pub struct AbortListener {
    rx: watch::Receiver<Option<AbortReason>>,
}

impl AbortListener {
    /// Listener that never fires
    pub fn never() -> Self {
        AbortSignal::new().listener()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.rx.borrow()
    }

    /// Resolve once the run is aborted
    ///
    /// Pends forever if the signal is dropped without aborting.
    pub async fn aborted(&mut self) -> AbortReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_listener_sees_abort() {
        let signal = AbortSignal::new();
        let mut listener = signal.listener();
        assert_eq!(listener.reason(), None);

        let waiter = tokio::spawn(async move { listener.aborted().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.abort(AbortReason::SuiteTimeout);
        assert_eq!(waiter.await.unwrap(), AbortReason::SuiteTimeout);
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let signal = AbortSignal::new();
        signal.abort(AbortReason::Interrupt);
        signal.abort(AbortReason::SuiteTimeout);
        assert_eq!(signal.reason(), Some(AbortReason::Interrupt));

        // Late subscribers still observe it
        let mut late = signal.listener();
        assert_eq!(late.aborted().await, AbortReason::Interrupt);
    }

    #[tokio::test]
    async fn test_never_fires() {
        let mut listener = AbortListener::never();
        let result = tokio::time::timeout(Duration::from_millis(30), listener.aborted()).await;
        assert!(result.is_err());
    }
}

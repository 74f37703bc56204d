use std::fmt;

use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Interrupt,
    Terminate,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupt => f.write_str("SIGINT"),
            StopReason::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Handle shared by the HTTP server and background tasks; every clone
/// observes the same stop request.
#[derive(Clone)]
pub(crate) struct Shutdown {
    rx: watch::Receiver<Option<StopReason>>,
}

impl Shutdown {
    /// Starts listening for process signals.
    pub(crate) fn listen() -> Self {
        let (tx, shutdown) = Self::channel();
        tokio::spawn(async move {
            let reason = wait_for_signal().await;
            info!(signal = %reason, "shutdown requested, draining connections");
            let _ = tx.send(Some(reason));
        });
        shutdown
    }

    pub(crate) fn channel() -> (watch::Sender<Option<StopReason>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Resolves once a stop was requested. A dropped sender counts as one.
    pub(crate) async fn requested(&mut self) -> Option<StopReason> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            Err(_) => None,
        }
    }
}

async fn wait_for_signal() -> StopReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term =
            signal(SignalKind::terminate()).expect("register SIGTERM handler must succeed");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => StopReason::Interrupt,
            _ = term.recv() => StopReason::Terminate,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        StopReason::Interrupt
    }
}

//! Cooperative shutdown: signals set a flag, the worker loop observes it at
//! the next tick. Nothing is torn down from inside the handler itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    requested: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Spawn listeners for SIGINT and SIGTERM that set the flag.
    /// Must be called from within a tokio runtime.
    pub fn install_signal_handlers(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
            let flag = self.clone();
            match signal(kind) {
                Ok(mut stream) => {
                    tokio::spawn(async move {
                        stream.recv().await;
                        tracing::info!("shutdown signal received");
                        flag.request();
                    });
                }
                Err(e) => tracing::warn!("failed to install signal handler: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_clear_and_latches() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_requested());
        flag.request();
        assert!(flag.is_requested());

        let clone = flag.clone();
        assert!(clone.is_requested());
    }
}

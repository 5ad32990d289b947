use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Routes Ctrl+C to whichever prompt or session is currently active.
///
/// One task listens for the signal for the life of the process; each screen
/// arms a fresh token before it starts waiting, so an interrupt only ever
/// cancels the screen that is in front of the user.
#[derive(Clone, Default)]
pub struct InterruptHub {
    current: Arc<Mutex<CancellationToken>>,
}

impl InterruptHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from inside the tokio runtime.
    pub fn install() -> Self {
        let hub = Self::new();
        let listener = hub.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "Ctrl+C handler unavailable");
                    break;
                }
                listener.trigger();
            }
        });
        hub
    }

    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = token.clone();
        token
    }

    pub fn trigger(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

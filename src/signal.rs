//! Cooperative cancellation driven by Ctrl+C.
//!
//! A single [`CancelToken`] is installed at startup and threaded through the
//! walker, the fingerprint workers, and the per-group resolution loop. Each
//! component checks it at I/O boundaries; workers finish the file they are
//! on before exiting, so a cancelled run never leaves a half-written audit
//! entry.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

/// Shared cancellation flag.
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the operator has requested cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Reset the flag. Used by tests that reuse the process-global token.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error installing the interrupt handler.
#[derive(Debug, Error)]
pub enum SignalError {
    /// The ctrlc hook could not be registered.
    #[error("failed to install interrupt handler: {0}")]
    Install(#[from] ctrlc::Error),
}

static INSTALLED: OnceLock<CancelToken> = OnceLock::new();

/// Install the process-wide Ctrl+C handler and return its token.
///
/// The handler may only be registered once per process; repeat calls (and
/// parallel tests) get the already-installed token back with its flag
/// cleared. If registration fails because some other component owns the
/// signal, an unhooked token is returned so the run can still be cancelled
/// programmatically.
pub fn install() -> Result<CancelToken, SignalError> {
    if let Some(token) = INSTALLED.get() {
        token.reset();
        return Ok(token.clone());
    }

    let token = CancelToken::new();
    let flag = token.clone();

    match ctrlc::set_handler(move || {
        flag.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted, finishing current files...");
        let _ = std::io::stderr().flush();
    }) {
        Ok(()) => {
            let _ = INSTALLED.set(token.clone());
            Ok(token)
        }
        Err(_) => {
            log::debug!("interrupt handler already registered, using unhooked token");
            let fallback = INSTALLED.get_or_init(CancelToken::new).clone();
            fallback.reset();
            Ok(fallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_and_reset() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_install_is_reentrant() {
        let first = install().unwrap();
        first.cancel();
        let second = install().unwrap();
        assert!(!second.is_cancelled());
    }
}

//! Interrupt/signal handling for graceful shutdown
//!
//! Provides global state for Ctrl+C handling across the application. Besides
//! the plain flag, the handler fires a process-wide [`CancellationToken`] so
//! async code (the benchmark workers) can stop without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

/// Global flag for Ctrl+C interrupt handling
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

static CANCELLATION: OnceLock<CancellationToken> = OnceLock::new();

/// Check if the application was interrupted (Ctrl+C pressed)
#[inline]
pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Set the interrupted flag and broadcast cancellation (called from signal handler)
///
/// Safe to call more than once; cancelling an already cancelled token is a no-op.
#[inline]
pub fn set_interrupted() {
    INTERRUPTED.store(true, Ordering::SeqCst);
    cancellation_token().cancel();
}

/// Reset the interrupted flag
///
/// The cancellation token cannot be un-cancelled, so this only affects the flag.
#[inline]
pub fn reset_interrupted() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Process-wide cancellation signal, fired on the first Ctrl+C
pub fn cancellation_token() -> CancellationToken {
    CANCELLATION.get_or_init(CancellationToken::new).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_flag() {
        reset_interrupted();
        assert!(!was_interrupted());

        set_interrupted();
        assert!(was_interrupted());
        assert!(cancellation_token().is_cancelled());

        // second signal is a no-op
        set_interrupted();
        assert!(cancellation_token().is_cancelled());

        reset_interrupted();
        assert!(!was_interrupted());
    }
}

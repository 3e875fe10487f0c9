//! Cooperative shutdown signalling shared by every pipeline stage.
//!
//! No stage is ever interrupted: each one re-checks the token at least
//! once per [`POLL_INTERVAL`](crate::POLL_INTERVAL), so a raised token
//! reaches every stage within a small constant multiple of that interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation token observed by all stages.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    raised: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the token. Idempotent; returns true only for the call that
    /// actually performed the transition out of the running state.
    pub fn trigger(&self) -> bool {
        !self.raised.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_idempotent() {
        let stop = StopToken::new();
        assert!(!stop.is_triggered());
        assert!(stop.trigger());
        assert!(!stop.trigger());
        assert!(stop.is_triggered());
    }

    #[test]
    fn clones_share_the_flag() {
        let stop = StopToken::new();
        let observer = stop.clone();
        stop.trigger();
        assert!(observer.is_triggered());
    }
}

//! Typed errors for the generator's public API.
//!
//! Control operations report [`GeneratorError`]. I/O inside the emission
//! loop uses `anyhow` and only surfaces here wrapped in
//! [`GeneratorError::Worker`] once `stop()` collects the worker's result.

use thiserror::Error;

use crate::state::GeneratorState;

/// Errors produced by generator control operations.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The requested transition is not allowed from the current state.
    /// The state is left unchanged.
    #[error("{operation}() is not allowed in the {state} state")]
    InvalidStateTransition {
        /// Operation the caller attempted
        operation: &'static str,
        /// State observed when the request was rejected
        state: GeneratorState,
    },

    /// `start()` was called outside a tokio runtime.
    #[error("no tokio runtime available to spawn the emission loop")]
    NoRuntime,

    /// Packetization parameters are unusable.
    #[error("invalid generator config: {0}")]
    InvalidConfig(String),

    /// The emission loop terminated on a fatal packetizer or sink error.
    #[error("emission loop failed: {0:#}")]
    Worker(anyhow::Error),

    /// The emission loop panicked.
    #[error("emission loop panicked")]
    WorkerPanicked,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        // ---
        let err = GeneratorError::InvalidStateTransition {
            operation: "suspend",
            state: GeneratorState::Init,
        };
        assert_eq!(err.to_string(), "suspend() is not allowed in the init state");
    }

    #[test]
    fn test_worker_error_keeps_context_chain() {
        // ---
        let inner = anyhow::anyhow!("connection refused").context("failed to send packet 7");
        let err = GeneratorError::Worker(inner);
        assert_eq!(
            err.to_string(),
            "emission loop failed: failed to send packet 7: connection refused"
        );
    }
}

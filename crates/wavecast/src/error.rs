//! Error types for Wavecast
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the streaming core.
///
/// `Transport`, `Protocol`, `Parse` and `MetadataOverflow` are per-attempt
/// errors: the controller absorbs them and rotates to the next station or
/// access point. `Config`, `OutOfMemory` and `Io` surface out of the
/// controller for the host runner to decide policy.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("buffer not ready")]
    NotReady,

    #[error("buffer already initialized")]
    AlreadyInitialized,

    #[error("metadata block exceeds scratch capacity")]
    MetadataOverflow,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid stream location: {0}")]
    Parse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the streaming core
pub type Result<T> = std::result::Result<T, RadioError>;

impl RadioError {
    /// True for errors the controller converts into "try the next station".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RadioError::Transport(_)
                | RadioError::Protocol(_)
                | RadioError::Parse(_)
                | RadioError::MetadataOverflow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_recoverable() {
        assert!(RadioError::Transport("refused".into()).is_recoverable());
    }

    #[test]
    fn metadata_overflow_is_recoverable() {
        assert!(RadioError::MetadataOverflow.is_recoverable());
    }

    #[test]
    fn config_is_fatal() {
        assert!(!RadioError::Config("missing list".into()).is_recoverable());
    }

    #[test]
    fn out_of_memory_is_fatal() {
        assert!(!RadioError::OutOfMemory("4096 bytes".into()).is_recoverable());
    }

    #[test]
    fn display_includes_detail() {
        let e = RadioError::Protocol("bad status line".into());
        assert!(e.to_string().contains("bad status line"));
    }
}

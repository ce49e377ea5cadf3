//! Error types for the rigstream library.

use thiserror::Error;

/// Caller-facing errors, rejected synchronously by the orchestrator.
/// Runtime faults (detector crashes) are not represented here: they are
/// contained per session and reported through the event channel.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Session limit reached; existing sessions are untouched
    #[error("session limit exceeded: {live} live sessions, max {max}")]
    SessionLimitExceeded { live: usize, max: usize },

    /// A live session with this id already exists
    #[error("duplicate session id: {0}")]
    DuplicateSessionId(String),

    /// No live session with this id
    #[error("unknown session id: {0}")]
    UnknownSession(String),

    /// Detector warm-up rejected before it was attempted
    #[error("detector init failed: {0}")]
    DetectorInitFailed(String),

    /// Target rig asset failed validation
    #[error("invalid rig: {0}")]
    InvalidRig(String),

    /// Configuration parse or validation error
    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults raised by a detector backend. Always contained at the session
/// boundary; one detector failing never affects other sessions.
#[derive(Error, Debug)]
pub enum DetectorError {
    /// Model load / warm-up failure
    #[error("initialization failed: {0}")]
    Init(String),

    /// Per-frame inference failure
    #[error("inference failed: {0}")]
    Inference(String),

    /// Configuration the backend cannot satisfy (missing feature, bad shape)
    #[error("unsupported configuration: {0}")]
    UnsupportedConfig(String),
}

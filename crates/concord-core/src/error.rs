//! Error types for Concord

/// Result type alias using Concord's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Concord operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A requested engine is disabled, failed initialization or is unhealthy
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// No enabled engine could serve the request
    #[error("no engine available")]
    NoEngineAvailable,

    /// A single engine exceeded its time budget
    #[error("engine '{engine}' timed out after {timeout_ms}ms")]
    EngineTimeout { engine: String, timeout_ms: u64 },

    /// A single engine failed while extracting
    #[error("engine '{engine}' failed: {message}")]
    EngineExecution { engine: String, message: String },

    /// Consensus threshold outside [0, 1]
    #[error("invalid consensus threshold {0}: must be within [0, 1]")]
    InvalidConsensusThreshold(f64),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Rollout is already at the last stage
    #[error("rollout already at maximum stage {0}")]
    AlreadyAtMaxStage(u8),

    /// Requested rollout stage is not reachable from the current stage
    #[error("invalid stage target {target} (current stage {current})")]
    InvalidStageTarget { target: u8, current: u8 },

    /// Rollout state could not be persisted or loaded
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The caller abandoned the request
    #[error("request cancelled")]
    Cancelled,

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new engine-unavailable error
    pub fn engine_unavailable(engine: impl Into<String>) -> Self {
        Self::EngineUnavailable(engine.into())
    }

    /// Create a new engine execution error
    pub fn engine_execution(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EngineExecution {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from a rejected rollout transition
    pub fn is_rollout_rejection(&self) -> bool {
        matches!(
            self,
            Self::AlreadyAtMaxStage(_) | Self::InvalidStageTarget { .. }
        )
    }
}

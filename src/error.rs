use thiserror::Error;

/// Navigation engine error types.
///
/// Recoverable conditions (bad fixes, retryable recalculations) never
/// terminate a session; unrecoverable ones force it to Stopped and are
/// surfaced to the caller typed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    /// A fix with non-finite or out-of-range coordinates. Ignored at
    /// ingest; prior filter state is retained.
    #[error("invalid sensor data: {0}")]
    SensorDataInvalid(String),

    /// The route fails structural validation. Session start is refused
    /// and the controller never leaves Idle.
    #[error("malformed route: {0}")]
    RouteMalformed(String),

    /// The routing collaborator kept failing through the bounded retry
    /// window while the session was visibly Recalculating.
    #[error("route recalculation failed after {attempts} attempt(s): {reason}")]
    RecalculationFailed { attempts: u32, reason: String },

    /// The routing collaborator reported an error for a single attempt.
    #[error("route provider error: {0}")]
    RouteProvider(String),

    #[error("no active navigation session")]
    SessionNotActive,

    /// The session actor is gone; the handle can no longer reach it.
    #[error("navigation engine channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, NavError>;

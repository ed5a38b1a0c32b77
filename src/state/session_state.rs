/// Session state definitions
///
/// A crawl session moves `Pending -> Running -> {Completed | Aborted | FailedFatal}`.
use std::fmt;

/// Represents the lifecycle state of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    // ===== Active States =====
    /// Session created, domain policy not yet loaded
    Pending,

    /// Frontier seeded, workers dispatching
    Running,

    // ===== Terminal States =====
    /// Frontier exhausted naturally
    Completed,

    /// Cancelled, page cap hit with work left, or wall-clock budget expired
    Aborted,

    /// Start URL failed or was denied by the domain policy
    FailedFatal,
}

impl SessionState {
    /// Returns true if the session has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::FailedFatal)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Aborted)
                | (Self::Pending, Self::FailedFatal)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Aborted)
                | (Self::Running, Self::FailedFatal)
        )
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::FailedFatal => "failed_fatal",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed_fatal" => Some(Self::FailedFatal),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

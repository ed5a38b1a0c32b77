/// Task state definitions
///
/// Every crawl task runs through `Pending -> Fetching -> {Succeeded | Retrying | Skipped}`;
/// `Retrying` leads back to `Fetching` once its delay has elapsed.
use std::fmt;
use std::time::Duration;

/// Represents the current state of a crawl task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    // ===== Active States =====
    /// Accepted into the frontier, not yet dispatched
    Pending,

    /// A fetch attempt is in progress (attempts are numbered from 1)
    Fetching { attempt: u32 },

    /// Attempt `attempt` failed transiently; the next one starts after `next_delay`
    Retrying { attempt: u32, next_delay: Duration },

    // ===== Terminal States =====
    /// Fetched and processed
    Succeeded,

    /// Given up on; the reason is recorded in the session report
    Skipped,
}

impl TaskState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Number of fetch attempts started so far
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Pending => 0,
            Self::Fetching { attempt } | Self::Retrying { attempt, .. } => *attempt,
            Self::Succeeded | Self::Skipped => 0,
        }
    }

    /// Short label used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching { .. } => "fetching",
            Self::Retrying { .. } => "retrying",
            Self::Succeeded => "succeeded",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching { attempt } => write!(f, "fetching (attempt {})", attempt),
            Self::Retrying {
                attempt,
                next_delay,
            } => write!(
                f,
                "retrying after attempt {} in {}ms",
                attempt,
                next_delay.as_millis()
            ),
            _ => write!(f, "{}", self.label()),
        }
    }
}

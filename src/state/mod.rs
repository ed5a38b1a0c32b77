//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionState`: lifecycle of one crawl session (pending, running, terminal outcome)
//! - `TaskState`: lifecycle of one crawl task through fetch, retry and skip

mod session_state;
mod task_state;

// Re-export main types
pub use session_state::SessionState;
pub use task_state::TaskState;

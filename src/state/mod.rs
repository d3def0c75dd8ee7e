//! State module for tracking crawl job progress
//!
//! - `JobStatus`: lifecycle of a crawl job (pending, running, completed, ...)

mod job_state;

pub use job_state::JobStatus;

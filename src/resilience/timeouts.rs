//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap the backend connect and handshake with a deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - A configured value of zero disables the deadline
//! - Timed-out upgrades return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Convert a millisecond setting into a deadline; `0` means none.
pub fn deadline_from_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Same as [`deadline_from_millis`] for settings kept in seconds.
pub fn deadline_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Run `fut`, failing with `DeadlineExceeded` if `deadline` elapses first.
pub async fn with_deadline<F: Future>(
    deadline: Option<Duration>,
    fut: F,
) -> Result<F::Output, DeadlineExceeded> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| DeadlineExceeded(limit)),
        None => Ok(fut.await),
    }
}

//! Per-call timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the timed-out future is dropped
//! - Timeout errors are distinct from other call errors and count as failures

use std::future::Future;
use std::time::Duration;

use crate::error::CallError;

/// Run `call`, failing with [`CallError::Timeout`] once `limit` elapses.
///
/// A zero `limit` disables the deadline.
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> Result<T, CallError>
where
    Fut: Future<Output = Result<T, CallError>>,
{
    if limit.is_zero() {
        return call.await;
    }
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CallError::Timeout(limit)),
    }
}

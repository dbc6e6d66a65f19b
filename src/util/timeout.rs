//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ColloquyError;

/// Wrap a future with a timeout.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ColloquyError>>,
) -> Result<T, ColloquyError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ColloquyError::Timeout(
            u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

/// Like [`with_timeout`], but a `None` limit waits indefinitely.
pub async fn with_optional_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = Result<T, ColloquyError>>,
) -> Result<T, ColloquyError> {
    match duration {
        Some(duration) => with_timeout(duration, future).await,
        None => future.await,
    }
}

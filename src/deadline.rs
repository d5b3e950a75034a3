//! Per-call deadlines for external collaborators

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, RoutebookError};

/// Run `fut` with a deadline; elapsed becomes `UpstreamTimeout(operation)`
pub async fn with_deadline<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} exceeded its {}ms deadline", operation, limit.as_millis());
            Err(RoutebookError::UpstreamTimeout(operation.to_string()))
        }
    }
}

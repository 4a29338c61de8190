//! Timeout Helpers
//!
//! Wrap provider interactions in a deadline. Expiry surfaces as
//! `ExplainError::Timeout`, which the classifier maps to an unavailable
//! provider.
//!
//! ## Usage
//!
//! ```ignore
//! use crate::ai::timeout::with_timeout;
//!
//! let verdict = with_timeout(
//!     settings.timeout,
//!     async { /* validator call */ },
//!     "code validation"
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{ExplainError, Result};

/// Await `future` for at most `limit`; `what` names the operation in the error.
pub async fn with_timeout<T, F>(limit: Duration, future: F, what: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_timeout_map(limit, future, what).await?
}

/// Like [`with_timeout`] for futures whose output is not already a `Result`.
pub async fn with_timeout_map<T, F>(limit: Duration, future: F, what: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| ExplainError::timeout(what, limit))
}

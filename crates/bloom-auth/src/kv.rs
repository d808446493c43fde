//! Bounded access to the shared key-value store

use bloom_db::DbResult;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Run one KV round trip under `limit`.
///
/// Store errors and timeouts both become [`AuthError::DependencyUnavailable`];
/// callers then apply their own fail-open or fail-closed policy.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            debug!(op, error = %e, "KV operation failed");
            Err(AuthError::DependencyUnavailable(format!("{}: {}", op, e)))
        }
        Err(_) => {
            debug!(op, timeout_ms = limit.as_millis() as u64, "KV operation timed out");
            Err(AuthError::DependencyUnavailable(format!("{}: timed out", op)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloom_db::DbError;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_dependency_unavailable() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DbError>(1)
        };
        let result = bounded(Duration::from_millis(500), "get", slow).await;
        assert!(matches!(result, Err(AuthError::DependencyUnavailable(_))));
    }

    #[tokio::test]
    async fn test_store_error_maps_to_dependency_unavailable() {
        let failing = async { Err::<(), _>(DbError::Kv("refused".to_string())) };
        let result = bounded(Duration::from_millis(500), "set", failing).await;
        assert!(matches!(result, Err(AuthError::DependencyUnavailable(_))));
    }
}

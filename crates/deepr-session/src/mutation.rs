//! Optimistic updates with rollback

use std::fmt::Display;
use std::future::Future;

/// Apply a local change before the backend confirms it.
///
/// `read` snapshots the value about to change, `apply` updates local state
/// immediately, and `request` performs the remote write. If the request fails
/// the snapshot is handed to `rollback` and the error is returned.
pub async fn optimistic<S, T, E, Fut>(
    read: impl FnOnce() -> S,
    apply: impl FnOnce(),
    rollback: impl FnOnce(S),
    request: impl FnOnce() -> Fut,
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let snapshot = read();
    apply();
    match request().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!("Optimistic update rejected, rolling back: {}", e);
            rollback(snapshot);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_success_keeps_applied_value() {
        let value = Mutex::new(1);
        let result: Result<&str, String> = optimistic(
            || *value.lock(),
            || *value.lock() = 2,
            |old| *value.lock() = old,
            || async { Ok("saved") },
        )
        .await;

        assert_eq!(result.unwrap(), "saved");
        assert_eq!(*value.lock(), 2);
    }

    #[tokio::test]
    async fn test_failure_rolls_back() {
        let value = Mutex::new(1);
        let result: Result<(), String> = optimistic(
            || *value.lock(),
            || *value.lock() = 2,
            |old| *value.lock() = old,
            || async { Err("offline".to_string()) },
        )
        .await;

        assert_eq!(result.unwrap_err(), "offline");
        assert_eq!(*value.lock(), 1);
    }

    #[tokio::test]
    async fn test_value_is_applied_before_request_runs() {
        let value = Mutex::new(false);
        let seen_during_request = Mutex::new(None);
        let _: Result<(), String> = optimistic(
            || *value.lock(),
            || *value.lock() = true,
            |old| *value.lock() = old,
            || async {
                *seen_during_request.lock() = Some(*value.lock());
                Ok(())
            },
        )
        .await;

        assert_eq!(*seen_during_request.lock(), Some(true));
    }
}

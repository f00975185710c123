//! Generic retry-with-backoff helper (§9 "Nested retry closures").
//!
//! The original had a distinct, hand-written retry/reschedule pattern for
//! each of the bootstrap steps, the face-create/rib-register chain, and the
//! symmetric send-data step. Here they all drive through this one helper,
//! parameterized by an async operation and a classifier telling it whether
//! to stop, retry, or give up.

use std::future::Future;
use std::time::Duration;

/// What `retry_with_backoff` should do after an attempt.
pub enum Outcome<T> {
    Success(T),
    Retry,
    Abandon,
}

/// Drives `attempt` until it reports [`Outcome::Success`] or
/// [`Outcome::Abandon`], sleeping `backoff(attempt_number)` between
/// retries. `attempt_number` is 1-based. Returns `None` if abandoned.
pub async fn retry_with_backoff<F, Fut, T>(mut attempt: F, mut backoff: impl FnMut(u32) -> Duration) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Outcome<T>>,
{
    let mut n = 0u32;
    loop {
        n += 1;
        match attempt(n).await {
            Outcome::Success(value) => return Some(value),
            Outcome::Abandon => return None,
            Outcome::Retry => tokio::time::sleep(backoff(n)).await,
        }
    }
}

/// Fixed 3s backoff used by bootstrap steps and discovery (§4.5, §7 kind 1/2).
pub fn fixed_backoff_3s(_attempt: u32) -> Duration {
    Duration::from_secs(3)
}

/// `3*attempt` seconds, used by the symmetric send-data retry (§4.5).
pub fn linear_backoff_3s(attempt: u32) -> Duration {
    Duration::from_secs(3 * attempt as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try_without_sleeping() {
        let result = retry_with_backoff(
            |_n| async { Outcome::<u32>::Success(42) },
            |_| Duration::from_millis(0),
        )
        .await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            |_n| {
                let count = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Outcome::Retry
                    } else {
                        Outcome::Success(count)
                    }
                }
            },
            |_| Duration::from_millis(0),
        )
        .await;
        assert_eq!(result, Some(2));
    }

    #[tokio::test]
    async fn abandons_when_classifier_says_so() {
        let result = retry_with_backoff(|_n| async { Outcome::<u32>::Abandon }, |_| Duration::from_millis(0)).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn abandons_after_max_attempts_tracked_by_caller() {
        let result = retry_with_backoff(
            |n| async move {
                if n >= 4 {
                    Outcome::Abandon
                } else {
                    Outcome::Retry
                }
            },
            |_| Duration::from_millis(0),
        )
        .await;
        assert_eq!(result, None::<u32>);
    }
}

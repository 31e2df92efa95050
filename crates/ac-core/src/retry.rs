use crate::AssessmentError;
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for transient write contention (spec §4.A, §7).
///
/// Retries `op` up to `max_attempts` times, doubling the delay from
/// `base_delay` each time. Only meant for operations the caller knows are
/// retry-safe (e.g. an optimistic-version UPDATE); permanent errors should be
/// surfaced immediately rather than routed through this helper.
pub async fn with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, AssessmentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssessmentError>>,
{
    let mut attempt = 0;
    let mut delay = base_delay;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < max_attempts => {
                log::warn!(
                    "transient failure on attempt {}/{}: {}",
                    attempt + 1,
                    max_attempts,
                    err
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Default retry policy for repository writes: 5 attempts, 20ms base delay.
pub async fn with_default_backoff<T, F, Fut>(op: F) -> Result<T, AssessmentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AssessmentError>>,
{
    with_backoff(5, Duration::from_millis(20), op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AssessmentError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(5, Duration::from_millis(1), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AssessmentError::conflict("contention"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AssessmentError> = with_backoff(3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AssessmentError::conflict("still contended"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

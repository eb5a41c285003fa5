// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::{future::Future, time::Duration};

use tokio::time::sleep;

use crate::LoaderError;

/// Bounded retry with multiplicative backoff for loader calls.
///
/// Non-transient errors (see [`LoaderError::is_transient`]) abort
/// immediately; everything else is retried until the attempt budget is
/// exhausted and the last error is returned.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            multiplier,
        }
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, LoaderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LoaderError>>,
    {
        let mut delay = self.initial_delay;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) if attempt == self.max_attempts => return Err(error),
                Err(error) => {
                    log::debug!(
                        "loader attempt {attempt}/{} failed, retrying in {delay:?}: {error}",
                        self.max_attempts
                    );
                    sleep(delay).await;
                    delay *= self.multiplier;
                }
            }
        }

        unreachable!("the loop either returns a value or the last error")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO, 1);

        let result: Result<(), _> = policy
            .run(|| {
                let _ = attempts.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(LoaderError::Unavailable {
                        message: "down".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn aborts_on_non_transient_errors() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO, 1);

        let result: Result<(), _> = policy
            .run(|| {
                let _ = attempts.fetch_add(1, Ordering::Relaxed);
                async {
                    let source = serde_json::from_str::<u32>("not json").unwrap_err();
                    Err(LoaderError::InvalidPayload { source })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn returns_the_first_success() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO, 1);

        let result = policy
            .run(|| {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    if attempt == 0 {
                        Err(LoaderError::Unavailable {
                            message: "down".into(),
                        })
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }
}

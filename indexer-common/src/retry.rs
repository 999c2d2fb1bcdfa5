// This file is part of wasm-indexer.
// Copyright (C) 2025 Wasm Indexer Contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use log::warn;
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::sleep;

/// Remote services signal rate limiting out of band; such errors wait this long and do not count
/// against the attempt budget.
pub const RATE_LIMIT_DELAY: Duration = Duration::from_secs(10);

/// Exponential backoff: `base_delay * 2^(attempt - 1)`, optionally capped at `max_delay`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl Backoff {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: None,
        }
    }

    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// The delay after the given 1-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        match self.max_delay {
            Some(max_delay) => delay.min(max_delay),
            None => delay,
        }
    }
}

/// Errors which can be classified as rate limiting.
pub trait RetryableError {
    fn is_rate_limited(&self) -> bool {
        false
    }
}

/// Run the given fallible operation up to `backoff.max_attempts` times, sleeping the backoff
/// delay between attempts. Rate-limit errors sleep [RATE_LIMIT_DELAY] and are not counted.
pub async fn retry<T, E, F, Fut>(backoff: Backoff, mut operation: F) -> Result<T, E>
where
    E: RetryableError + Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),

            Err(error) if error.is_rate_limited() => {
                warn!(error:%, attempt; "rate limited, waiting");
                sleep(RATE_LIMIT_DELAY).await;
            }

            Err(error) if attempt < backoff.max_attempts => {
                let delay = backoff.delay(attempt);
                warn!(error:%, attempt, delay:? = delay; "attempt failed, retrying");
                sleep(delay).await;
                attempt += 1;
            }

            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        fmt,
        sync::{
            Arc,
            atomic::{AtomicU32, Ordering},
        },
    };
    use tokio::time::Instant;

    #[derive(Debug)]
    struct TestError {
        rate_limited: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error")
        }
    }

    impl RetryableError for TestError {
        fn is_rate_limited(&self) -> bool {
            self.rate_limited
        }
    }

    #[test]
    fn test_delay() {
        let backoff = Backoff::new(3, Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));

        let backoff = backoff.with_max_delay(Duration::from_millis(300));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_retry_succeeds_eventually() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = retry(Backoff::new(3, Duration::from_millis(100)), |_| {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError {
                        rate_limited: false,
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let started_at = Instant::now();

        let result = retry::<u32, _, _, _>(Backoff::new(3, Duration::from_millis(100)), |_| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError {
                    rate_limited: false,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // Delays of 100ms and 200ms between the three attempts.
        assert_eq!(started_at.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_retry_rate_limited_not_counted() {
        let attempts = Arc::new(AtomicU32::new(0));

        let result = retry(Backoff::new(2, Duration::from_millis(100)), |_| {
            let attempts = attempts.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                match n {
                    0 => Err(TestError { rate_limited: true }),
                    1 => Err(TestError { rate_limited: true }),
                    _ => Ok(n),
                }
            }
        })
        .await;

        // Two rate-limit errors did not consume the two-attempt budget.
        assert_eq!(result.unwrap(), 2);
    }
}

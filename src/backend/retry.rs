//! Bounded retries for calls that fail for transient reasons.

use nanorand::{WyRand, RNG};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::backend::rest::RestError;

/// Exponential backoff with jitter.
///
/// A call is attempted at most `max_retries + 1` times. Only errors for which
/// [`RestError::is_transient`] holds are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            max_retries: 3,
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    pub fn with_retries(max_retries: u32) -> Self {
        Backoff {
            max_retries,
            ..Backoff::default()
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Backoff::with_retries(0)
    }

    /// The pause before retry number `retry` (starting at 0), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial.checked_mul(factor).map_or(self.max, |delay| delay.min(self.max))
    }

    fn delay(&self, retry: u32, rng: &mut WyRand) -> Duration {
        let base = self.base_delay(retry);
        // up to a quarter of the base delay on top
        let jitter_range = base.as_millis() as u64 / 4;
        let jitter = if jitter_range == 0 {
            0
        } else {
            u64::from(rng.generate::<u16>()) % (jitter_range + 1)
        };
        base + Duration::from_millis(jitter)
    }

    pub fn run<T>(&self, mut call: impl FnMut() -> Result<T, RestError>) -> Result<T, RestError> {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_nanos() as u64)
            .unwrap_or_default();
        let mut rng = WyRand::new_seed(seed);
        let mut retry = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && retry < self.max_retries => {
                    let delay = self.delay(retry, &mut rng);
                    tracing::warn!(%error, retry = retry + 1, delay_ms = delay.as_millis() as u64, "transient error, retrying");
                    std::thread::sleep(delay);
                    retry += 1;
                }
                Err(error) if error.is_transient() => {
                    return Err(RestError::Exhausted {
                        attempts: retry + 1,
                        last: Box::new(error),
                    })
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::rest::RestErrorCode;
    use std::cell::Cell;

    fn instant(max_retries: u32) -> Backoff {
        Backoff {
            max_retries,
            initial: Duration::from_millis(0),
            max: Duration::from_millis(0),
        }
    }

    fn unavailable() -> RestError {
        RestError::Unknown {
            status: 503,
            body: "try later".to_string(),
        }
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let result = instant(3).run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(unavailable())
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant(3).run(|| {
            calls.set(calls.get() + 1);
            Err(RestError::Known {
                status: 404,
                code: RestErrorCode::ResourceDoesNotExist,
                message: "nope".to_string(),
            })
        });
        assert!(matches!(result, Err(RestError::Known { status: 404, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn escalates_when_retries_are_exhausted() {
        let calls = Cell::new(0);
        let result: Result<(), _> = instant(2).run(|| {
            calls.set(calls.get() + 1);
            Err(unavailable())
        });
        match result {
            Err(error @ RestError::Exhausted { attempts: 3, .. }) => assert!(!error.is_transient()),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn base_delay_doubles_and_caps() {
        let backoff = Backoff::default();
        assert_eq!(backoff.base_delay(0), Duration::from_millis(200));
        assert_eq!(backoff.base_delay(1), Duration::from_millis(400));
        assert_eq!(backoff.base_delay(10), Duration::from_secs(5));
        assert_eq!(backoff.base_delay(40), Duration::from_secs(5));
    }
}

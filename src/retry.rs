use std::thread;
use std::time::Duration;

use crate::error::GrabError;

/// Fixed-delay retry around a whole download attempt. `retries` counts the
/// attempts after the first one.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, GrabError>
    where
        F: FnMut(u32) -> Result<T, GrabError>,
    {
        let mut remaining = self.retries;
        let mut attempt = 0u32;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if remaining > 0 => {
                    tracing::warn!(
                        "{label} failed ({err}), retrying {remaining} more time{}",
                        if remaining == 1 { "" } else { "s" }
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    remaining -= 1;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn stops_after_retries() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let result: Result<(), GrabError> = policy.run("test", |_| {
            calls.set(calls.get() + 1);
            Err(GrabError::NoReads("x".to_string()))
        });
        assert_matches!(result, Err(GrabError::NoReads(_)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn returns_first_success() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let value = policy
            .run("test", |attempt| {
                if attempt < 1 {
                    Err(GrabError::NoReads("x".to_string()))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();
        assert_eq!(value, 1);
    }
}

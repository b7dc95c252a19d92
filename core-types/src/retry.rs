// Copyright (c) James Kassemi, SC, US. All rights reserved.
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry policy for async operations. The operation receives the
/// zero-based attempt index so callers can vary the target per attempt (the
/// bulk-file path steps back one trading day per attempt).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

/// Every error observed before the policy gave up, in attempt order.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub errors: Vec<E>,
}

impl<E> RetryExhausted<E> {
    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }

    pub fn attempts(&self) -> usize {
        self.errors.len()
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: usize,
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_pct: f64,
    ) -> Self {
        let clamped_attempts = max_attempts.max(1);
        let clamped_base = base_delay_ms.max(1);
        let clamped_max_delay = max_delay_ms.max(clamped_base);
        let clamped_jitter = jitter_pct.clamp(0.0, 1.0);
        Self {
            max_attempts: clamped_attempts,
            base_delay_ms: clamped_base,
            max_delay_ms: clamped_max_delay,
            jitter_pct: clamped_jitter,
        }
    }

    /// Same pause between every attempt. No jitter unless `with_jitter` adds it.
    pub fn fixed(max_attempts: usize, delay_ms: u64) -> Self {
        Self::new(max_attempts, delay_ms, delay_ms, 0.0)
    }

    /// Spreads each pause by up to `jitter_pct` of itself in either
    /// direction. Clamped to [0, 1].
    pub fn with_jitter(mut self, jitter_pct: f64) -> Self {
        self.jitter_pct = jitter_pct.clamp(0.0, 1.0);
        self
    }

    fn next_delay(&self, attempt: usize) -> Duration {
        let exp = 2_u64.saturating_pow(attempt as u32);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        let jittered = if self.jitter_pct > 0.0 {
            let mut rng = rand::thread_rng();
            let spread = (delay as f64 * self.jitter_pct) as i64;
            let delta = rng.gen_range(-spread..=spread);
            delay.saturating_add_signed(delta)
        } else {
            delay
        };
        Duration::from_millis(jittered)
    }

    pub async fn retry_async<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut errors = Vec::new();
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.next_delay(attempt - 1)).await;
            }
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => errors.push(err),
            }
        }
        Err(RetryExhausted { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn new_clamps_input_parameters() {
        let policy = RetryPolicy::new(0, 0, 0, 2.0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay_ms, 1);
        assert_eq!(policy.max_delay_ms, 1);
        assert_eq!(policy.jitter_pct, 1.0);
    }

    #[test]
    fn next_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(5, 100, 500, 0.0);
        let delays: Vec<_> = (0..5).map(|attempt| policy.next_delay(attempt)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500)); // capped
        assert_eq!(delays[4], Duration::from_millis(500));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = RetryPolicy::fixed(3, 40);
        assert!((0..6).all(|attempt| policy.next_delay(attempt) == Duration::from_millis(40)));
    }

    #[test]
    fn jittered_delay_stays_within_spread() {
        let policy = RetryPolicy::fixed(3, 1_000).with_jitter(0.25);
        for attempt in 0..200 {
            let delay = policy.next_delay(attempt % 3);
            assert!(delay >= Duration::from_millis(750), "{delay:?} below spread");
            assert!(delay <= Duration::from_millis(1_250), "{delay:?} above spread");
        }
        assert_eq!(RetryPolicy::fixed(2, 10).with_jitter(-1.0).jitter_pct, 0.0);
        assert_eq!(RetryPolicy::fixed(2, 10).with_jitter(3.0).jitter_pct, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_passes_attempt_index_until_success() {
        let policy = RetryPolicy::fixed(3, 10);
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));

        let result: Result<&'static str, RetryExhausted<&str>> = policy
            .retry_async(|attempt| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(attempt);
                    if attempt < 2 { Err("boom") } else { Ok("ok") }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_collects_every_error_after_max_attempts() {
        let policy = RetryPolicy::fixed(2, 5);
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), RetryExhausted<String>> = policy
            .retry_async(|attempt| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(format!("nope-{attempt}"))
                }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts(), 2);
        assert_eq!(exhausted.errors, vec!["nope-0", "nope-1"]);
        assert_eq!(exhausted.last().map(String::as_str), Some("nope-1"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}

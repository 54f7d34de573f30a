//! Randomised inter-page delays for polite pagination.
//!
//! Extractors call [`PageDelay::pause`] between consecutive page fetches so
//! that a multi-page run never hammers a single host.

use std::time::Duration;

use rand::Rng;

/// Uniform delay in `[min, max]`, sampled fresh for every pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PageDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// No delay at all. Used by tests and one-shot debugging runs.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
    }

    pub async fn pause(&self) {
        let delay = self.sample();
        if delay.is_zero() {
            return;
        }
        tracing::debug!(delay_ms = %delay.as_millis(), "Pausing between pages");
        tokio::time::sleep(delay).await;
    }
}

impl Default for PageDelay {
    /// 1-3 seconds between pages.
    fn default() -> Self {
        Self {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(3000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stays_within_bounds() {
        let delay = PageDelay::new(Duration::from_millis(100), Duration::from_millis(150));
        for _ in 0..200 {
            let d = delay.sample();
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[test]
    fn new_orders_bounds() {
        let delay = PageDelay::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(delay.min, Duration::from_secs(1));
        assert_eq!(delay.max, Duration::from_secs(3));
    }

    #[test]
    fn degenerate_range_is_constant() {
        let delay = PageDelay::new(Duration::from_millis(42), Duration::from_millis(42));
        assert_eq!(delay.sample(), Duration::from_millis(42));
        assert_eq!(PageDelay::none().sample(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_for_sampled_delay() {
        let delay = PageDelay::new(Duration::from_secs(1), Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        delay.pause().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed <= Duration::from_secs(3));
    }
}

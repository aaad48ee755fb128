use super::Backoff;

/// Exponential backoff with a fixed-point multiplier (`multiplier / multiplier_base`).
///
/// `ExponentialBackoff::new(100, 200, 100)` waits 100ms, 200ms, 400ms, ... and never more
/// than `max_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    multiplier: u64,
    multiplier_base: u64,
    max_delay_ms: u64,
}

impl ExponentialBackoff {
    pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

    pub fn new(base_delay_ms: u64, multiplier: u64, multiplier_base: u64) -> Self {
        assert!(multiplier_base != 0, "backoff multiplier base must be non-zero");
        Self {
            base_delay_ms,
            multiplier,
            multiplier_base,
            max_delay_ms: Self::DEFAULT_MAX_DELAY_MS,
        }
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        // 1.5s growing by 1.5x
        Self::new(1500, 15, 10)
    }
}

impl Backoff for ExponentialBackoff {
    fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms.min(self.max_delay_ms)
    }

    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64 {
        (curr_delay_ms.saturating_mul(self.multiplier) / self.multiplier_base).min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_and_caps() {
        let backoff = ExponentialBackoff::new(100, 200, 100).with_max_delay_ms(500);
        let mut delay = backoff.base_delay_ms();
        let mut seen = vec![delay];
        for _ in 0..4 {
            delay = backoff.next_delay_ms(delay);
            seen.push(delay);
        }
        assert_eq!(seen, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_default_is_one_and_a_half() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.base_delay_ms(), 1500);
        assert_eq!(backoff.next_delay_ms(1500), 2250);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        let backoff = ExponentialBackoff::new(1, 3, 1).with_max_delay_ms(u64::MAX);
        assert_eq!(backoff.next_delay_ms(u64::MAX), u64::MAX);
    }
}

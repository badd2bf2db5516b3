use std::cmp::min;
use std::time::Duration;

use rand::Rng;

/// Exponentially growing retry delays with jitter. Each call to [Self::next_delay]
///  returns the current delay with +/- 25% random jitter applied and then grows the
///  un-jittered delay by the configured factor (expressed in eighths to stay in
///  integer arithmetic), capped at a configured maximum.
pub struct RetryBackoff {
    next_delay: Duration,

    config_initial_delay: Duration,
    config_max_delay: Duration,
    config_factor_eighths: u32,
}

impl RetryBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> RetryBackoff {
        let result = RetryBackoff {
            next_delay: initial_delay,
            config_initial_delay: initial_delay,
            config_max_delay: max_delay,
            config_factor_eighths: 8 * 2,
        };

        assert!(result.config_factor_eighths >= 8);
        assert!(initial_delay <= max_delay);

        result
    }

    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let base = self.next_delay;

        self.next_delay = min(
            base * self.config_factor_eighths / 8,
            self.config_max_delay,
        );

        Self::jittered(base)
    }

    pub fn reset(&mut self) {
        self.next_delay = self.config_initial_delay;
    }

    fn jittered(base: Duration) -> Duration {
        let base_millis = base.as_millis() as u64;
        if base_millis == 0 {
            return base;
        }

        let max_offset = base_millis / 4;
        let jittered = base_millis - max_offset
            + rand::thread_rng().gen_range(0..=2 * max_offset);
        Duration::from_millis(jittered)
    }
}

use chrono::{DateTime, Duration, Utc};

/// Fixed one-second window counter, per the spec's `(window_start, count)`
/// shape — not a leaky/continuous bucket. A message consumes one token if
/// the current window has capacity left; otherwise it's dropped.
#[derive(Debug)]
pub struct TokenBucket {
    max_per_second: u32,
    window_start: DateTime<Utc>,
    count: u32,
}

impl TokenBucket {
    pub fn new(max_per_second: u32, now: DateTime<Utc>) -> Self {
        Self { max_per_second, window_start: now, count: 0 }
    }

    pub fn try_consume(&mut self, now: DateTime<Utc>) -> bool {
        if now - self.window_start >= Duration::seconds(1) {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.max_per_second {
            return false;
        }
        self.count += 1;
        true
    }
}

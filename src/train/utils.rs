use std::time::{Duration, Instant};

/// Measures how many items are processed per second over a sliding interval.
#[derive(Debug, Clone)]
pub struct RateCounter {
    interval: Duration,
    since: Instant,
    count: f64,
    rate: Option<f64>,
}

impl RateCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            since: Instant::now(),
            count: 0.0,
            rate: None,
        }
    }

    pub fn with_second_interval() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn add(&mut self, count: f64) {
        self.count += count;

        let elapsed = self.since.elapsed();
        if elapsed >= self.interval {
            self.rate = Some(self.count / elapsed.as_secs_f64());
            self.count = 0.0;
            self.since = Instant::now();
        }
    }

    /// The rate of the last full interval, if any.
    pub fn rate(&self) -> Option<f64> {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_counter_test() {
        let mut counter = RateCounter::new(Duration::from_millis(10));
        counter.add(1.0);
        assert!(counter.rate().is_none());

        std::thread::sleep(Duration::from_millis(20));
        counter.add(1.0);
        let rate = counter.rate().unwrap();
        assert!(rate > 0.0 && rate <= 100.0);
    }
}

/// One point of the learning curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    /// Number of completed episodes when the sample was taken.
    pub episode: usize,
    /// Mean raw return of the episodes since the previous sample.
    pub average_reward: f32,
}

impl MetricSample {
    /// Score above which a run is usually considered solved.
    pub const SOLVED_THRESHOLD: f32 = 200.0;

    pub fn new(episode: usize, average_reward: f32) -> Self {
        Self {
            episode,
            average_reward,
        }
    }

    pub fn is_solved(&self, threshold: f32) -> bool {
        self.average_reward > threshold
    }
}

/// Sums episode returns and empties itself every `interval` episodes.
#[derive(Debug, Clone)]
pub struct ReturnAccumulator {
    interval: usize,
    sum: f32,
    count: usize,
}

impl ReturnAccumulator {
    pub fn new(interval: usize) -> Self {
        assert!(interval > 0, "interval must be at least 1");
        Self {
            interval,
            sum: 0.0,
            count: 0,
        }
    }

    /// Adds the return of the episode that just finished. `episode` is the
    /// 1-based count of completed episodes.
    pub fn push(&mut self, episode: usize, episode_return: f32) -> Option<MetricSample> {
        self.sum += episode_return;
        self.count += 1;
        if episode % self.interval != 0 {
            return None;
        }
        let sample = MetricSample::new(episode, self.sum / self.count as f32);
        self.sum = 0.0;
        self.count = 0;
        Some(sample)
    }

    /// Episodes added since the last sample.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub fn sum(&self) -> f32 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emits_every_interval_and_resets() {
        let mut acc = ReturnAccumulator::new(20);
        for episode in 1..20 {
            assert_eq!(acc.push(episode, 100.0), None);
        }
        assert_eq!(acc.pending(), 19);
        assert_eq!(acc.push(20, 100.0), Some(MetricSample::new(20, 100.0)));
        assert_eq!(acc.pending(), 0);
        assert_eq!(acc.sum(), 0.0);

        for episode in 21..40 {
            assert_eq!(acc.push(episode, -50.0), None);
        }
        assert_eq!(acc.push(40, 30.0), Some(MetricSample::new(40, (19.0 * -50.0 + 30.0) / 20.0)));
    }

    #[test]
    fn test_interval_one() {
        let mut acc = ReturnAccumulator::new(1);
        assert_eq!(acc.push(1, 3.5), Some(MetricSample::new(1, 3.5)));
        assert_eq!(acc.push(2, -1.0), Some(MetricSample::new(2, -1.0)));
    }

    #[test]
    fn test_solved() {
        assert!(MetricSample::new(20, 200.5).is_solved(MetricSample::SOLVED_THRESHOLD));
        assert!(!MetricSample::new(20, 200.0).is_solved(MetricSample::SOLVED_THRESHOLD));
    }
}

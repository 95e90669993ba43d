/// Welford's online algorithm for single-pass mean and variance.
/// See: <https://en.wikipedia.org/wiki/Algorithms_for_calculating_variance#Welford's_online_algorithm>
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WelfordOnline {
    count: u64,
    mean: f64,
    recurrence_relation_m: f64,
}

impl WelfordOnline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one value into the running state.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let prev_mean = self.mean;
        self.mean += (value - prev_mean) / self.count as f64;
        self.recurrence_relation_m += (value - prev_mean) * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Unbiased sample variance (Bessel's correction).
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.recurrence_relation_m / (self.count - 1) as f64
        }
    }

    /// Biased population variance.
    pub fn population_variance(&self) -> f64 {
        if self.count < 1 {
            0.0
        } else {
            self.recurrence_relation_m / self.count as f64
        }
    }

    pub fn sample_std_dev(&self) -> f64 {
        self.sample_variance().sqrt()
    }
}

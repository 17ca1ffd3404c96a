//! Cooperative run budget.
//!
//! Searches poll the budget between units of work (a local search pass, a
//! beam depth level, a shaking round); nothing is interrupted.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Budget {
    /// Wall-clock limit in seconds
    pub time_limit: f64,
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    start: Instant,
}

impl Budget {
    pub fn new(time_limit: f64, max_iterations: usize) -> Self {
        Budget {
            time_limit,
            max_iterations,
            start: Instant::now(),
        }
    }

    /// Only bounded by iterations.
    pub fn iterations(max_iterations: usize) -> Self {
        Self::new(f64::INFINITY, max_iterations)
    }

    /// Restart the clock, e.g. at the beginning of a trial.
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    /// Seconds since the budget was created or restarted.
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn time_left(&self) -> bool {
        self.elapsed() < self.time_limit
    }

    /// `true` once either limit is reached.
    pub fn exhausted(&self, iterations: usize) -> bool {
        iterations >= self.max_iterations || !self.time_left()
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::new(10.0, usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_limit() {
        let budget = Budget::iterations(3);
        assert!(!budget.exhausted(2));
        assert!(budget.exhausted(3));
    }

    #[test]
    fn test_time_limit() {
        let budget = Budget::new(0.0, usize::MAX);
        assert!(!budget.time_left());
        assert!(budget.exhausted(0));
        assert!(Budget::new(60.0, 10).time_left());
    }
}

//! Multi-start descent.
//!
//! Each iteration draws a random tour and applies the descent pipeline until
//! it stops improving. Mostly useful as a baseline for the constructive
//! solvers.

use crate::budget::Budget;
use crate::config::LocalSearchConfig;
use crate::heuristics::local_search::{DescentPipeline, LocalSearch};
use crate::heuristics::{BestTracker, SolveOutcome, Solver};
use crate::instance::TsptwInstance;
use crate::random::RandomSource;
use crate::report::ProgressSink;
use crate::tour::Tour;

pub struct DescentSolver {
    pub local_search: LocalSearchConfig,
}

impl DescentSolver {
    pub fn new(local_search: LocalSearchConfig) -> Self {
        DescentSolver { local_search }
    }

    fn iterate<'a>(
        &self,
        instance: &'a TsptwInstance,
        descent: &DescentPipeline,
        rng: &mut dyn RandomSource,
        budget: &Budget,
    ) -> Tour<'a> {
        let mut tour = Tour::random(instance, rng);
        let mut rounds = 0;
        while budget.time_left() && descent.improve(&mut tour, rng) {
            rounds += 1;
        }
        log::trace!("descent: {} improving rounds, {}", rounds, tour);
        tour
    }
}

impl Default for DescentSolver {
    fn default() -> Self {
        Self::new(LocalSearchConfig::default())
    }
}

impl Solver for DescentSolver {
    fn name(&self) -> &str {
        "Descent"
    }

    fn solve<'a>(
        &self,
        instance: &'a TsptwInstance,
        rng: &mut dyn RandomSource,
        budget: &Budget,
        trial: usize,
        sink: &mut dyn ProgressSink,
    ) -> SolveOutcome<'a> {
        let descent = DescentPipeline::new(self.local_search.restore_order, self.local_search.first_improvement);

        let mut iteration = 1;
        let mut tracker = BestTracker::new(self.iterate(instance, &descent, rng, budget), trial, budget, sink);
        while !budget.exhausted(iteration) {
            iteration += 1;
            let tour = self.iterate(instance, &descent, rng, budget);
            tracker.offer(&tour, iteration, budget, sink);
        }
        log::debug!("Descent: {} iterations, best {}", iteration, tracker.best());
        tracker.into_outcome(iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;
    use crate::report::TraceRecorder;

    fn create_test_instance() -> TsptwInstance {
        let n = 7;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        TsptwInstance::new("line", distance, vec![0.0; n], vec![1000.0; n]).unwrap()
    }

    #[test]
    fn test_descent_solver_runs_budget() {
        let instance = create_test_instance();
        let solver = DescentSolver::default();
        let budget = Budget::new(10.0, 4);
        let mut rng = seeded(11);
        let mut trace = TraceRecorder::new();
        let outcome = solver.solve(&instance, &mut rng, &budget, 2, &mut trace);

        assert_eq!(outcome.iterations, 4);
        outcome.best.check_solution().unwrap();
        assert!(outcome.best.is_feasible());
        assert!(outcome.best_iteration >= 1 && outcome.best_iteration <= 4);
        assert!(trace.events().iter().all(|e| e.trial == 2));
        // improvements are strictly decreasing
        assert!(trace.events().windows(2).all(|w| w[1].cost < w[0].cost));
    }
}

//! General Variable Neighborhood Search for the TSPTW.
//!
//! Each iteration has two phases. `vns_feasible` looks for a feasible tour:
//! random start, feasibility restoration and growing unchecked relocation
//! shakes. `gvns` then optimises it with feasible relocation shakes followed
//! by a VND of feasible 1-shift and 2-opt.

use crate::budget::Budget;
use crate::config::GvnsConfig;
use crate::heuristics::local_search::{
    perturb_relocate, perturb_relocate_feasible, FeasibilityRestore, LocalSearch, Vnd,
};
use crate::heuristics::{BestTracker, SolveOutcome, Solver};
use crate::instance::{fless, TsptwInstance};
use crate::random::RandomSource;
use crate::report::ProgressSink;
use crate::tour::Tour;

pub struct Gvns {
    pub config: GvnsConfig,
    restore: FeasibilityRestore,
    vnd: Vnd,
}

impl Gvns {
    pub fn new(config: GvnsConfig) -> Self {
        let restore = FeasibilityRestore::new(config.restore_order);
        Gvns {
            config,
            restore,
            vnd: Vnd::with_standard_operators(),
        }
    }

    /// Apply feasibility restoration until it stops reducing the lateness.
    fn restore_fully(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        let mut improved = false;
        while self.restore.improve(tour, rng) {
            improved = true;
        }
        improved
    }

    /// Descend a feasible tour to a local optimum of 1-shift and 2-opt.
    pub fn vnd(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        assert!(tour.is_feasible(), "VND requires a feasible tour");
        self.vnd.improve(tour, rng)
    }

    /// Search for a feasible tour, restarting from random tours.
    ///
    /// The number of restarts is bounded by the iteration limit of `budget`.
    /// When the budget runs out first, the least late tour seen is returned.
    pub fn vns_feasible<'a>(
        &self,
        instance: &'a TsptwInstance,
        rng: &mut dyn RandomSource,
        budget: &Budget,
    ) -> Tour<'a> {
        let level_max = instance.n() / 2;
        let mut best: Option<Tour<'a>> = None;
        let mut restarts = 0;
        loop {
            restarts += 1;
            let mut x = Tour::random(instance, rng);
            self.restore_fully(&mut x, rng);
            let mut x2 = x.clone();
            let mut level = 1;
            while !x.is_feasible() && level < level_max && budget.time_left() {
                perturb_relocate(&mut x2, level, rng);
                self.restore_fully(&mut x2, rng);
                if fless(x2.infeasibility(), x.infeasibility()) {
                    log::trace!("vns-feasible level {}: infeasibility {:.2}", level, x2.infeasibility());
                    x.clone_from(&x2);
                    level = 1;
                } else {
                    x2.clone_from(&x);
                    level += 1;
                }
            }
            if x.is_feasible() {
                return x;
            }
            let least_late = match best.take() {
                Some(b) if !fless(x.infeasibility(), b.infeasibility()) => b,
                _ => x,
            };
            if budget.exhausted(restarts) {
                log::debug!("vns-feasible: no feasible tour after {} restarts", restarts);
                return least_late;
            }
            best = Some(least_late);
        }
    }

    /// Optimise a feasible tour in place.
    pub fn gvns(&self, x: &mut Tour, rng: &mut dyn RandomSource, budget: &Budget) {
        let mut level = 1;
        let mut iterlevel = 0;
        let mut x2 = x.clone();
        while level < self.config.level_max && budget.time_left() {
            perturb_relocate_feasible(&mut x2, level, rng);
            self.vnd(&mut x2, rng);
            if fless(x2.cost(), x.cost()) {
                log::debug!("gvns level {}: cost {:.2}", level, x2.cost());
                x.clone_from(&x2);
                level = 1;
                iterlevel = 0;
            } else {
                x2.clone_from(x);
                iterlevel += 1;
                if iterlevel > self.config.iterlevel_max {
                    level += 1;
                    iterlevel = 0;
                }
            }
        }
    }

    fn iterate<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource, budget: &Budget) -> Tour<'a> {
        let mut x = self.vns_feasible(instance, rng, budget);
        if x.is_feasible() {
            self.gvns(&mut x, rng, budget);
        }
        x
    }
}

impl Default for Gvns {
    fn default() -> Self {
        Self::new(GvnsConfig::default())
    }
}

impl Solver for Gvns {
    fn name(&self) -> &str {
        "GVNS"
    }

    fn solve<'a>(
        &self,
        instance: &'a TsptwInstance,
        rng: &mut dyn RandomSource,
        budget: &Budget,
        trial: usize,
        sink: &mut dyn ProgressSink,
    ) -> SolveOutcome<'a> {
        let mut iteration = 1;
        let mut tracker = BestTracker::new(self.iterate(instance, rng, budget), trial, budget, sink);
        while !budget.exhausted(iteration) {
            iteration += 1;
            let tour = self.iterate(instance, rng, budget);
            tracker.offer(&tour, iteration, budget, sink);
        }
        log::debug!("GVNS: {} iterations, best {}", iteration, tracker.best());
        tracker.into_outcome(iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;

    /// Customers on a line that must be visited roughly in index order.
    fn create_test_instance(customers: usize) -> TsptwInstance {
        let n = customers + 1;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        let window_start = (0..n).map(|i| i as f64).collect();
        let mut window_end: Vec<f64> = (0..n).map(|i| i as f64 + 3.0).collect();
        window_end[0] = 1000.0;
        TsptwInstance::new("windows", distance, window_start, window_end).unwrap()
    }

    #[test]
    fn test_vns_feasible_finds_feasible_tour() {
        let instance = create_test_instance(8);
        let gvns = Gvns::default();
        let budget = Budget::new(10.0, usize::MAX);
        let mut rng = seeded(17);
        let tour = gvns.vns_feasible(&instance, &mut rng, &budget);
        tour.check_solution().unwrap();
        assert!(tour.is_feasible());
    }

    #[test]
    fn test_vnd_repairs_backtrack() {
        let instance = create_test_instance(8);
        let gvns = Gvns::default();
        let mut rng = seeded(3);
        let mut tour = Tour::from_customers(&instance, &[2, 1, 3, 4, 5, 6, 7, 8]);
        assert!(tour.is_feasible());
        assert_eq!(tour.cost(), 18.0);
        assert!(gvns.vnd(&mut tour, &mut rng));
        tour.check_solution().unwrap();
        assert_eq!(tour.customers(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(tour.cost(), 16.0);
    }

    #[test]
    fn test_gvns_never_worsens() {
        let instance = create_test_instance(8);
        let gvns = Gvns::new(GvnsConfig { level_max: 4, iterlevel_max: 5, ..GvnsConfig::default() });
        let budget = Budget::new(10.0, usize::MAX);
        let mut rng = seeded(3);
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 5, 4, 6, 7, 8]);
        assert!(tour.is_feasible());
        let before = tour.cost();
        gvns.gvns(&mut tour, &mut rng, &budget);
        tour.check_solution().unwrap();
        assert!(tour.is_feasible());
        assert!(tour.cost() <= before);
    }

    /// Customer 1 can never be reached before its window closes.
    fn create_unreachable_instance() -> TsptwInstance {
        let coords = [0.0, 5.0, 6.0];
        let distance = coords
            .iter()
            .map(|a: &f64| coords.iter().map(|b| (a - b).abs()).collect())
            .collect();
        TsptwInstance::new("unreachable", distance, vec![0.0; 3], vec![100.0, 1.0, 100.0]).unwrap()
    }

    #[test]
    fn test_vns_feasible_respects_iteration_budget() {
        let instance = create_unreachable_instance();
        let gvns = Gvns::default();
        let mut rng = seeded(4);
        let tour = gvns.vns_feasible(&instance, &mut rng, &Budget::iterations(5));
        tour.check_solution().unwrap();
        assert!(!tour.is_feasible());
        assert_eq!(tour.constraint_violations(), 1);
    }

    #[test]
    fn test_solver_stops_without_feasible_tour() {
        let instance = create_unreachable_instance();
        let gvns = Gvns::default();
        let mut rng = seeded(4);
        let outcome = gvns.solve(&instance, &mut rng, &Budget::iterations(1), 1, &mut crate::report::NullSink);
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.best.is_feasible());
        // Visiting 1 first is the least late order.
        assert_eq!(outcome.best.customers(), &[1, 2]);
        assert_eq!(outcome.best.infeasibility(), 4.0);
    }

    #[test]
    fn test_solver_reports_improvements() {
        let instance = create_test_instance(6);
        let gvns = Gvns::default();
        let budget = Budget::new(10.0, 3);
        let mut rng = seeded(8);
        let mut trace = crate::report::TraceRecorder::new();
        let outcome = gvns.solve(&instance, &mut rng, &budget, 1, &mut trace);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.best.is_feasible());
        assert!(!trace.events().is_empty());
        assert_eq!(trace.events().last().map(|e| e.cost), Some(outcome.best.cost()));
    }
}

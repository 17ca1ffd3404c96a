//! Local search improvement heuristics for the TSPTW.
//!
//! This module implements the neighbourhoods used by every solver:
//! - Feasibility-preserving 1-shift (sequential and randomised candidate order)
//! - Feasibility restoration through 1-shift moves of (non-)violated customers
//! - Randomised first-improvement 2-opt (symmetric instances)
//! - Insertion / or-opt search, first or best improvement
//! - VND composition and the post-construction descent
//! - Random relocation shakes used by GVNS

use crate::instance::fless;
use crate::random::RandomSource;
use crate::tour::{Tour, TwoOptProbe};
use serde::{Deserialize, Serialize};

/// Trait for local search improvement methods
pub trait LocalSearch {
    /// Try to improve `tour` in place. Returns `true` when it changed for the better.
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool;
    fn name(&self) -> &str;
}

#[inline]
fn debug_check(tour: &Tour) {
    debug_assert!(tour.check_solution().is_ok(), "{:?}", tour.check_solution());
}

/// Cost-improving 1-shift restricted to feasible tours.
///
/// Each call commits at most one move, the first improving and feasible
/// relocation found.
pub struct FeasibleOneShift {
    /// Shuffle candidate customers and probe insertions directly instead of
    /// walking swap chains in tour order.
    pub randomized: bool,
}

impl FeasibleOneShift {
    pub fn sequential() -> Self {
        FeasibleOneShift { randomized: false }
    }

    pub fn randomized() -> Self {
        FeasibleOneShift { randomized: true }
    }

    fn sequential_pass(tour: &mut Tour) -> bool {
        let n = tour.instance().n();
        for i in 1..n.saturating_sub(1) {
            if tour.infeasible_move(i) {
                continue;
            }
            let mut ngh = tour.clone();
            let mut delta = 0.0;
            let mut first_dirty = None;
            if ngh.do_feasible_swap(i, &mut delta, &mut first_dirty) {
                *tour = ngh;
                debug_check(tour);
                return true;
            }

            // Moving the customer at i + 1 backwards starts from the same swap.
            let mut back = ngh.clone();
            let (mut back_delta, mut back_dirty) = (delta, first_dirty);

            for d in i + 1..n - 1 {
                if ngh.infeasible_move(d) {
                    break;
                }
                if ngh.do_feasible_swap(d, &mut delta, &mut first_dirty) {
                    *tour = ngh;
                    debug_check(tour);
                    return true;
                }
            }

            for d in (1..i).rev() {
                if back.infeasible_move(d) {
                    break;
                }
                if back.do_feasible_swap(d, &mut back_delta, &mut back_dirty) {
                    *tour = back;
                    debug_check(tour);
                    return true;
                }
            }
        }
        false
    }

    fn randomized_pass(tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        let instance = tour.instance();
        let n = instance.n();
        let mut candidates: Vec<usize> = (1..n.saturating_sub(1))
            .filter(|&i| !tour.infeasible_move(i))
            .collect();
        rng.shuffle(&mut candidates);

        let dist = |a, b| instance.distance(a, b);
        let mut scratch = Vec::new();
        for i in candidates {
            let p = tour.permutation();
            let ci = p[i];
            let removal_gain = dist(p[i - 1], ci) + dist(ci, p[i + 1]) - dist(p[i - 1], p[i + 1]);

            let mut target = None;
            for d in (1..i).rev() {
                let cj = p[d];
                if instance.tw_infeasible(ci, cj) {
                    break;
                }
                let insertion = dist(p[d - 1], ci) + dist(ci, cj) - dist(p[d - 1], cj);
                if !fless(insertion, removal_gain) {
                    continue;
                }
                if let Some(end) = tour.probe_insertion(i, d, &mut scratch) {
                    target = Some((d, end));
                    break;
                }
            }
            if target.is_none() {
                for d in i + 2..n {
                    let cj = p[d];
                    if instance.tw_infeasible(cj, ci) {
                        break;
                    }
                    let insertion = dist(ci, p[d + 1]) + dist(cj, ci) - dist(cj, p[d + 1]);
                    if !fless(insertion, removal_gain) {
                        continue;
                    }
                    if let Some(end) = tour.probe_insertion(i, d, &mut scratch) {
                        target = Some((d, end));
                        break;
                    }
                }
            }

            if let Some((d, end)) = target {
                log::trace!("1-shift: {} -> {}", i, d);
                tour.commit_insertion(i, d, &scratch, end);
                debug_check(tour);
                return true;
            }
        }
        false
    }
}

impl LocalSearch for FeasibleOneShift {
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        if !tour.is_feasible() {
            return false;
        }
        if self.randomized {
            Self::randomized_pass(tour, rng)
        } else {
            Self::sequential_pass(tour)
        }
    }

    fn name(&self) -> &str {
        if self.randomized {
            "feasible-1shift-random"
        } else {
            "feasible-1shift"
        }
    }
}

/// Order in which [`FeasibilityRestore`] tries its four sub-searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeasibilityOrder {
    /// backward violated, forward non-violated, forward violated, backward non-violated
    #[default]
    Code,
    /// backward violated, forward non-violated, backward non-violated, forward violated
    Paper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreMove {
    BackwardViolated,
    ForwardNonViolated,
    ForwardViolated,
    BackwardNonViolated,
}

impl RestoreMove {
    fn forward(self) -> bool {
        matches!(self, RestoreMove::ForwardViolated | RestoreMove::ForwardNonViolated)
    }

    fn violated(self) -> bool {
        matches!(self, RestoreMove::BackwardViolated | RestoreMove::ForwardViolated)
    }
}

impl FeasibilityOrder {
    fn moves(self) -> [RestoreMove; 4] {
        use RestoreMove::*;
        match self {
            FeasibilityOrder::Code => [BackwardViolated, ForwardNonViolated, ForwardViolated, BackwardNonViolated],
            FeasibilityOrder::Paper => [BackwardViolated, ForwardNonViolated, BackwardNonViolated, ForwardViolated],
        }
    }
}

/// Reduce the total lateness of an infeasible tour with 1-shift moves.
///
/// Returns `true` as soon as the tour becomes feasible, or when at least one
/// move reduced the lateness.
pub struct FeasibilityRestore {
    pub order: FeasibilityOrder,
}

impl FeasibilityRestore {
    pub fn new(order: FeasibilityOrder) -> Self {
        FeasibilityRestore { order }
    }

    /// Positions whose customer is (not) late, in random order.
    fn candidates(tour: &Tour, violated: bool, rng: &mut dyn RandomSource) -> Vec<usize> {
        let instance = tour.instance();
        let n = instance.n();
        let mut set: Vec<usize> = (1..n)
            .filter(|&i| (tour.arrival(i) > instance.window_end(tour.permutation()[i])) == violated)
            .collect();
        rng.shuffle(&mut set);
        set
    }

    fn run_move(tour: &mut Tour, mv: RestoreMove, improved: &mut bool, rng: &mut dyn RandomSource) -> bool {
        let n = tour.instance().n();
        let mut set = Self::candidates(tour, mv.violated(), rng);
        let mut sol = tour.clone();

        while let Some(i) = set.pop() {
            sol.clone_from(tour);
            let mut moved = false;
            let steps: Box<dyn Iterator<Item = usize>> = if mv.forward() {
                Box::new(i..n - 1)
            } else {
                Box::new((1..i).rev())
            };
            for d in steps {
                if sol.infeasible_move(d) {
                    break;
                }
                sol.swap(d);
                if fless(sol.infeasibility(), tour.infeasibility()) {
                    tour.clone_from(&sol);
                    *improved = true;
                    moved = true;
                    log::trace!("restore {:?}: {} -> {}", mv, i, d);
                    debug_check(tour);
                    if tour.is_feasible() {
                        return true;
                    }
                }
            }
            if moved {
                set = Self::candidates(tour, mv.violated(), rng);
            }
        }
        false
    }
}

impl Default for FeasibilityRestore {
    fn default() -> Self {
        Self::new(FeasibilityOrder::default())
    }
}

impl LocalSearch for FeasibilityRestore {
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        if tour.is_feasible() {
            return false;
        }
        let mut improved = false;
        for mv in self.order.moves() {
            if Self::run_move(tour, mv, &mut improved, rng) {
                return true;
            }
        }
        improved
    }

    fn name(&self) -> &str {
        match self.order {
            FeasibilityOrder::Code => "feasibility-1shift",
            FeasibilityOrder::Paper => "feasibility-1shift-paper",
        }
    }
}

/// Randomised first-improvement 2-opt on feasible tours of symmetric instances.
///
/// A call keeps applying improving moves until a whole randomised sweep
/// finds none, so it leaves the tour 2-opt optimal.
pub struct TwoOptSearch;

impl LocalSearch for TwoOptSearch {
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        let instance = tour.instance();
        if !instance.is_symmetric() || !tour.is_feasible() || !tour.is_complete() {
            return false;
        }
        let n = instance.n();
        let dist = |a, b| instance.distance(a, b);
        let mut improved = false;
        let mut order = rng.random_permutation(n);
        let mut scratch = Vec::new();

        while let Some(pos_c1) = order.pop() {
            let p = tour.permutation();
            let (c1, s1) = (p[pos_c1], p[pos_c1 + 1]);
            let radius = dist(c1, s1);

            let mut accepted = None;
            for h in pos_c1 + 2..n {
                let c2 = p[h];
                if instance.tw_infeasible(c2, s1) {
                    break;
                }
                let s2 = p[h + 1];
                let gain = dist(c1, c2) + dist(s1, s2) - radius - dist(c2, s2);
                if !fless(gain, 0.0) {
                    continue;
                }
                match tour.probe_two_opt(pos_c1, h, &mut scratch) {
                    TwoOptProbe::InfeasibleBeyond => break,
                    TwoOptProbe::Infeasible => continue,
                    TwoOptProbe::Feasible { end } => {
                        accepted = Some((h, end));
                        break;
                    }
                }
            }

            if let Some((h, end)) = accepted {
                log::trace!("2-opt: ({}, {})", pos_c1, h);
                tour.commit_two_opt(pos_c1, h, &scratch, end);
                debug_check(tour);
                improved = true;
                order = rng.random_permutation(n);
            }
        }
        improved
    }

    fn name(&self) -> &str {
        "2-opt"
    }
}

/// Insertion (or-opt of one customer) search over swap chains.
///
/// Works on infeasible tours too: moves are compared with `better_than`.
pub struct InsertionSearch {
    /// Use first improvement instead of best improvement
    pub first_improvement: bool,
}

impl InsertionSearch {
    pub fn first_improvement() -> Self {
        InsertionSearch { first_improvement: true }
    }

    pub fn best_improvement() -> Self {
        InsertionSearch { first_improvement: false }
    }
}

impl LocalSearch for InsertionSearch {
    fn improve(&self, tour: &mut Tour, _rng: &mut dyn RandomSource) -> bool {
        let n = tour.instance().n();
        let mut best = tour.clone();
        let mut sol = tour.clone();
        let mut orb1 = tour.clone();

        for i in 1..n.saturating_sub(1) {
            if tour.infeasible_move(i) {
                continue;
            }
            sol.clone_from(tour);
            sol.swap(i);
            if sol.better_than(&best) {
                if self.first_improvement {
                    *tour = sol;
                    return true;
                }
                best.clone_from(&sol);
            }

            // Exchanging i and i + 1 is also the first backward step of i + 1.
            orb1.clone_from(&sol);
            for d in i + 1..n - 1 {
                if sol.infeasible_move(d) {
                    break;
                }
                sol.swap(d);
                if sol.better_than(&best) {
                    if self.first_improvement {
                        *tour = sol;
                        return true;
                    }
                    best.clone_from(&sol);
                }
            }

            sol.clone_from(&orb1);
            for d in (1..i).rev() {
                if sol.infeasible_move(d) {
                    break;
                }
                sol.swap(d);
                if sol.better_than(&best) {
                    if self.first_improvement {
                        *tour = sol;
                        return true;
                    }
                    best.clone_from(&sol);
                }
            }
        }

        if best.better_than(tour) {
            *tour = best;
            true
        } else {
            false
        }
    }

    fn name(&self) -> &str {
        if self.first_improvement {
            "insertion-first"
        } else {
            "insertion-best"
        }
    }
}

/// Variable Neighborhood Descent
///
/// Applies the operators in order and restarts from the first one after
/// every improvement, until none of them improves.
pub struct Vnd {
    operators: Vec<Box<dyn LocalSearch>>,
}

impl Vnd {
    pub fn new() -> Self {
        Vnd { operators: Vec::new() }
    }

    /// Feasible 1-shift followed by 2-opt, the descent used inside GVNS.
    pub fn with_standard_operators() -> Self {
        let operators: Vec<Box<dyn LocalSearch>> =
            vec![Box::new(FeasibleOneShift::randomized()), Box::new(TwoOptSearch)];
        Vnd { operators }
    }

    pub fn add_operator<L: LocalSearch + 'static>(&mut self, op: L) {
        self.operators.push(Box::new(op));
    }
}

impl Default for Vnd {
    fn default() -> Self {
        Self::with_standard_operators()
    }
}

impl LocalSearch for Vnd {
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        let mut total_improved = false;
        let mut k = 0;
        while k < self.operators.len() {
            if self.operators[k].improve(tour, rng) {
                total_improved = true;
                k = 0;
            } else {
                k += 1;
            }
        }
        total_improved
    }

    fn name(&self) -> &str {
        "VND"
    }
}

/// Descent applied to every constructed tour:
/// restore feasibility while possible, then one insertion pass (still
/// infeasible) or one feasible 1-shift move (feasible), then 2-opt while it
/// improves.
pub struct DescentPipeline {
    pub restore: FeasibilityRestore,
    pub insertion: InsertionSearch,
    pub one_shift: FeasibleOneShift,
}

impl DescentPipeline {
    pub fn new(order: FeasibilityOrder, first_improvement: bool) -> Self {
        DescentPipeline {
            restore: FeasibilityRestore::new(order),
            insertion: InsertionSearch { first_improvement },
            one_shift: FeasibleOneShift::sequential(),
        }
    }
}

impl Default for DescentPipeline {
    fn default() -> Self {
        Self::new(FeasibilityOrder::Code, true)
    }
}

impl LocalSearch for DescentPipeline {
    fn improve(&self, tour: &mut Tour, rng: &mut dyn RandomSource) -> bool {
        let mut current = tour.clone();
        while !current.is_feasible() && self.restore.improve(&mut current, rng) {}

        if current.is_feasible() {
            self.one_shift.improve(&mut current, rng);
        } else {
            self.insertion.improve(&mut current, rng);
        }

        let mut candidate = current.clone();
        while TwoOptSearch.improve(&mut candidate, rng) && candidate.better_than(&current) {
            current.clone_from(&candidate);
        }

        if current.better_than(tour) {
            *tour = current;
            true
        } else {
            false
        }
    }

    fn name(&self) -> &str {
        "descent"
    }
}

/// Move `level` random customers to random positions without any check,
/// then re-evaluate the tour.
pub fn perturb_relocate(tour: &mut Tour, level: usize, rng: &mut dyn RandomSource) {
    assert!(level > 0);
    let n = tour.instance().n();
    if n < 3 {
        return;
    }
    for _ in 0..level.min(n) {
        let from = 1 + rng.uniform_int(n - 1);
        let to = loop {
            let to = 1 + rng.uniform_int(n - 1);
            if to != from {
                break to;
            }
        };
        tour.reinsert_unevaluated(from, to);
    }
    tour.reevaluate();
}

/// Move up to `level` random customers to random positions through swap
/// chains, keeping every intermediate state that is feasible.
pub fn perturb_relocate_feasible(tour: &mut Tour, level: usize, rng: &mut dyn RandomSource) {
    assert!(level > 0);
    assert!(tour.is_feasible());
    let instance = tour.instance();
    let n = instance.n();
    if n < 4 {
        return;
    }

    let mut remaining = level.min(n);
    let mut index: Vec<usize> = (1..n - 1).collect();
    let mut ngh = tour.clone();

    for j in (0..n - 2).rev() {
        let r = rng.uniform_int(j + 1);
        index.swap(r, j);
        let k = index[j];
        let pos = 1 + rng.uniform_int(n - 3);
        if pos == k {
            continue;
        }

        ngh.clone_from(tour);
        let mut first_dirty = None;
        let steps: Box<dyn Iterator<Item = usize>> = if k < pos {
            Box::new(k..pos)
        } else {
            Box::new((pos..k).rev())
        };
        for d in steps {
            if ngh.infeasible_move(d) {
                break;
            }
            ngh.do_swap(d);
            if ngh.is_feasible_swap(d, &mut first_dirty) {
                tour.clone_from(&ngh);
            }
        }
        debug_check(tour);

        remaining -= 1;
        if remaining == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TsptwInstance;
    use crate::random::seeded;

    /// Customers on a line with loose windows, so every tour is feasible.
    fn create_line_instance(customers: usize) -> TsptwInstance {
        let n = customers + 1;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        TsptwInstance::new("line", distance, vec![0.0; n], vec![1000.0; n]).unwrap()
    }

    /// Same line but every customer must be reached close to its index.
    fn create_tight_instance(customers: usize) -> TsptwInstance {
        let n = customers + 1;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        let window_start = (0..n).map(|i| i as f64).collect();
        let mut window_end: Vec<f64> = (0..n).map(|i| i as f64 + 1.0).collect();
        window_end[0] = 1000.0;
        TsptwInstance::new("tight", distance, window_start, window_end).unwrap()
    }

    #[test]
    fn test_feasible_one_shift_sequential() {
        let instance = create_line_instance(5);
        let mut tour = Tour::from_customers(&instance, &[1, 3, 2, 4, 5]);
        let mut rng = seeded(1);
        let search = FeasibleOneShift::sequential();
        let before = tour.tour_cost();
        assert!(search.improve(&mut tour, &mut rng));
        assert!(tour.tour_cost() < before);
        assert!(tour.is_feasible());
        tour.check_solution().unwrap();
    }

    #[test]
    fn test_feasible_one_shift_randomized_reaches_local_optimum() {
        let instance = create_line_instance(6);
        let mut tour = Tour::from_customers(&instance, &[4, 1, 6, 2, 5, 3]);
        let mut rng = seeded(5);
        let search = FeasibleOneShift::randomized();
        let mut moves = 0;
        while search.improve(&mut tour, &mut rng) {
            moves += 1;
            tour.check_solution().unwrap();
            assert!(moves < 100);
        }
        assert!(moves > 0);
        assert!(tour.is_feasible());
    }

    #[test]
    fn test_feasible_one_shift_skips_infeasible() {
        let instance = create_tight_instance(4);
        let mut tour = Tour::from_customers(&instance, &[4, 3, 2, 1]);
        assert!(!tour.is_feasible());
        let mut rng = seeded(1);
        assert!(!FeasibleOneShift::randomized().improve(&mut tour, &mut rng));
    }

    #[test]
    fn test_feasibility_restore() {
        let instance = create_tight_instance(5);
        for order in [FeasibilityOrder::Code, FeasibilityOrder::Paper] {
            let restore = FeasibilityRestore::new(order);
            let mut rng = seeded(3);
            let mut tour = Tour::from_customers(&instance, &[2, 1, 3, 5, 4]);
            let violations = tour.constraint_violations();
            assert!(violations > 0);
            let infeasibility = tour.infeasibility();
            while !tour.is_feasible() && restore.improve(&mut tour, &mut rng) {
                tour.check_solution().unwrap();
            }
            assert!(tour.infeasibility() < infeasibility);
            assert!(tour.is_feasible());
            assert_eq!(tour.customers(), &[1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_feasibility_restore_noop_on_feasible() {
        let instance = create_line_instance(4);
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 4]);
        let mut rng = seeded(3);
        assert!(!FeasibilityRestore::default().improve(&mut tour, &mut rng));
    }

    #[test]
    fn test_two_opt_converges() {
        let instance = create_line_instance(6);
        let mut rng = seeded(9);
        let mut tour = Tour::from_customers(&instance, &[6, 1, 5, 2, 4, 3]);
        assert_eq!(tour.tour_cost(), 24.0);
        assert!(TwoOptSearch.improve(&mut tour, &mut rng));
        tour.check_solution().unwrap();
        assert!(tour.tour_cost() < 24.0);
        // A call only returns once a full sweep finds nothing.
        assert!(!TwoOptSearch.improve(&mut tour, &mut rng));
    }

    #[test]
    fn test_two_opt_skips_asymmetric() {
        let instance = TsptwInstance::new(
            "asym",
            vec![
                vec![0.0, 1.0, 5.0, 2.0],
                vec![1.0, 0.0, 1.0, 3.0],
                vec![5.0, 2.0, 0.0, 1.0],
                vec![2.0, 3.0, 1.0, 0.0],
            ],
            vec![0.0; 4],
            vec![100.0; 4],
        )
        .unwrap();
        let mut tour = Tour::from_customers(&instance, &[2, 1, 3]);
        let mut rng = seeded(1);
        assert!(!TwoOptSearch.improve(&mut tour, &mut rng));
    }

    #[test]
    fn test_insertion_search_modes() {
        let instance = create_tight_instance(5);
        let mut rng = seeded(2);
        for search in [InsertionSearch::first_improvement(), InsertionSearch::best_improvement()] {
            let mut tour = Tour::from_customers(&instance, &[3, 1, 2, 4, 5]);
            let start = tour.clone();
            assert!(search.improve(&mut tour, &mut rng));
            assert!(tour.better_than(&start));
            tour.check_solution().unwrap();
        }
    }

    #[test]
    fn test_vnd_and_descent() {
        let instance = create_line_instance(7);
        let mut rng = seeded(4);
        let mut tour = Tour::from_customers(&instance, &[7, 2, 5, 1, 6, 3, 4]);
        let start = tour.tour_cost();
        assert!(Vnd::with_standard_operators().improve(&mut tour, &mut rng));
        tour.check_solution().unwrap();
        assert!(tour.tour_cost() < start);

        // Only moving customer 1 to the front repairs this tour.
        let instance = create_tight_instance(6);
        let mut tour = Tour::from_customers(&instance, &[2, 1, 3, 4, 5, 6]);
        assert_eq!(tour.constraint_violations(), 5);
        assert!(DescentPipeline::default().improve(&mut tour, &mut rng));
        tour.check_solution().unwrap();
        assert!(tour.is_feasible());
        assert_eq!(tour.customers(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_perturbations_keep_consistency() {
        let instance = create_line_instance(8);
        let mut rng = seeded(12);
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 4, 5, 6, 7, 8]);
        for level in 1..6 {
            perturb_relocate(&mut tour, level, &mut rng);
            tour.check_solution().unwrap();
            perturb_relocate_feasible(&mut tour, level, &mut rng);
            tour.check_solution().unwrap();
            assert!(tour.is_feasible());
        }
    }
}

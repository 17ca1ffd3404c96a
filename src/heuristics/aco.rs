//! Ant construction for the TSPTW.
//!
//! This module implements the probabilistic tour construction shared by the
//! ant solver and Beam-ACO: a [`Colony`] context holding the pheromone and
//! heuristic tables, and an [`Ant`] that extends partial tours one customer
//! at a time. Pheromone is static, there is no reinforcement.

use crate::budget::Budget;
use crate::config::{AntConfig, LocalSearchConfig};
use crate::heuristics::local_search::{DescentPipeline, LocalSearch};
use crate::heuristics::{BestTracker, SolveOutcome, Solver};
use crate::instance::TsptwInstance;
use crate::random::RandomSource;
use crate::report::ProgressSink;
use crate::tour::Tour;
use serde::{Deserialize, Serialize};

const INITIAL_PHEROMONE: f64 = 0.5;
const WEIGHT_EPSILON: f64 = 1e-6;

/// Relative importance of the three heuristic components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeuristicWeights {
    pub distance: f64,
    pub window_start: f64,
    pub window_end: f64,
}

impl HeuristicWeights {
    /// Three uniform draws normalised to sum 1 (all zero when the draws are).
    pub fn random(rng: &mut dyn RandomSource) -> Self {
        let distance = rng.uniform01();
        let window_start = rng.uniform01();
        let window_end = rng.uniform01();
        let total = distance + window_start + window_end;
        if total < WEIGHT_EPSILON {
            return HeuristicWeights::default();
        }
        HeuristicWeights {
            distance: distance / total,
            window_start: window_start / total,
            window_end: window_end / total,
        }
    }

    fn all_negligible(&self) -> bool {
        self.distance < WEIGHT_EPSILON
            && self.window_start < WEIGHT_EPSILON
            && self.window_end < WEIGHT_EPSILON
    }
}

/// Pheromone and heuristic tables of one construction context.
#[derive(Debug, Clone)]
pub struct Colony<'a> {
    instance: &'a TsptwInstance,
    pheromone: Vec<f64>,
    weights: HeuristicWeights,
    heuristic: Vec<f64>,
    total: Vec<f64>,
}

impl<'a> Colony<'a> {
    /// Uniform pheromone, heuristic weights still unset.
    pub fn new(instance: &'a TsptwInstance) -> Self {
        let n = instance.n();
        let mut colony = Colony {
            instance,
            pheromone: vec![INITIAL_PHEROMONE; n * n],
            weights: HeuristicWeights::default(),
            heuristic: vec![0.0; n * n],
            total: vec![0.0; n * n],
        };
        colony.set_weights(HeuristicWeights::default());
        colony
    }

    pub fn instance(&self) -> &'a TsptwInstance {
        self.instance
    }

    pub fn reset_pheromone(&mut self) {
        self.pheromone.fill(INITIAL_PHEROMONE);
        self.precompute_total();
    }

    #[inline]
    pub fn pheromone(&self, i: usize, j: usize) -> f64 {
        self.pheromone[i * self.instance.n() + j]
    }

    /// Desirability of travelling from `prev` to `next`, in `[0, 1]`.
    #[inline]
    pub fn heuristic_information(&self, prev: usize, next: usize) -> f64 {
        self.heuristic[prev * self.instance.n() + next]
    }

    /// `pheromone * heuristic_information`
    #[inline]
    pub fn total(&self, i: usize, j: usize) -> f64 {
        self.total[i * self.instance.n() + j]
    }

    pub fn weights(&self) -> HeuristicWeights {
        self.weights
    }

    /// Draw new heuristic weights and rebuild the derived tables.
    pub fn randomize_weights(&mut self, rng: &mut dyn RandomSource) {
        self.set_weights(HeuristicWeights::random(rng));
    }

    pub fn set_weights(&mut self, weights: HeuristicWeights) {
        self.weights = weights;
        let n = self.instance.n();
        for i in 0..n {
            for j in 0..n {
                self.heuristic[i * n + j] = self.weighted_information(i, j);
            }
        }
        self.precompute_total();
    }

    fn weighted_information(&self, prev: usize, next: usize) -> f64 {
        if prev == next {
            return 0.0;
        }
        let w = &self.weights;
        if w.all_negligible() {
            return 1.0;
        }
        let instance = self.instance;
        w.distance * instance.distance_bounds().normalise_inverse(instance.distance(prev, next))
            + w.window_start * instance.window_start_bounds().normalise_inverse(instance.window_start(next))
            + w.window_end * instance.window_end_bounds().normalise_inverse(instance.window_end(next))
    }

    fn precompute_total(&mut self) {
        for ((t, p), h) in self.total.iter_mut().zip(&self.pheromone).zip(&self.heuristic) {
            *t = p * h;
        }
    }
}

/// Greedy-or-random decision shared by the ant and the beam.
#[inline]
pub(crate) fn deterministic_step(det_rate: f64, rng: &mut dyn RandomSource) -> bool {
    det_rate >= 1.0 || (det_rate > 0.0 && rng.uniform01() < det_rate)
}

/// Roulette-wheel selection over `weights`, whose sum is `basesum`.
///
/// Scans the cumulative sum against a uniform draw scaled by `basesum` and
/// returns the first index where it exceeds the draw. Rounding can leave the
/// draw above the final sum; the last index with positive weight is
/// returned then. `None` when every weight is zero.
pub fn roulette_wheel(weights: &[f64], basesum: f64, rng: &mut dyn RandomSource) -> Option<usize> {
    let draw = rng.uniform01() * basesum;
    let mut wheel = 0.0;
    let mut last_positive = None;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        wheel += w;
        last_positive = Some(i);
        if wheel > draw {
            return Some(i);
        }
    }
    last_positive
}

/// Sequential probabilistic tour construction.
pub struct Ant {
    det_rate: f64,
    probs: Vec<f64>,
    basesum: f64,
}

impl Ant {
    pub fn new(det_rate: f64) -> Self {
        Ant {
            det_rate,
            probs: Vec::new(),
            basesum: 0.0,
        }
    }

    fn update_probs(&mut self, colony: &Colony, tour: &Tour) {
        let last = tour.last();
        self.probs.clear();
        self.probs.resize(colony.instance().n(), 0.0);
        self.basesum = 0.0;
        for node in tour.unassigned() {
            let p = colony.total(last, node);
            self.probs[node] = p;
            self.basesum += p;
        }
        debug_assert_eq!(self.probs[last], 0.0);
        debug_assert!(self.basesum.is_finite());
    }

    /// Unassigned customer of highest probability, lowest index on ties.
    fn maximum_prob(&self, tour: &Tour) -> Option<usize> {
        let mut best = None;
        let mut max_prob = 0.0;
        for (node, &p) in self.probs.iter().enumerate().skip(1) {
            // Zero probability and the assignment flag both exclude a node.
            if max_prob < p && !tour.is_assigned(node) {
                max_prob = p;
                best = Some(node);
            }
        }
        best
    }

    /// Append one customer to `tour`, returning it.
    pub fn construction_step(&mut self, colony: &Colony, tour: &mut Tour, rng: &mut dyn RandomSource) -> usize {
        self.update_probs(colony, tour);
        let chosen = if deterministic_step(self.det_rate, rng) {
            self.maximum_prob(tour)
        } else {
            roulette_wheel(&self.probs, self.basesum, rng)
        };
        // Every remaining customer may have zero desirability.
        let node = match chosen {
            Some(node) => node,
            None => tour.unassigned().next().unwrap_or(0),
        };
        assert!(node > 0, "no customer left to add");
        tour.add(node);
        node
    }

    /// Extend `tour` until it is complete.
    pub fn complete(&mut self, colony: &Colony, tour: &mut Tour, rng: &mut dyn RandomSource) {
        while tour.nodes_available() > 0 {
            self.construction_step(colony, tour, rng);
        }
    }

    /// Build a complete tour from scratch with freshly drawn heuristic weights.
    pub fn construct<'a>(&mut self, colony: &mut Colony<'a>, rng: &mut dyn RandomSource) -> Tour<'a> {
        colony.randomize_weights(rng);
        let mut tour = Tour::new(colony.instance());
        self.complete(colony, &mut tour, rng);
        tour
    }
}

/// Best completion found by [`stochastic_sampling`].
#[derive(Debug, Clone)]
pub struct Sampling<'a> {
    pub best: Tour<'a>,
    pub lower_bound: f64,
    pub lower_bound_violations: usize,
}

/// Rearrange `values` into the next lexicographic permutation. Returns
/// `false` (and leaves them sorted) after the last one.
fn next_permutation(values: &mut [usize]) -> bool {
    if values.len() < 2 {
        return false;
    }
    let mut i = values.len() - 1;
    while i > 0 && values[i - 1] >= values[i] {
        i -= 1;
    }
    if i == 0 {
        values.reverse();
        return false;
    }
    let mut j = values.len() - 1;
    while values[j] <= values[i - 1] {
        j -= 1;
    }
    values.swap(i - 1, j);
    values[i..].reverse();
    true
}

fn keep_better<'a>(best: &mut Option<Tour<'a>>, candidate: Tour<'a>) {
    if best.as_ref().map_or(true, |b| candidate.better_than(b)) {
        *best = Some(candidate);
    }
}

/// Estimate how good `partial` can become.
///
/// With at most three customers left every completion is enumerated,
/// otherwise `n_samples` ant completions are drawn. The best completion by
/// (violations, cost) is returned together with its cost and violations.
pub fn stochastic_sampling<'a>(
    colony: &Colony,
    partial: &Tour<'a>,
    n_samples: usize,
    det_rate: f64,
    rng: &mut dyn RandomSource,
) -> Sampling<'a> {
    let mut best: Option<Tour<'a>> = None;

    if partial.nodes_available() <= 3 {
        let mut remaining: Vec<usize> = partial.unassigned().collect();
        loop {
            let mut sol = partial.clone();
            sol.extend(&remaining);
            keep_better(&mut best, sol);
            if !next_permutation(&mut remaining) {
                break;
            }
        }
    } else {
        let mut ant = Ant::new(det_rate);
        for _ in 0..n_samples.max(1) {
            let mut sol = partial.clone();
            ant.complete(colony, &mut sol, rng);
            keep_better(&mut best, sol);
        }
    }

    let best = best.unwrap_or_else(|| partial.clone());
    Sampling {
        lower_bound: best.cost(),
        lower_bound_violations: best.constraint_violations(),
        best,
    }
}

/// Plain ant colony: `n_ants` constructions per iteration, each followed by
/// the descent pipeline.
pub struct AntSolver {
    pub ant: AntConfig,
    pub local_search: LocalSearchConfig,
}

impl AntSolver {
    pub fn new(ant: AntConfig, local_search: LocalSearchConfig) -> Self {
        AntSolver { ant, local_search }
    }

    fn iterate<'a>(
        &self,
        colony: &mut Colony<'a>,
        descent: &DescentPipeline,
        rng: &mut dyn RandomSource,
    ) -> Tour<'a> {
        let mut ant = Ant::new(self.ant.det_rate);
        let mut best: Option<Tour<'a>> = None;
        for _ in 0..self.ant.n_ants.max(1) {
            let mut tour = ant.construct(colony, rng);
            descent.improve(&mut tour, rng);
            keep_better(&mut best, tour);
        }
        best.unwrap_or_else(|| Tour::new(colony.instance()))
    }
}

impl Solver for AntSolver {
    fn name(&self) -> &str {
        "ACO"
    }

    fn solve<'a>(
        &self,
        instance: &'a TsptwInstance,
        rng: &mut dyn RandomSource,
        budget: &Budget,
        trial: usize,
        sink: &mut dyn ProgressSink,
    ) -> SolveOutcome<'a> {
        let mut colony = Colony::new(instance);
        let descent = DescentPipeline::new(self.local_search.restore_order, self.local_search.first_improvement);

        let mut iteration = 1;
        let mut tracker = BestTracker::new(self.iterate(&mut colony, &descent, rng), trial, budget, sink);
        while !budget.exhausted(iteration) {
            iteration += 1;
            let tour = self.iterate(&mut colony, &descent, rng);
            tracker.offer(&tour, iteration, budget, sink);
        }
        log::debug!("ACO: {} iterations, best {}", iteration, tracker.best());
        tracker.into_outcome(iteration)
    }
}

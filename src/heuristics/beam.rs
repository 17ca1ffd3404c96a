//! Beam-ACO construction.
//!
//! A width-bounded breadth-first construction where every partial tour of
//! the current generation proposes its most desirable extensions, a
//! pheromone-biased draw keeps some of them, and stochastic sampling ranks
//! the survivors once the remaining depth is small enough. The search runs
//! as an explicit state machine over [`BeamState`].

use crate::budget::Budget;
use crate::config::{BeamConfig, LocalSearchConfig};
use crate::heuristics::aco::{deterministic_step, stochastic_sampling, Colony};
use crate::heuristics::local_search::{DescentPipeline, LocalSearch};
use crate::heuristics::{BestTracker, SolveOutcome, Solver};
use crate::instance::TsptwInstance;
use crate::random::RandomSource;
use crate::report::ProgressSink;
use crate::tour::Tour;
use std::cmp::Ordering;

/// A partial tour kept in the beam.
#[derive(Debug, Clone)]
pub struct BeamCandidate<'a> {
    pub tour: Tour<'a>,
    /// Sum of the greedy ranks along the construction path
    pub greedy_rank_sum: f64,
    /// Cost of the best sampled completion, once sampled
    pub lower_bound: f64,
    pub lower_bound_violations: usize,
}

impl<'a> BeamCandidate<'a> {
    fn root(instance: &'a TsptwInstance) -> Self {
        BeamCandidate {
            tour: Tour::new(instance),
            greedy_rank_sum: 0.0,
            lower_bound: 0.0,
            lower_bound_violations: 0,
        }
    }

    fn lower_bound_order(&self, other: &Self) -> Ordering {
        self.lower_bound_violations
            .cmp(&other.lower_bound_violations)
            .then(self.lower_bound.total_cmp(&other.lower_bound))
    }
}

/// A proposed extension of a beam element, materialised only when chosen.
#[derive(Debug, Clone, Copy)]
struct Child {
    /// Index of the parent in the current generation
    parent: usize,
    node: usize,
    greedy_weight: f64,
    greedy_rank_sum: f64,
    value: f64,
}

/// States of the construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamState {
    /// Produce and choose the next generation
    Expanding,
    /// Rank an oversized generation with stochastic sampling
    Sampling,
    /// Cut the generation down to the beam width
    Pruning,
    /// No more extensions
    Terminal,
}

/// One Beam-ACO construction over a colony.
pub struct BeamAco<'c, 'a> {
    colony: &'c Colony<'a>,
    config: &'c BeamConfig,
    beam: Vec<BeamCandidate<'a>>,
    next: Vec<BeamCandidate<'a>>,
    best_sampled: Option<Tour<'a>>,
    depth: usize,
}

impl<'c, 'a> BeamAco<'c, 'a> {
    pub fn new(colony: &'c Colony<'a>, config: &'c BeamConfig) -> Self {
        BeamAco {
            colony,
            config,
            beam: vec![BeamCandidate::root(colony.instance())],
            next: Vec::new(),
            best_sampled: None,
            depth: 0,
        }
    }

    /// Draw fresh heuristic weights on `colony` and build one tour.
    pub fn construct(
        colony: &mut Colony<'a>,
        config: &BeamConfig,
        rng: &mut dyn RandomSource,
    ) -> Tour<'a> {
        colony.randomize_weights(rng);
        BeamAco::new(colony, config).run(rng)
    }

    /// Run the state machine to completion.
    pub fn run(mut self, rng: &mut dyn RandomSource) -> Tour<'a> {
        let mut state = BeamState::Expanding;
        loop {
            state = match state {
                BeamState::Expanding => self.expand(rng),
                BeamState::Sampling => self.sample(rng),
                BeamState::Pruning => self.prune(),
                BeamState::Terminal => return self.finish(),
            };
            if state == BeamState::Pruning && self.next.is_empty() {
                // Sampling discarded everything: nothing can beat the best sample.
                if let Some(best) = self.best_sampled.take() {
                    return best;
                }
                return self.finish();
            }
        }
    }

    /// Children of `parent`, most desirable first, at most `max_children`.
    fn produce_children(&self, parent: usize, children: &mut Vec<Child>) {
        let element = &self.beam[parent];
        let last = element.tour.last();
        let mut own: Vec<Child> = element
            .tour
            .unassigned()
            .map(|node| Child {
                parent,
                node,
                greedy_weight: self.colony.heuristic_information(last, node),
                greedy_rank_sum: element.greedy_rank_sum,
                value: 0.0,
            })
            .collect();
        own.sort_by(|a, b| b.greedy_weight.total_cmp(&a.greedy_weight));
        own.truncate(self.config.max_children);
        for (rank, child) in own.iter_mut().enumerate() {
            child.greedy_rank_sum += (rank + 1) as f64;
            child.value = self.colony.pheromone(last, child.node);
        }
        children.extend(own);
    }

    fn commit(&self, child: &Child) -> BeamCandidate<'a> {
        let mut tour = self.beam[child.parent].tour.clone();
        tour.add(child.node);
        BeamCandidate {
            tour,
            greedy_rank_sum: child.greedy_rank_sum,
            lower_bound: 0.0,
            lower_bound_violations: 0,
        }
    }

    /// Pick up to `to_choose` children without replacement.
    fn choose_from(&mut self, mut children: Vec<Child>, mut basesum: f64, rng: &mut dyn RandomSource) {
        self.next.clear();
        if children.len() <= self.config.to_choose {
            let committed: Vec<BeamCandidate<'a>> = children.iter().map(|c| self.commit(c)).collect();
            self.next = committed;
            return;
        }

        children.sort_by(|a, b| b.value.total_cmp(&a.value));
        for _ in 0..self.config.to_choose {
            let index = if deterministic_step(self.config.det_rate, rng) {
                0
            } else {
                let draw = rng.uniform01() * basesum;
                let mut i = 0;
                let mut wheel = children[0].value;
                while wheel < draw && i + 1 < children.len() {
                    i += 1;
                    wheel += children[i].value;
                }
                i
            };
            let child = children.remove(index);
            basesum -= child.value;
            let candidate = self.commit(&child);
            self.next.push(candidate);
        }
    }

    fn expand(&mut self, rng: &mut dyn RandomSource) -> BeamState {
        let mut children = Vec::new();
        for parent in 0..self.beam.len() {
            self.produce_children(parent, &mut children);
        }

        let rank_basesum: f64 = children.iter().map(|c| 1.0 / c.greedy_rank_sum).sum();
        let mut basesum = 0.0;
        for child in &mut children {
            child.value *= (1.0 / child.greedy_rank_sum) / rank_basesum;
            basesum += child.value;
        }

        self.choose_from(children, basesum, rng);
        self.depth += 1;

        if self.next.is_empty() {
            return BeamState::Terminal;
        }
        if self.next.len() <= self.config.beam_width {
            return BeamState::Pruning;
        }
        let remaining = self.colony.instance().n().saturating_sub(self.depth);
        if remaining <= self.config.sample_rate {
            BeamState::Sampling
        } else {
            shuffle_generation(&mut self.next, rng);
            BeamState::Pruning
        }
    }

    fn sample(&mut self, rng: &mut dyn RandomSource) -> BeamState {
        let mut kept = Vec::with_capacity(self.next.len());
        for mut candidate in self.next.drain(..) {
            let promising = self
                .best_sampled
                .as_ref()
                .map_or(true, |best| candidate.tour.better_than(best));
            if !promising {
                continue;
            }
            let sampling = stochastic_sampling(
                self.colony,
                &candidate.tour,
                self.config.n_samples,
                self.config.det_rate,
                rng,
            );
            candidate.lower_bound = sampling.lower_bound;
            candidate.lower_bound_violations = sampling.lower_bound_violations;
            let improves = self
                .best_sampled
                .as_ref()
                .map_or(true, |best| sampling.best.better_than(best));
            if improves {
                log::trace!("beam depth {}: best of sampling {}", self.depth, sampling.best);
                self.best_sampled = Some(sampling.best);
            }
            kept.push(candidate);
        }
        kept.sort_by(|a, b| a.lower_bound_order(b));
        self.next = kept;
        BeamState::Pruning
    }

    fn prune(&mut self) -> BeamState {
        self.next.truncate(self.config.beam_width);
        std::mem::swap(&mut self.beam, &mut self.next);
        self.next.clear();
        BeamState::Expanding
    }

    /// Best of the final generation, or the best sample if that is better.
    fn finish(mut self) -> Tour<'a> {
        let mut best_of_beam: Option<Tour<'a>> = None;
        for candidate in self.beam.drain(..) {
            if best_of_beam.as_ref().map_or(true, |b| candidate.tour.better_than(b)) {
                best_of_beam = Some(candidate.tour);
            }
        }
        match (best_of_beam, self.best_sampled) {
            (Some(beam), Some(sampled)) => {
                if beam.better_than(&sampled) {
                    beam
                } else {
                    sampled
                }
            }
            (Some(beam), None) => beam,
            (None, Some(sampled)) => sampled,
            (None, None) => Tour::new(self.colony.instance()),
        }
    }
}

fn shuffle_generation<T>(values: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..values.len()).rev() {
        let j = rng.uniform_int(i + 1);
        values.swap(i, j);
    }
}

/// Repeated Beam-ACO construction followed by the descent pipeline.
pub struct BeamAcoSolver {
    pub beam: BeamConfig,
    pub local_search: LocalSearchConfig,
}

impl BeamAcoSolver {
    pub fn new(beam: BeamConfig, local_search: LocalSearchConfig) -> Self {
        BeamAcoSolver { beam, local_search }
    }

    fn iterate<'a>(
        &self,
        colony: &mut Colony<'a>,
        descent: &DescentPipeline,
        rng: &mut dyn RandomSource,
    ) -> Tour<'a> {
        let mut tour = BeamAco::construct(colony, &self.beam, rng);
        descent.improve(&mut tour, rng);
        tour
    }
}

impl Solver for BeamAcoSolver {
    fn name(&self) -> &str {
        "Beam-ACO"
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
        log::debug!("Beam-ACO: {} iterations, best {}", iteration, tracker.best());
        tracker.into_outcome(iteration)
    }
}

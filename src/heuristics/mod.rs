//! Heuristics module for the TSPTW.
//!
//! This module exports the construction procedures, the local searches and
//! the metaheuristic shells built on top of them. Every shell implements
//! [`Solver`], so the trial driver can run any of them the same way.

pub mod construction;
pub mod local_search;
pub mod aco;
pub mod beam;
pub mod gvns;
pub mod descent;

pub use construction::*;
pub use local_search::*;
pub use aco::*;
pub use beam::*;
pub use gvns::*;
pub use descent::*;

use crate::budget::Budget;
use crate::instance::TsptwInstance;
use crate::random::RandomSource;
use crate::report::{Improvement, ProgressSink};
use crate::tour::Tour;

/// Result of one solver run.
#[derive(Debug, Clone)]
pub struct SolveOutcome<'a> {
    pub best: Tour<'a>,
    /// Outer iterations performed
    pub iterations: usize,
    /// Iteration at which `best` was found
    pub best_iteration: usize,
    /// Seconds until `best` was found
    pub best_time: f64,
}

/// A complete search strategy, run until its budget is spent.
pub trait Solver {
    fn name(&self) -> &str;

    /// Run one trial. Every solver performs at least one iteration, so a
    /// tour is always returned even with an exhausted budget.
    fn solve<'a>(
        &self,
        instance: &'a TsptwInstance,
        rng: &mut dyn RandomSource,
        budget: &Budget,
        trial: usize,
        sink: &mut dyn ProgressSink,
    ) -> SolveOutcome<'a>;
}

/// Best-so-far bookkeeping shared by the solvers.
pub(crate) struct BestTracker<'a> {
    best: Tour<'a>,
    best_iteration: usize,
    best_time: f64,
    trial: usize,
}

impl<'a> BestTracker<'a> {
    pub(crate) fn new(
        first: Tour<'a>,
        trial: usize,
        budget: &Budget,
        sink: &mut dyn ProgressSink,
    ) -> Self {
        let best_time = budget.elapsed();
        sink.improvement(&Improvement::new(&first, trial, 1, best_time));
        BestTracker {
            best: first,
            best_iteration: 1,
            best_time,
            trial,
        }
    }

    pub(crate) fn best(&self) -> &Tour<'a> {
        &self.best
    }

    /// Keep `tour` if it beats the best so far.
    pub(crate) fn offer(
        &mut self,
        tour: &Tour<'a>,
        iteration: usize,
        budget: &Budget,
        sink: &mut dyn ProgressSink,
    ) -> bool {
        if !tour.better_than(&self.best) {
            return false;
        }
        self.best.clone_from(tour);
        self.best_iteration = iteration;
        self.best_time = budget.elapsed();
        sink.improvement(&Improvement::new(&self.best, self.trial, iteration, self.best_time));
        true
    }

    pub(crate) fn into_outcome(self, iterations: usize) -> SolveOutcome<'a> {
        SolveOutcome {
            best: self.best,
            iterations,
            best_iteration: self.best_iteration,
            best_time: self.best_time,
        }
    }
}

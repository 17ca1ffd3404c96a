//! Incrementally evaluated TSPTW tour.
//!
//! A `Tour` keeps, next to its permutation, the arrival time at every
//! position, the travel cost, the number of time-window violations and the
//! total lateness. Every mutating move updates that state in place and only
//! touches the suffix of the tour whose arrival times actually change: the
//! forward scan stops at the first position whose arrival time is the same as
//! before the move (typically a customer we wait at both before and after).
//!
//! Positions follow the classical layout: `permutation[0]` and, once the tour
//! is complete, `permutation[n]` are the depot, customers occupy `1..n`.

use crate::instance::{fequals, fless, Objective, TsptwInstance};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of [`Tour::probe_two_opt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoOptProbe {
    /// The move keeps the tour feasible. Arrival times in the scratch buffer
    /// are valid up to and including `end`.
    Feasible { end: usize },
    /// Infeasible, but another right endpoint may still work.
    Infeasible,
    /// A customer inside the reversed segment is late, so every longer
    /// segment starting at the same position is late as well.
    InfeasibleBeyond,
}

/// One leg of the verbose schedule returned by [`Tour::schedule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub from: usize,
    pub to: usize,
    pub distance: f64,
    pub tour_cost: f64,
    pub window_start: f64,
    pub window_end: f64,
    /// Time spent waiting for the window to open, or the (negative) lateness.
    pub waiting: f64,
    pub arrival: f64,
}

pub struct Tour<'a> {
    instance: &'a TsptwInstance,
    permutation: Vec<usize>,
    node_assigned: Vec<bool>,
    nodes_available: usize,
    makespan: Vec<f64>,
    tour_cost: f64,
    constraint_violations: usize,
    infeasibility: f64,
}

impl<'a> Clone for Tour<'a> {
    fn clone(&self) -> Self {
        Tour {
            instance: self.instance,
            permutation: self.permutation.clone(),
            node_assigned: self.node_assigned.clone(),
            nodes_available: self.nodes_available,
            makespan: self.makespan.clone(),
            tour_cost: self.tour_cost,
            constraint_violations: self.constraint_violations,
            infeasibility: self.infeasibility,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.instance = source.instance;
        self.permutation.clone_from(&source.permutation);
        self.node_assigned.clone_from(&source.node_assigned);
        self.nodes_available = source.nodes_available;
        self.makespan.clone_from(&source.makespan);
        self.tour_cost = source.tour_cost;
        self.constraint_violations = source.constraint_violations;
        self.infeasibility = source.infeasibility;
    }
}

impl<'a> Tour<'a> {
    /// An empty tour sitting at the depot.
    pub fn new(instance: &'a TsptwInstance) -> Self {
        let n = instance.n();
        let mut node_assigned = vec![false; n];
        node_assigned[0] = true;
        let mut permutation = Vec::with_capacity(n + 1);
        permutation.push(0);
        let mut makespan = Vec::with_capacity(n + 1);
        makespan.push(0.0);

        let mut tour = Tour {
            instance,
            permutation,
            node_assigned,
            nodes_available: n - 1,
            makespan,
            tour_cost: 0.0,
            constraint_violations: 0,
            infeasibility: 0.0,
        };
        if tour.nodes_available == 0 {
            tour.push_node(0);
        }
        tour
    }

    /// A complete tour visiting `customers` in order.
    pub fn from_customers(instance: &'a TsptwInstance, customers: &[usize]) -> Self {
        let mut tour = Self::new(instance);
        tour.extend(customers);
        assert!(tour.is_complete(), "not enough customers to complete the tour");
        tour
    }

    /// A uniformly random complete tour.
    pub fn random(instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Self {
        let customers: Vec<usize> = rng
            .random_permutation(instance.num_customers())
            .into_iter()
            .map(|c| c + 1)
            .collect();
        Self::from_customers(instance, &customers)
    }

    pub fn instance(&self) -> &'a TsptwInstance {
        self.instance
    }

    /// Append `node` after the current last customer.
    ///
    /// When a single customer is left afterwards it is appended too, and the
    /// tour is closed at the depot as soon as nothing is left.
    pub fn add(&mut self, node: usize) {
        assert!(node > 0 && node < self.instance.n(), "invalid customer {}", node);
        assert!(!self.node_assigned[node], "customer {} already assigned", node);
        assert_ne!(node, self.last());

        self.push_node(node);
        self.node_assigned[node] = true;
        self.nodes_available -= 1;

        if self.nodes_available == 1 {
            let remaining = self.unassigned().next();
            if let Some(remaining) = remaining {
                self.add(remaining);
            }
        } else if self.nodes_available == 0 {
            self.push_node(0);
        }
    }

    /// Append customers in order until the tour is complete or `customers` runs out.
    pub fn extend(&mut self, customers: &[usize]) {
        for &node in customers {
            if self.nodes_available == 0 {
                break;
            }
            self.add(node);
        }
    }

    fn push_node(&mut self, node: usize) {
        let prev = self.last();
        let arrival = (self.makespan[self.makespan.len() - 1] + self.instance.distance(prev, node))
            .max(self.instance.window_start(node));
        self.tour_cost += self.instance.distance(prev, node);
        self.permutation.push(node);
        self.makespan.push(arrival);
        self.record_violation(self.permutation.len() - 1);
    }

    // -- Accessors ----------------------------------------------------------

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Customers in visiting order, without the depot.
    pub fn customers(&self) -> &[usize] {
        let end = if self.is_complete() { self.permutation.len() - 1 } else { self.permutation.len() };
        &self.permutation[1..end]
    }

    /// Arrival time at position `k`.
    #[inline]
    pub fn arrival(&self, k: usize) -> f64 {
        self.makespan[k]
    }

    pub fn arrivals(&self) -> &[f64] {
        &self.makespan
    }

    /// Arrival time at the last position (the depot once complete).
    pub fn makespan(&self) -> f64 {
        self.makespan[self.makespan.len() - 1]
    }

    pub fn tour_cost(&self) -> f64 {
        self.tour_cost
    }

    /// Value minimised under the instance objective.
    pub fn cost(&self) -> f64 {
        match self.instance.objective {
            Objective::TourCost => self.tour_cost,
            Objective::Makespan => self.makespan(),
        }
    }

    pub fn constraint_violations(&self) -> usize {
        self.constraint_violations
    }

    pub fn infeasibility(&self) -> f64 {
        self.infeasibility
    }

    pub fn is_feasible(&self) -> bool {
        self.constraint_violations == 0
    }

    pub fn is_complete(&self) -> bool {
        self.permutation.len() == self.instance.n() + 1
    }

    pub fn nodes_available(&self) -> usize {
        self.nodes_available
    }

    pub fn is_assigned(&self, node: usize) -> bool {
        self.node_assigned[node]
    }

    /// Unassigned customers in increasing order.
    pub fn unassigned(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.instance.n()).filter(move |&i| !self.node_assigned[i])
    }

    /// Last node of the permutation.
    #[inline]
    pub fn last(&self) -> usize {
        self.permutation[self.permutation.len() - 1]
    }

    #[inline]
    fn last_position(&self) -> usize {
        self.permutation.len() - 1
    }

    /// Lexicographic order on (constraint violations, cost).
    pub fn better_than(&self, other: &Tour) -> bool {
        self.constraint_violations < other.constraint_violations
            || (self.constraint_violations == other.constraint_violations
                && fless(self.cost(), other.cost()))
    }

    /// Whether exchanging positions `k` and `k + 1` creates a strongly
    /// infeasible edge.
    #[inline]
    pub fn infeasible_move(&self, k: usize) -> bool {
        self.instance
            .tw_infeasible(self.permutation[k + 1], self.permutation[k])
    }

    // -- Incremental bookkeeping --------------------------------------------

    #[inline]
    fn arrival_from_previous(&self, pos: usize) -> f64 {
        let prev = self.permutation[pos - 1];
        let node = self.permutation[pos];
        (self.makespan[pos - 1] + self.instance.distance(prev, node))
            .max(self.instance.window_start(node))
    }

    #[inline]
    fn record_violation(&mut self, pos: usize) {
        let late = self.makespan[pos] - self.instance.window_end(self.permutation[pos]);
        if late > 0.0 {
            self.constraint_violations += 1;
            self.infeasibility += late;
        }
    }

    #[inline]
    fn retract_violation(&mut self, pos: usize) {
        let late = self.makespan[pos] - self.instance.window_end(self.permutation[pos]);
        if late > 0.0 {
            self.constraint_violations -= 1;
            self.infeasibility -= late;
        }
    }

    /// Recompute positions `from..=to` from their predecessors.
    fn schedule_positions(&mut self, from: usize, to: usize) {
        for pos in from..=to {
            self.makespan[pos] = self.arrival_from_previous(pos);
            self.record_violation(pos);
        }
    }

    /// Forward resynchronisation: recompute from `from` until an arrival time
    /// comes out unchanged, at which point the rest of the tour is unchanged too.
    fn propagate_suffix(&mut self, from: usize) {
        for pos in from..=self.last_position() {
            let arrival = self.arrival_from_previous(pos);
            if arrival == self.makespan[pos] {
                break;
            }
            self.retract_violation(pos);
            self.makespan[pos] = arrival;
            self.record_violation(pos);
        }
    }

    /// Rebuild cost, arrival times and violations from the permutation alone.
    pub fn reevaluate(&mut self) {
        self.tour_cost = 0.0;
        self.constraint_violations = 0;
        self.infeasibility = 0.0;
        self.makespan[0] = 0.0;
        for pos in 1..self.permutation.len() {
            self.tour_cost += self
                .instance
                .distance(self.permutation[pos - 1], self.permutation[pos]);
            self.makespan[pos] = self.arrival_from_previous(pos);
            self.record_violation(pos);
        }
    }

    // -- Moves --------------------------------------------------------------

    /// Travel-cost change of exchanging positions `k` and `k + 1`.
    pub fn delta_swap(&self, k: usize) -> f64 {
        let p = &self.permutation;
        let (a, b, c, d) = (p[k - 1], p[k], p[k + 1], p[k + 2]);
        let dist = |i, j| self.instance.distance(i, j);
        (dist(a, c) + dist(c, b) + dist(b, d)) - (dist(a, b) + dist(b, c) + dist(c, d))
    }

    /// Exchange the customers at positions `k` and `k + 1`, `1 <= k <= n - 2`.
    pub fn swap(&mut self, k: usize) {
        assert!(self.is_complete());
        assert!(k >= 1 && k + 1 < self.last_position(), "swap position {} out of range", k);

        self.tour_cost += self.delta_swap(k);
        self.retract_violation(k);
        self.retract_violation(k + 1);
        self.permutation.swap(k, k + 1);
        self.schedule_positions(k, k + 1);
        self.propagate_suffix(k + 2);
    }

    /// Move the customer at position `from` to position `to` through a chain
    /// of adjacent swaps.
    pub fn relocate(&mut self, from: usize, to: usize) {
        if from < to {
            for k in from..to {
                self.swap(k);
            }
        } else {
            for k in (to..from).rev() {
                self.swap(k);
            }
        }
    }

    /// Move the customer at `from` to `to` without touching the evaluation.
    /// Callers must [`Tour::reevaluate`] before reading costs again.
    pub(crate) fn reinsert_unevaluated(&mut self, from: usize, to: usize) {
        if from < to {
            self.permutation[from..=to].rotate_left(1);
        } else {
            self.permutation[to..=from].rotate_right(1);
        }
    }

    /// Travel-cost change of reversing `permutation[i+1..=j]` on a symmetric instance.
    pub fn two_opt_delta(&self, i: usize, j: usize) -> f64 {
        let p = &self.permutation;
        let dist = |a, b| self.instance.distance(a, b);
        dist(p[i], p[j]) + dist(p[i + 1], p[j + 1]) - dist(p[i], p[i + 1]) - dist(p[j], p[j + 1])
    }

    /// Reverse `permutation[i+1..=j]` (the 2-opt move). Symmetric instances only.
    pub fn reverse_segment(&mut self, i: usize, j: usize) {
        assert!(self.instance.is_symmetric(), "2-opt requires a symmetric instance");
        assert!(self.is_complete());
        assert!(i < j && j < self.last_position(), "invalid segment ({}, {})", i, j);

        self.tour_cost += self.two_opt_delta(i, j);
        for pos in i + 1..=j {
            self.retract_violation(pos);
        }
        self.permutation[i + 1..=j].reverse();
        self.schedule_positions(i + 1, j);
        self.propagate_suffix(j + 1);
    }

    // -- Probes for feasibility-preserving neighbourhoods -------------------
    //
    // These assume a feasible tour and never touch the violation counters.

    /// Exchange positions `k` and `k + 1` updating only the travel cost.
    /// Arrival times from `k` on are stale until [`Tour::is_feasible_swap`].
    pub fn do_swap(&mut self, k: usize) -> f64 {
        let gain = self.delta_swap(k);
        self.tour_cost += gain;
        self.permutation.swap(k, k + 1);
        gain
    }

    /// Bring arrival times up to date after [`Tour::do_swap`]`(k)` and report
    /// whether every customer is still on time.
    ///
    /// `first_dirty` is the first position whose arrival time may be stale
    /// (`None` when all are valid). On failure it points at the late position.
    pub fn is_feasible_swap(&mut self, k: usize, first_dirty: &mut Option<usize>) -> bool {
        debug_assert_eq!(self.constraint_violations, 0);
        let last = self.last_position();
        let (start, stop) = match *first_dirty {
            None => (k, k + 2),
            Some(dirty) => (dirty.min(k), last + 1),
        };

        for pos in start..stop {
            let arrival = self.arrival_from_previous(pos);
            self.makespan[pos] = arrival;
            if arrival > self.instance.window_end(self.permutation[pos]) {
                *first_dirty = Some(pos);
                return false;
            }
        }

        if first_dirty.is_none() {
            for pos in k + 2..=last {
                let arrival = self.arrival_from_previous(pos);
                if arrival == self.makespan[pos] {
                    break;
                }
                self.makespan[pos] = arrival;
                if arrival > self.instance.window_end(self.permutation[pos]) {
                    *first_dirty = Some(pos);
                    return false;
                }
            }
        }

        *first_dirty = None;
        true
    }

    /// [`Tour::do_swap`] accumulating the travel-cost change in `delta`; the
    /// feasibility check only runs while the accumulated change is an improvement.
    pub fn do_feasible_swap(
        &mut self,
        k: usize,
        delta: &mut f64,
        first_dirty: &mut Option<usize>,
    ) -> bool {
        *delta += self.do_swap(k);
        if !fless(*delta, 0.0) {
            *first_dirty = Some(first_dirty.map_or(k, |dirty| dirty.min(k)));
            return false;
        }
        self.is_feasible_swap(k, first_dirty)
    }

    /// Travel-cost change of moving the customer at `from` to position `to`.
    pub fn insertion_delta(&self, from: usize, to: usize) -> f64 {
        let p = &self.permutation;
        let dist = |a, b| self.instance.distance(a, b);
        let c = p[from];
        let removal = dist(p[from - 1], p[from + 1]) - dist(p[from - 1], c) - dist(c, p[from + 1]);
        let insertion = if from < to {
            dist(p[to], c) + dist(c, p[to + 1]) - dist(p[to], p[to + 1])
        } else {
            dist(p[to - 1], c) + dist(c, p[to]) - dist(p[to - 1], p[to])
        };
        removal + insertion
    }

    /// Node found at `pos` after moving the customer at `from` to `to`.
    #[inline]
    fn shifted_node(&self, from: usize, to: usize, pos: usize) -> usize {
        let p = &self.permutation;
        if pos == to {
            p[from]
        } else if from < to && pos >= from && pos < to {
            p[pos + 1]
        } else if from > to && pos > to && pos <= from {
            p[pos - 1]
        } else {
            p[pos]
        }
    }

    /// Check, without committing, whether moving the customer at `from` to
    /// `to` keeps every customer on time. On success the new arrival times
    /// are in `scratch` up to the returned position.
    pub fn probe_insertion(&self, from: usize, to: usize, scratch: &mut Vec<f64>) -> Option<usize> {
        debug_assert_eq!(self.constraint_violations, 0);
        let last = self.last_position();
        assert!(from != to && from >= 1 && to >= 1 && from < last && to < last);
        scratch.resize(last + 1, 0.0);

        let (low, high) = (from.min(to), from.max(to));
        let mut prev = self.permutation[low - 1];
        let mut time = self.makespan[low - 1];
        for pos in low..=last {
            let node = self.shifted_node(from, to, pos);
            let arrival = (time + self.instance.distance(prev, node)).max(self.instance.window_start(node));
            if pos > high && arrival == self.makespan[pos] {
                return Some(pos - 1);
            }
            if arrival > self.instance.window_end(node) {
                return None;
            }
            scratch[pos] = arrival;
            time = arrival;
            prev = node;
        }
        Some(last)
    }

    pub fn insertion_is_feasible(&self, from: usize, to: usize) -> bool {
        let mut scratch = Vec::new();
        self.probe_insertion(from, to, &mut scratch).is_some()
    }

    /// Commit a move accepted by [`Tour::probe_insertion`].
    pub fn commit_insertion(&mut self, from: usize, to: usize, scratch: &[f64], end: usize) {
        self.tour_cost += self.insertion_delta(from, to);
        let low = from.min(to);
        if from < to {
            self.permutation[from..=to].rotate_left(1);
        } else {
            self.permutation[to..=from].rotate_right(1);
        }
        self.makespan[low..=end].copy_from_slice(&scratch[low..=end]);
    }

    /// Check, without committing, whether reversing `permutation[i+1..=j]`
    /// keeps every customer on time.
    pub fn probe_two_opt(&self, i: usize, j: usize, scratch: &mut Vec<f64>) -> TwoOptProbe {
        debug_assert_eq!(self.constraint_violations, 0);
        let last = self.last_position();
        assert!(i + 1 < j && j < last);
        scratch.resize(last + 1, 0.0);

        let mut prev = self.permutation[i];
        let mut time = self.makespan[i];
        for pos in i + 1..=j {
            let node = self.permutation[i + 1 + j - pos];
            let arrival = (time + self.instance.distance(prev, node)).max(self.instance.window_start(node));
            if arrival > self.instance.window_end(node) {
                return if pos == i + 1 {
                    TwoOptProbe::Infeasible
                } else {
                    TwoOptProbe::InfeasibleBeyond
                };
            }
            scratch[pos] = arrival;
            time = arrival;
            prev = node;
        }

        for pos in j + 1..=last {
            let node = self.permutation[pos];
            let arrival = (time + self.instance.distance(prev, node)).max(self.instance.window_start(node));
            if arrival == self.makespan[pos] {
                return TwoOptProbe::Feasible { end: pos - 1 };
            }
            if arrival > self.instance.window_end(node) {
                return TwoOptProbe::Infeasible;
            }
            scratch[pos] = arrival;
            time = arrival;
            prev = node;
        }
        TwoOptProbe::Feasible { end: last }
    }

    /// Commit a move accepted by [`Tour::probe_two_opt`].
    pub fn commit_two_opt(&mut self, i: usize, j: usize, scratch: &[f64], end: usize) {
        self.tour_cost += self.two_opt_delta(i, j);
        self.permutation[i + 1..=j].reverse();
        self.makespan[i + 1..=end].copy_from_slice(&scratch[i + 1..=end]);
    }

    // -- Verification -------------------------------------------------------

    /// Recompute everything from scratch and compare with the incremental state.
    pub fn check_solution(&self) -> Result<(), String> {
        let n = self.instance.n();
        if self.permutation.len() != n + 1 {
            return Err(format!(
                "permutation has {} positions, expected {}",
                self.permutation.len(),
                n + 1
            ));
        }
        if self.permutation[0] != 0 || self.permutation[n] != 0 {
            return Err("tour does not start and end at the depot".to_string());
        }
        let mut seen = vec![false; n];
        seen[0] = true;
        for &node in &self.permutation[1..n] {
            if node == 0 || node >= n || seen[node] {
                return Err(format!("not a permutation: customer {} misplaced", node));
            }
            seen[node] = true;
        }

        let mut time = 0.0;
        let mut cost = 0.0;
        let mut cviols = 0usize;
        let mut unsure = 0usize;
        let mut infeasibility = 0.0;
        for pos in 1..=n {
            let (prev, node) = (self.permutation[pos - 1], self.permutation[pos]);
            cost += self.instance.distance(prev, node);
            time = (time + self.instance.distance(prev, node)).max(self.instance.window_start(node));
            if !fequals(time, self.makespan[pos]) {
                return Err(format!(
                    "makespan = {} != makespan[{}] = {}",
                    time, pos, self.makespan[pos]
                ));
            }
            let window_end = self.instance.window_end(node);
            if self.makespan[pos] > window_end {
                cviols += 1;
                infeasibility += self.makespan[pos] - window_end;
            }
            if fequals(self.makespan[pos], window_end) {
                unsure += 1;
            }
        }

        if !fequals(cost, self.tour_cost) {
            return Err(format!("real cost = {} != tour cost = {}", cost, self.tour_cost));
        }
        if cviols.abs_diff(self.constraint_violations) > unsure {
            return Err(format!(
                "real violations = {} != constraint violations = {} (unsure = {})",
                cviols, self.constraint_violations, unsure
            ));
        }
        if !fequals(infeasibility, self.infeasibility) {
            return Err(format!(
                "real infeasibility = {} != infeasibility = {}",
                infeasibility, self.infeasibility
            ));
        }
        Ok(())
    }

    /// Per-leg schedule of a complete tour.
    pub fn schedule(&self) -> Vec<ScheduleEntry> {
        let mut entries = Vec::with_capacity(self.permutation.len().saturating_sub(1));
        let mut cost = 0.0;
        let mut time = 0.0;
        for pos in 1..self.permutation.len() {
            let (from, to) = (self.permutation[pos - 1], self.permutation[pos]);
            let distance = self.instance.distance(from, to);
            let (window_start, window_end) = (self.instance.window_start(to), self.instance.window_end(to));
            cost += distance;
            let arrival = (time + distance).max(window_start);
            let waiting = window_start - (time + distance);
            let waiting = if waiting >= 0.0 { waiting } else { (window_end - arrival).min(0.0) };
            entries.push(ScheduleEntry {
                from,
                to,
                distance,
                tour_cost: cost,
                window_start,
                window_end,
                waiting,
                arrival,
            });
            time = arrival;
        }
        entries
    }
}

impl fmt::Display for Tour<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.2}\t{:.2}\t{}\t{:>16}\t",
            self.makespan(),
            self.tour_cost,
            self.constraint_violations,
            self.infeasibility
        )?;
        for c in self.customers() {
            write!(f, " {}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Tour<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tour")
            .field("permutation", &self.permutation)
            .field("makespan", &self.makespan)
            .field("tour_cost", &self.tour_cost)
            .field("constraint_violations", &self.constraint_violations)
            .field("infeasibility", &self.infeasibility)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;

    /// Five customers on a line, symmetric, some tight windows.
    fn create_test_instance() -> TsptwInstance {
        let n = 6;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        let window_start = vec![0.0, 0.0, 2.0, 0.0, 6.0, 0.0];
        let window_end = vec![100.0, 1.0, 4.0, 50.0, 8.0, 50.0];
        TsptwInstance::new("line", distance, window_start, window_end).unwrap()
    }

    #[test]
    fn test_add_and_auto_close() {
        let instance = create_test_instance();
        let mut tour = Tour::new(&instance);
        tour.add(1);
        tour.add(2);
        tour.add(3);
        assert!(!tour.is_complete());
        tour.add(4);
        // Customer 5 and the depot are appended automatically.
        assert!(tour.is_complete());
        assert_eq!(tour.permutation(), &[0, 1, 2, 3, 4, 5, 0]);
        assert_eq!(tour.tour_cost(), 10.0);
        assert_eq!(tour.arrival(2), 2.0);
        assert_eq!(tour.arrival(4), 6.0);
        assert_eq!(tour.makespan(), 12.0);
        assert!(tour.is_feasible());
        tour.check_solution().unwrap();
    }

    #[test]
    fn test_add_appends_last_remaining_customer() {
        let instance = create_test_instance();
        let mut tour = Tour::new(&instance);
        tour.add(5);
        tour.add(4);
        tour.add(3);
        tour.add(2);
        assert_eq!(tour.permutation(), &[0, 5, 4, 3, 2, 1, 0]);
        assert_eq!(tour.nodes_available(), 0);
        tour.check_solution().unwrap();
    }

    #[test]
    fn test_single_customer_instance_closes() {
        let instance = TsptwInstance::new(
            "one",
            vec![vec![0.0, 3.0], vec![3.0, 0.0]],
            vec![0.0, 0.0],
            vec![10.0, 10.0],
        )
        .unwrap();
        let mut tour = Tour::new(&instance);
        tour.add(1);
        assert!(tour.is_complete());
        assert_eq!(tour.tour_cost(), 6.0);
        tour.check_solution().unwrap();
    }

    #[test]
    #[should_panic]
    fn test_add_assigned_panics() {
        let instance = create_test_instance();
        let mut tour = Tour::new(&instance);
        tour.add(2);
        tour.add(2);
    }

    #[test]
    fn test_violations_counted() {
        let instance = create_test_instance();
        let tour = Tour::from_customers(&instance, &[5, 4, 3, 2, 1]);
        // 5 at 5, 4 at 6, 3 at 7, 2 at 8 (late by 4), 1 at 9 (late by 8)
        assert_eq!(tour.constraint_violations(), 2);
        assert_eq!(tour.infeasibility(), 12.0);
        tour.check_solution().unwrap();
    }

    #[test]
    fn test_swap_matches_reevaluation() {
        let instance = create_test_instance();
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 4, 5]);
        for k in [1, 3, 2, 4, 1, 2] {
            tour.swap(k);
            tour.check_solution().unwrap();
        }
        let mut fresh = Tour::from_customers(&instance, tour.customers());
        fresh.reevaluate();
        assert_eq!(fresh.tour_cost(), tour.tour_cost());
        assert_eq!(fresh.arrivals(), tour.arrivals());
    }

    #[test]
    fn test_relocate() {
        let instance = create_test_instance();
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 4, 5]);
        tour.relocate(1, 4);
        assert_eq!(tour.customers(), &[2, 3, 4, 1, 5]);
        tour.check_solution().unwrap();
        tour.relocate(4, 1);
        assert_eq!(tour.customers(), &[1, 2, 3, 4, 5]);
        assert_eq!(tour.tour_cost(), 10.0);
        tour.check_solution().unwrap();
    }

    #[test]
    fn test_reverse_segment_round_trip() {
        let instance = create_test_instance();
        let mut tour = Tour::from_customers(&instance, &[2, 1, 5, 3, 4]);
        let arrivals = tour.arrivals().to_vec();
        let cost = tour.tour_cost();
        tour.reverse_segment(1, 4);
        assert_eq!(tour.customers(), &[2, 3, 5, 1, 4]);
        tour.check_solution().unwrap();
        tour.reverse_segment(1, 4);
        assert_eq!(tour.tour_cost(), cost);
        assert_eq!(tour.arrivals(), arrivals.as_slice());
    }

    #[test]
    fn test_better_than() {
        let instance = create_test_instance();
        let good = Tour::from_customers(&instance, &[1, 2, 3, 4, 5]);
        let bad = Tour::from_customers(&instance, &[5, 4, 3, 2, 1]);
        assert!(good.better_than(&bad));
        assert!(!bad.better_than(&good));
        assert!(!good.better_than(&good.clone()));
    }

    #[test]
    fn test_feasible_swap_chain() {
        let instance = create_test_instance();
        let tour = Tour::from_customers(&instance, &[1, 3, 2, 4, 5]);
        assert!(tour.is_feasible());

        // Putting 2 back before 3 shortens the tour and stays feasible.
        let mut ngh = tour.clone();
        let mut delta = 0.0;
        let mut first_dirty = None;
        assert!(ngh.do_feasible_swap(2, &mut delta, &mut first_dirty));
        assert_eq!(first_dirty, None);
        assert_eq!(delta, -2.0);
        assert_eq!(ngh.customers(), &[1, 2, 3, 4, 5]);
        ngh.check_solution().unwrap();

        // Swapping the first two customers costs more, so it is not checked.
        let mut ngh = tour.clone();
        let mut delta = 0.0;
        let mut first_dirty = None;
        assert!(!ngh.do_feasible_swap(1, &mut delta, &mut first_dirty));
        assert_eq!(delta, 2.0);
        assert_eq!(first_dirty, Some(1));
    }

    #[test]
    fn test_insertion_check_and_commit() {
        let instance = create_test_instance();
        let mut tour = Tour::from_customers(&instance, &[1, 2, 4, 3, 5]);
        assert!(tour.is_feasible());
        let mut scratch = Vec::new();

        // 3 before 4: [1, 2, 3, 4, 5]
        let end = tour.probe_insertion(4, 3, &mut scratch).unwrap();
        let expected = tour.tour_cost() + tour.insertion_delta(4, 3);
        tour.commit_insertion(4, 3, &scratch, end);
        assert_eq!(tour.customers(), &[1, 2, 3, 4, 5]);
        assert_eq!(tour.tour_cost(), expected);
        tour.check_solution().unwrap();

        // 1 to the end makes it late.
        assert!(!tour.insertion_is_feasible(1, 5));
    }

    #[test]
    fn test_two_opt_check_and_commit() {
        let instance = create_test_instance();
        let mut tour = Tour::from_customers(&instance, &[1, 2, 3, 5, 4]);
        let mut scratch = Vec::new();

        match tour.probe_two_opt(3, 5, &mut scratch) {
            TwoOptProbe::Feasible { end } => tour.commit_two_opt(3, 5, &scratch, end),
            other => panic!("unexpected probe result {:?}", other),
        }
        assert_eq!(tour.customers(), &[1, 2, 3, 4, 5]);
        tour.check_solution().unwrap();

        // Putting 2 first makes 1 late at position 2.
        assert_eq!(tour.probe_two_opt(0, 2, &mut scratch), TwoOptProbe::InfeasibleBeyond);
    }

    #[test]
    fn test_random_tour_is_consistent() {
        let instance = create_test_instance();
        let mut rng = seeded(11);
        for _ in 0..20 {
            let tour = Tour::random(&instance, &mut rng);
            assert!(tour.is_complete());
            tour.check_solution().unwrap();
        }
    }

    #[test]
    fn test_makespan_objective() {
        let mut instance = create_test_instance();
        instance.objective = Objective::Makespan;
        let tour = Tour::from_customers(&instance, &[1, 2, 3, 4, 5]);
        assert_eq!(tour.cost(), tour.makespan());
    }

    #[test]
    fn test_schedule_and_display() {
        let instance = create_test_instance();
        let tour = Tour::from_customers(&instance, &[1, 2, 3, 4, 5]);
        let schedule = tour.schedule();
        assert_eq!(schedule.len(), 6);
        assert_eq!(schedule[5].tour_cost, 10.0);
        assert_eq!(schedule[3].waiting, 2.0);
        let line = tour.to_string();
        assert!(line.ends_with(" 1 2 3 4 5"));
    }
}

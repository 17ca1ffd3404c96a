//! Construction heuristics for the TSPTW.
//!
//! Each heuristic builds one complete tour from scratch: uniformly at random,
//! greedily on heuristic information, with a single ant, or with one Beam-ACO
//! run. None of them avoids lateness, it is only scored afterwards.

use crate::config::BeamConfig;
use crate::heuristics::aco::{Ant, Colony, HeuristicWeights};
use crate::heuristics::beam::BeamAco;
use crate::instance::TsptwInstance;
use crate::random::RandomSource;
use crate::tour::Tour;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

pub trait ConstructionHeuristic {
    fn construct<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Tour<'a>;
    fn name(&self) -> &str;
}

/// Uniformly random permutation of the customers.
pub struct RandomConstruction;

impl ConstructionHeuristic for RandomConstruction {
    fn construct<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Tour<'a> {
        Tour::random(instance, rng)
    }

    fn name(&self) -> &str {
        "Random"
    }
}

/// Greedy heuristic-information construction
///
/// Repeatedly appends the unassigned customer with the highest heuristic
/// information from the current last node (lowest index on ties). With no
/// fixed weights, they are drawn from `rng` exactly like an ant would.
pub struct GreedyConstruction {
    pub weights: Option<HeuristicWeights>,
}

impl GreedyConstruction {
    pub fn new(weights: HeuristicWeights) -> Self {
        GreedyConstruction { weights: Some(weights) }
    }

    pub fn random_weights() -> Self {
        GreedyConstruction { weights: None }
    }

    /// Nearest neighbour, the pure distance criterion.
    pub fn nearest_neighbor() -> Self {
        Self::new(HeuristicWeights { distance: 1.0, window_start: 0.0, window_end: 0.0 })
    }

    fn find_best(colony: &Colony, tour: &Tour) -> Option<usize> {
        let last = tour.last();
        tour.unassigned()
            .min_by_key(|&node| Reverse(OrderedFloat(colony.heuristic_information(last, node))))
    }
}

impl ConstructionHeuristic for GreedyConstruction {
    fn construct<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Tour<'a> {
        let mut colony = Colony::new(instance);
        match self.weights {
            Some(weights) => colony.set_weights(weights),
            None => colony.randomize_weights(rng),
        }

        let mut tour = Tour::new(instance);
        while tour.nodes_available() > 0 {
            match Self::find_best(&colony, &tour) {
                Some(node) => tour.add(node),
                None => break,
            }
        }
        tour
    }

    fn name(&self) -> &str {
        "Greedy"
    }
}

/// A single ant construction over uniform pheromone.
pub struct AntConstruction {
    pub det_rate: f64,
}

impl ConstructionHeuristic for AntConstruction {
    fn construct<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Tour<'a> {
        let mut colony = Colony::new(instance);
        Ant::new(self.det_rate).construct(&mut colony, rng)
    }

    fn name(&self) -> &str {
        "Ant"
    }
}

/// A single Beam-ACO construction over uniform pheromone.
pub struct BeamConstruction {
    pub config: BeamConfig,
}

impl ConstructionHeuristic for BeamConstruction {
    fn construct<'a>(&self, instance: &'a TsptwInstance, rng: &mut dyn RandomSource) -> Tour<'a> {
        let mut colony = Colony::new(instance);
        BeamAco::construct(&mut colony, &self.config, rng)
    }

    fn name(&self) -> &str {
        "Beam-ACO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::seeded;

    fn create_test_instance() -> TsptwInstance {
        // Customers at 4, 1, 3, 2 on a line.
        let coords = [0.0, 4.0, 1.0, 3.0, 2.0];
        let distance = coords
            .iter()
            .map(|a: &f64| coords.iter().map(|b| (a - b).abs()).collect())
            .collect();
        TsptwInstance::new("line", distance, vec![0.0; 5], vec![100.0; 5]).unwrap()
    }

    #[test]
    fn test_nearest_neighbor() {
        let instance = create_test_instance();
        let mut rng = seeded(1);
        let tour = GreedyConstruction::nearest_neighbor().construct(&instance, &mut rng);
        assert_eq!(tour.customers(), &[2, 4, 3, 1]);
        assert_eq!(tour.tour_cost(), 8.0);
    }

    #[test]
    fn test_all_constructions_complete() {
        let instance = create_test_instance();
        let mut rng = seeded(5);
        let heuristics: Vec<Box<dyn ConstructionHeuristic>> = vec![
            Box::new(RandomConstruction),
            Box::new(GreedyConstruction::random_weights()),
            Box::new(AntConstruction { det_rate: 0.5 }),
            Box::new(BeamConstruction { config: BeamConfig::default() }),
        ];
        for heuristic in &heuristics {
            let tour = heuristic.construct(&instance, &mut rng);
            assert!(tour.is_complete(), "{} left an incomplete tour", heuristic.name());
            tour.check_solution().unwrap();
        }
    }
}

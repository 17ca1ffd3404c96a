//! Owned, serializable snapshot of a tour.
//!
//! A [`Tour`] borrows its instance, which makes it awkward to keep around
//! after a run or to write to disk. `Solution` records the permutation and
//! the evaluation once the search is over.

use crate::instance::{fequals, TsptwInstance};
use crate::tour::{ScheduleEntry, Tour};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A finished TSPTW solution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Full permutation, starting and ending at the depot
    pub tour: Vec<usize>,
    /// Value of the instance objective
    pub cost: f64,
    pub tour_cost: f64,
    pub makespan: f64,
    pub constraint_violations: usize,
    /// Total lateness over all customers
    pub infeasibility: f64,
    pub feasible: bool,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Number of iterations (if applicable)
    pub iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedule: Vec<ScheduleEntry>,
}

impl Solution {
    pub fn from_tour(tour: &Tour, algorithm: &str) -> Self {
        Solution {
            tour: tour.permutation().to_vec(),
            cost: tour.cost(),
            tour_cost: tour.tour_cost(),
            makespan: tour.makespan(),
            constraint_violations: tour.constraint_violations(),
            infeasibility: tour.infeasibility(),
            feasible: tour.is_feasible(),
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            iterations: None,
            schedule: Vec::new(),
        }
    }

    /// Attach the per-leg schedule.
    pub fn with_schedule(mut self, tour: &Tour) -> Self {
        self.schedule = tour.schedule();
        self
    }

    /// Rebuild the tour on `instance`, checking that the stored evaluation matches.
    pub fn to_tour<'a>(&self, instance: &'a TsptwInstance) -> Result<Tour<'a>, String> {
        let n = instance.n();
        if self.tour.len() != n + 1 || self.tour[0] != 0 || self.tour[n] != 0 {
            return Err(format!(
                "Solution has {} positions, expected a closed tour over {} nodes",
                self.tour.len(),
                n
            ));
        }
        let customers = &self.tour[1..n];
        let mut seen = vec![false; n];
        for &c in customers {
            if c == 0 || c >= n || seen[c] {
                return Err(format!("Customer {} is invalid or repeated", c));
            }
            seen[c] = true;
        }

        let tour = Tour::from_customers(instance, customers);
        if !fequals(tour.tour_cost(), self.tour_cost) {
            return Err(format!(
                "Stored tour cost {} does not match the instance ({})",
                self.tour_cost,
                tour.tour_cost()
            ));
        }
        Ok(tour)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open solution {}: {}", path.as_ref().display(), e))?;
        serde_json::from_str(&content).map_err(|e| format!("Invalid solution file: {}", e))
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        writeln!(f, "  Cost: {:.2}", self.cost)?;
        writeln!(f, "  Tour cost: {:.2}  Makespan: {:.2}", self.tour_cost, self.makespan)?;
        writeln!(
            f,
            "  Feasible: {} ({} violations, lateness {:.2})",
            self.feasible, self.constraint_violations, self.infeasibility
        )?;
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        if let Some(iter) = self.iterations {
            writeln!(f, "  Iterations: {}", iter)?;
        }
        writeln!(f, "  Tour: {:?}", self.tour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_instance() -> TsptwInstance {
        let distance = vec![
            vec![0.0, 2.0, 3.0],
            vec![2.0, 0.0, 1.0],
            vec![3.0, 1.0, 0.0],
        ];
        TsptwInstance::new("small", distance, vec![0.0, 0.0, 0.0], vec![20.0, 2.0, 20.0]).unwrap()
    }

    #[test]
    fn test_solution_snapshot() {
        let instance = create_test_instance();
        let tour = Tour::from_customers(&instance, &[2, 1]);
        let solution = Solution::from_tour(&tour, "test").with_schedule(&tour);
        assert_eq!(solution.tour, vec![0, 2, 1, 0]);
        assert_eq!(solution.tour_cost, 6.0);
        assert_eq!(solution.constraint_violations, 1);
        assert!(!solution.feasible);
        assert_eq!(solution.schedule.len(), 3);

        let rebuilt = solution.to_tour(&instance).unwrap();
        assert_eq!(rebuilt.permutation(), tour.permutation());
    }

    #[test]
    fn test_json_round_trip() {
        let instance = create_test_instance();
        let tour = Tour::from_customers(&instance, &[1, 2]);
        let solution = Solution::from_tour(&tour, "test");
        let path = std::env::temp_dir().join("tsptw_solution_test.json");
        solution.save_json(&path).unwrap();
        let loaded = Solution::load_json(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded.tour, solution.tour);
        assert!(loaded.feasible);
        assert!(loaded.to_tour(&instance).is_ok());
    }

    #[test]
    fn test_rejects_malformed_tour() {
        let instance = create_test_instance();
        let mut solution = Solution::from_tour(&Tour::from_customers(&instance, &[1, 2]), "test");
        solution.tour = vec![0, 1, 1, 0];
        assert!(solution.to_tour(&instance).is_err());
    }
}

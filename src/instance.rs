//! Module for parsing and representing TSPTW instances.
//!
//! An instance is a square travel-time matrix plus one time window per node.
//! Node 0 is the depot. Everything derived from the raw data (strong
//! time-window infeasibility, normalisation bounds, symmetry) is computed once
//! at construction and is read-only afterwards, so a single instance can be
//! borrowed by any number of tours.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Tolerance used by every floating-point comparison in the solver.
pub const EPSILON: f64 = 1e-6;

/// `|left - right| < EPSILON`
#[inline]
pub fn fequals(left: f64, right: f64) -> bool {
    (left - right).abs() < EPSILON
}

/// Strictly less, treating values within `EPSILON` as equal.
#[inline]
pub fn fless(left: f64, right: f64) -> bool {
    if fequals(left, right) {
        return false;
    }
    left < right
}

/// What `Tour::cost` minimises.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Objective {
    /// Sum of the travel times along the tour
    #[default]
    TourCost,
    /// Arrival time back at the depot
    Makespan,
}

/// Min/max of a quantity over the instance, used to rescale heuristic
/// components into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        values.fold(
            Bounds { min: f64::INFINITY, max: f64::NEG_INFINITY },
            |b, v| Bounds { min: b.min.min(v), max: b.max.max(v) },
        )
    }

    /// Maps `value` to `[0, 1]`, with the minimum mapped to 1 and the maximum to 0.
    /// A degenerate range maps everything to 1.
    #[inline]
    pub fn normalise_inverse(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 1.0;
        }
        (self.max - value) / range
    }
}

/// Represents a complete TSPTW instance
#[derive(Debug, Clone)]
pub struct TsptwInstance {
    /// Name of the instance (usually the file it was read from)
    pub name: String,
    /// Objective used by `Tour::cost`
    pub objective: Objective,
    n: usize,
    /// Row-major `n × n` travel times
    distance: Vec<f64>,
    window_start: Vec<f64>,
    window_end: Vec<f64>,
    /// Row-major `n × n`; `true` when `i → j` can never be traversed in time
    tw_infeasible: Vec<bool>,
    num_tw_infeasible: usize,
    distance_bounds: Bounds,
    window_start_bounds: Bounds,
    window_end_bounds: Bounds,
    symmetric: bool,
}

impl TsptwInstance {
    /// Build an instance from raw data.
    ///
    /// `distance` must be square with one row per node (depot first) and
    /// `window_start[i] <= window_end[i]` must hold for every node.
    pub fn new(
        name: &str,
        distance: Vec<Vec<f64>>,
        window_start: Vec<f64>,
        window_end: Vec<f64>,
    ) -> Result<Self, String> {
        let n = distance.len();
        if n == 0 {
            return Err("Invalid number of nodes: 0".to_string());
        }
        if window_start.len() != n || window_end.len() != n {
            return Err(format!(
                "Expected {} time windows, found {} starts and {} ends",
                n,
                window_start.len(),
                window_end.len()
            ));
        }

        let mut flat = Vec::with_capacity(n * n);
        for (i, row) in distance.iter().enumerate() {
            if row.len() != n {
                return Err(format!("Distance row {} has {} entries, expected {}", i, row.len(), n));
            }
            for (j, &d) in row.iter().enumerate() {
                if !d.is_finite() || d < 0.0 {
                    return Err(format!("Invalid distance d[{}][{}] = {}", i, j, d));
                }
            }
            flat.extend_from_slice(row);
        }

        for i in 0..n {
            let (start, end) = (window_start[i], window_end[i]);
            if !start.is_finite() || !end.is_finite() || start > end {
                return Err(format!("Invalid time window for node {}: [{}, {}]", i, start, end));
            }
        }

        let mut instance = TsptwInstance {
            name: name.to_string(),
            objective: Objective::default(),
            n,
            distance: flat,
            window_start,
            window_end,
            tw_infeasible: Vec::new(),
            num_tw_infeasible: 0,
            distance_bounds: Bounds { min: 0.0, max: 0.0 },
            window_start_bounds: Bounds { min: 0.0, max: 0.0 },
            window_end_bounds: Bounds { min: 0.0, max: 0.0 },
            symmetric: true,
        };
        instance.compute_derived();
        Ok(instance)
    }

    /// Parse an instance from the plain text format of the classical
    /// TSPTW benchmark sets:
    ///
    /// ```text
    /// n
    /// d[0][0] ... d[0][n-1]
    /// ...
    /// d[n-1][0] ... d[n-1][n-1]
    /// start_0 end_0
    /// ...
    /// start_{n-1} end_{n-1}
    /// ```
    ///
    /// Tokens may be separated by any whitespace.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open file {}: {}", path.as_ref().display(), e))?;
        let name = path
            .as_ref()
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::parse(&name, &content)
    }

    /// Parse an instance from the text of an instance file.
    pub fn parse(name: &str, content: &str) -> Result<Self, String> {
        let mut tokens = content.split_whitespace();

        let n: usize = tokens
            .next()
            .ok_or("Empty instance file")?
            .parse()
            .map_err(|_| "Invalid number of customers")?;
        if n == 0 {
            return Err("Invalid number of customers".to_string());
        }

        let mut next_number = |what: &str| -> Result<f64, String> {
            let token = tokens
                .next()
                .ok_or_else(|| format!("Unexpected end of file while reading {}", what))?;
            token.parse::<f64>().map_err(|_| format!("Invalid {}: '{}'", what, token))
        };

        let mut distance = vec![vec![0.0; n]; n];
        for row in distance.iter_mut() {
            for d in row.iter_mut() {
                *d = next_number("distance matrix")?;
            }
        }

        let mut window_start = Vec::with_capacity(n);
        let mut window_end = Vec::with_capacity(n);
        for _ in 0..n {
            window_start.push(next_number("time windows")?);
            window_end.push(next_number("time windows")?);
        }

        Self::new(name, distance, window_start, window_end)
    }

    fn compute_derived(&mut self) {
        let n = self.n;

        self.window_start_bounds = Bounds::of(self.window_start.iter().copied());
        self.window_end_bounds = Bounds::of(self.window_end.iter().copied());
        self.distance_bounds = if n > 1 {
            Bounds::of(
                (0..n)
                    .flat_map(|i| (0..n).map(move |j| (i, j)))
                    .filter(|&(i, j)| i != j)
                    .map(|(i, j)| self.distance[i * n + j]),
            )
        } else {
            Bounds { min: 0.0, max: 0.0 }
        };

        self.tw_infeasible = vec![false; n * n];
        self.num_tw_infeasible = 0;
        for i in 0..n {
            for j in 0..n {
                if self.window_start[i] + self.distance[i * n + j] > self.window_end[j] {
                    self.tw_infeasible[i * n + j] = true;
                    self.num_tw_infeasible += 1;
                }
            }
        }

        self.symmetric = (0..n).all(|i| (i + 1..n).all(|j| self.distance[i * n + j] == self.distance[j * n + i]));
    }

    /// Number of nodes, depot included.
    #[inline]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Get the number of customer nodes (excluding depot)
    pub fn num_customers(&self) -> usize {
        self.n - 1
    }

    /// Get the travel time between two nodes
    #[inline]
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        self.distance[i * self.n + j]
    }

    #[inline]
    pub fn window_start(&self, i: usize) -> f64 {
        self.window_start[i]
    }

    #[inline]
    pub fn window_end(&self, i: usize) -> f64 {
        self.window_end[i]
    }

    /// `true` when leaving `i` at its earliest time still reaches `j` too late.
    #[inline]
    pub fn tw_infeasible(&self, i: usize, j: usize) -> bool {
        self.tw_infeasible[i * self.n + j]
    }

    pub fn num_tw_infeasible(&self) -> usize {
        self.num_tw_infeasible
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn distance_bounds(&self) -> Bounds {
        self.distance_bounds
    }

    pub fn window_start_bounds(&self) -> Bounds {
        self.window_start_bounds
    }

    pub fn window_end_bounds(&self) -> Bounds {
        self.window_end_bounds
    }

    /// Tour length of a closed permutation `0, c1, ..., ck, 0`.
    pub fn tour_length(&self, permutation: &[usize]) -> f64 {
        permutation.windows(2).map(|w| self.distance(w[0], w[1])).sum()
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let pairs = (self.n * self.n).max(1);
        InstanceStatistics {
            name: self.name.clone(),
            nodes: self.n,
            distance: self.distance_bounds,
            window_start: self.window_start_bounds,
            window_end: self.window_end_bounds,
            num_tw_infeasible: self.num_tw_infeasible,
            tw_infeasible_percent: 100.0 * self.num_tw_infeasible as f64 / pairs as f64,
            symmetric: self.symmetric,
        }
    }
}

/// Statistics about a TSPTW instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub nodes: usize,
    pub distance: Bounds,
    pub window_start: Bounds,
    pub window_end: Bounds,
    pub num_tw_infeasible: usize,
    pub tw_infeasible_percent: f64,
    pub symmetric: bool,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Nodes: {} (1 depot + {} customers)", self.nodes, self.nodes - 1)?;
        writeln!(f, "  Distances:    [{}, {}]", self.distance.min, self.distance.max)?;
        writeln!(f, "  Window start: [{}, {}]", self.window_start.min, self.window_start.max)?;
        writeln!(f, "  Window end:   [{}, {}]", self.window_end.min, self.window_end.max)?;
        writeln!(
            f,
            "  Strongly infeasible pairs: {} ({:.2}%)",
            self.num_tw_infeasible, self.tw_infeasible_percent
        )?;
        writeln!(f, "  Symmetric: {}", self.symmetric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = "3
        0 2 4
        2 0 3
        4 3 0
        0 100
        1 10
        0 3
    ";

    #[test]
    fn test_parse_instance() {
        let instance = TsptwInstance::parse("small", SMALL).unwrap();

        assert_eq!(instance.n(), 3);
        assert_eq!(instance.num_customers(), 2);
        assert_eq!(instance.distance(1, 2), 3.0);
        assert_eq!(instance.window_start(1), 1.0);
        assert_eq!(instance.window_end(2), 3.0);
        assert!(instance.is_symmetric());
        assert_eq!(instance.distance_bounds(), Bounds { min: 2.0, max: 4.0 });
    }

    #[test]
    fn test_strong_infeasibility() {
        let instance = TsptwInstance::parse("small", SMALL).unwrap();

        // Leaving 1 at time 1 reaches 2 at time 4 > 3.
        assert!(instance.tw_infeasible(1, 2));
        // Leaving the depot at 0 reaches 2 at 4 > 3.
        assert!(instance.tw_infeasible(0, 2));
        assert!(!instance.tw_infeasible(2, 1));
        assert!(!instance.tw_infeasible(0, 1));
        assert_eq!(instance.num_tw_infeasible(), 2);
    }

    #[test]
    fn test_asymmetric_detection() {
        let instance = TsptwInstance::new(
            "asym",
            vec![vec![0.0, 1.0], vec![2.0, 0.0]],
            vec![0.0, 0.0],
            vec![10.0, 10.0],
        )
        .unwrap();
        assert!(!instance.is_symmetric());
    }

    #[test]
    fn test_invalid_instances() {
        assert!(TsptwInstance::parse("empty", "").is_err());
        assert!(TsptwInstance::parse("truncated", "2 0 1 1").is_err());
        assert!(TsptwInstance::new("window", vec![vec![0.0]], vec![5.0], vec![1.0]).is_err());
        assert!(TsptwInstance::new("ragged", vec![vec![0.0, 1.0], vec![1.0]], vec![0.0; 2], vec![1.0; 2]).is_err());
    }

    #[test]
    fn test_normalise_inverse() {
        let b = Bounds { min: 2.0, max: 6.0 };
        assert_eq!(b.normalise_inverse(2.0), 1.0);
        assert_eq!(b.normalise_inverse(6.0), 0.0);
        assert_eq!(b.normalise_inverse(4.0), 0.5);
        assert_eq!(Bounds { min: 3.0, max: 3.0 }.normalise_inverse(3.0), 1.0);
    }

    #[test]
    fn test_fless() {
        assert!(fless(1.0, 2.0));
        assert!(!fless(1.0, 1.0 + 1e-9));
        assert!(!fless(2.0, 1.0));
        assert!(fequals(1.0, 1.0 + 1e-9));
    }
}

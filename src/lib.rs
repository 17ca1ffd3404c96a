//! TSPTW Solver Library
//!
//! Metaheuristics for the Travelling Salesman Problem with Time Windows.
//!
//! # Features
//!
//! - Incrementally evaluated tours with O(1) feasibility probes for swap, insertion and 2-opt moves
//! - Local search (feasible 1-shift, feasibility restoration, insertion, 2-opt, VND)
//! - Ant and Beam-ACO construction
//! - GVNS (General Variable Neighborhood Search)
//! - Seeded multi-trial benchmarking with CSV/JSON export
//!
//! # Example
//!
//! ```no_run
//! use tsptw_solver::instance::TsptwInstance;
//! use tsptw_solver::budget::Budget;
//! use tsptw_solver::heuristics::{Gvns, Solver};
//! use tsptw_solver::random::seeded;
//! use tsptw_solver::report::LogSink;
//!
//! // Load instance
//! let instance = TsptwInstance::from_file("rc_201.1.txt").unwrap();
//!
//! // Run GVNS for ten seconds
//! let budget = Budget::new(10.0, usize::MAX);
//! let mut rng = seeded(42);
//! let outcome = Gvns::default().solve(&instance, &mut rng, &budget, 1, &mut LogSink);
//!
//! println!("Tour cost: {:.2} ({} violations)", outcome.best.cost(), outcome.best.constraint_violations());
//! ```

pub mod instance;
pub mod tour;
pub mod solution;
pub mod config;
pub mod random;
pub mod budget;
pub mod report;
pub mod heuristics;
pub mod benchmark;

pub use instance::TsptwInstance;
pub use tour::Tour;
pub use solution::Solution;

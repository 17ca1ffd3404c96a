//! Solver parameters.
//!
//! Every parameter group has sensible defaults and is serde-serializable, so
//! a JSON file only needs to name the values it overrides:
//!
//! ```json
//! { "beam": { "beam_width": 5, "to_choose": 10 }, "gvns": { "level_max": 10 } }
//! ```

use crate::heuristics::local_search::FeasibilityOrder;
use crate::instance::Objective;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Parameters of the GVNS shell
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GvnsConfig {
    /// Largest shaking level of the optimisation phase
    pub level_max: usize,
    /// Non-improving shakes tolerated before moving to the next level
    pub iterlevel_max: usize,
    /// Order of the feasibility-restoring sub-searches
    pub restore_order: FeasibilityOrder,
}

impl Default for GvnsConfig {
    fn default() -> Self {
        GvnsConfig {
            level_max: 8,
            iterlevel_max: 30,
            restore_order: FeasibilityOrder::Code,
        }
    }
}

/// Parameters of a single ant construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AntConfig {
    /// Constructions per iteration
    pub n_ants: usize,
    /// Probability of a greedy (argmax) step instead of a roulette-wheel one
    pub det_rate: f64,
}

impl Default for AntConfig {
    fn default() -> Self {
        AntConfig {
            n_ants: 10,
            det_rate: 0.9,
        }
    }
}

/// Parameters of the Beam-ACO construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamConfig {
    /// Partial tours kept per depth level
    pub beam_width: usize,
    /// Children kept per beam element, best greedy weight first
    pub max_children: usize,
    /// Children drawn into the next generation
    pub to_choose: usize,
    /// Completions drawn by stochastic sampling
    pub n_samples: usize,
    /// Sampling starts once at most this many customers remain
    pub sample_rate: usize,
    /// Probability of a deterministic choice
    pub det_rate: f64,
}

impl Default for BeamConfig {
    fn default() -> Self {
        BeamConfig {
            beam_width: 1,
            max_children: 100,
            to_choose: 2,
            n_samples: 1,
            sample_rate: 1000,
            det_rate: 0.9,
        }
    }
}

/// Parameters of the post-construction descent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchConfig {
    /// First instead of best improvement for the insertion search
    pub first_improvement: bool,
    pub restore_order: FeasibilityOrder,
}

impl Default for LocalSearchConfig {
    fn default() -> Self {
        LocalSearchConfig {
            first_improvement: true,
            restore_order: FeasibilityOrder::Code,
        }
    }
}

/// Trial-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Number of independent trials
    pub trials: usize,
    /// Time limit per trial in seconds
    pub time_limit: f64,
    /// Iteration limit per trial
    pub max_iterations: usize,
    /// Seed of the first trial; trial `t` uses `seed + t - 1`
    pub seed: u64,
    /// Show a progress bar
    pub progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            trials: 1,
            time_limit: 10.0,
            max_iterations: usize::MAX,
            seed: 0,
            progress: false,
        }
    }
}

/// Every parameter group of the solver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub objective: Objective,
    pub gvns: GvnsConfig,
    pub ant: AntConfig,
    pub beam: BeamConfig,
    pub local_search: LocalSearchConfig,
    pub benchmark: BenchmarkConfig,
}

impl SolverConfig {
    /// Load a (possibly partial) configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Cannot open config {}: {}", path.as_ref().display(), e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let config: SolverConfig =
            serde_json::from_str(content).map_err(|e| format!("Invalid config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.beam.beam_width == 0 || self.beam.to_choose == 0 || self.beam.max_children == 0 {
            return Err("beam_width, max_children and to_choose must be positive".to_string());
        }
        if self.beam.n_samples == 0 {
            return Err("n_samples must be positive".to_string());
        }
        if self.ant.n_ants == 0 {
            return Err("n_ants must be positive".to_string());
        }
        if self.benchmark.trials == 0 {
            return Err("trials must be positive".to_string());
        }
        if self.gvns.level_max == 0 {
            return Err("level_max must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SolverConfig::default();
        assert_eq!(config.gvns.level_max, 8);
        assert_eq!(config.gvns.iterlevel_max, 30);
        assert_eq!(config.objective, Objective::TourCost);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = SolverConfig::from_json(
            r#"{ "objective": "makespan", "beam": { "beam_width": 5 }, "gvns": { "restore_order": "paper" } }"#,
        )
        .unwrap();
        assert_eq!(config.objective, Objective::Makespan);
        assert_eq!(config.beam.beam_width, 5);
        assert_eq!(config.beam.to_choose, 2);
        assert_eq!(config.gvns.restore_order, FeasibilityOrder::Paper);
        assert_eq!(config.gvns.level_max, 8);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SolverConfig::from_json(r#"{ "beam": { "beam_width": 0 } }"#).is_err());
        assert!(SolverConfig::from_json("not json").is_err());
    }
}

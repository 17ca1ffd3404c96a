//! Trial driver and experiment statistics.
//!
//! Runs independent seeded trials of one solver on one instance, collects a
//! [`TrialResult`] per trial and summarises them the way the classical
//! TSPTW experiments report: best, mean and standard deviation of the final
//! cost, plus when the best solution was found.

use crate::budget::Budget;
use crate::config::BenchmarkConfig;
use crate::heuristics::Solver;
use crate::instance::TsptwInstance;
use crate::random::seeded;
use crate::report::ProgressSink;
use crate::solution::Solution;
use crate::tour::Tour;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;

/// Outcome of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub instance: String,
    pub algorithm: String,
    pub trial: usize,
    pub seed: u64,
    /// Value of the instance objective
    pub cost: f64,
    pub tour_cost: f64,
    pub makespan: f64,
    pub constraint_violations: usize,
    pub feasible: bool,
    pub iterations: usize,
    /// Iteration at which the final best was found
    pub best_iteration: usize,
    /// Seconds until the final best was found
    pub best_time: f64,
    /// Wall-clock duration of the trial
    pub total_time: f64,
    /// RFC 3339 timestamp of the end of the trial
    pub finished_at: String,
}

/// Aggregate over all trials of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialStatistics {
    pub instance: String,
    pub algorithm: String,
    pub trials: usize,
    pub num_feasible: usize,
    pub best_cost: f64,
    pub worst_cost: f64,
    pub mean_cost: f64,
    /// Sample standard deviation, 0 for a single trial
    pub std_cost: f64,
    pub mean_best_time: f64,
    pub mean_best_iteration: f64,
}

pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<TrialResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Seed of trial `trial` (1-based).
    pub fn trial_seed(&self, trial: usize) -> u64 {
        self.config.seed.wrapping_add(trial as u64 - 1)
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.config.trials as u64);
        if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} trials {msg}") {
            bar.set_style(style);
        }
        bar
    }

    /// Run every trial and return the best solution over all of them.
    pub fn run(
        &mut self,
        instance: &TsptwInstance,
        solver: &dyn Solver,
        sink: &mut dyn ProgressSink,
    ) -> Solution {
        let bar = self.progress_bar();
        let mut best: Option<(Tour, usize, f64)> = None;

        for trial in 1..=self.config.trials {
            let seed = self.trial_seed(trial);
            let mut rng = seeded(seed);
            let budget = Budget::new(self.config.time_limit, self.config.max_iterations);
            log::info!("# begin try {} (seed {})", trial, seed);

            let outcome = solver.solve(instance, &mut rng, &budget, trial, sink);
            let total_time = budget.elapsed();
            let tour = &outcome.best;
            log::info!(
                "# end try {}: cost {:.2}, {} violations, {} iterations, {:.1}s",
                trial,
                tour.cost(),
                tour.constraint_violations(),
                outcome.iterations,
                total_time
            );

            self.results.push(TrialResult {
                instance: instance.name.clone(),
                algorithm: solver.name().to_string(),
                trial,
                seed,
                cost: tour.cost(),
                tour_cost: tour.tour_cost(),
                makespan: tour.makespan(),
                constraint_violations: tour.constraint_violations(),
                feasible: tour.is_feasible(),
                iterations: outcome.iterations,
                best_iteration: outcome.best_iteration,
                best_time: outcome.best_time,
                total_time,
                finished_at: chrono::Local::now().to_rfc3339(),
            });

            bar.set_message(format!("best {:.2}", tour.cost()));
            bar.inc(1);

            let improves = best.as_ref().map_or(true, |(b, _, _)| outcome.best.better_than(b));
            if improves {
                best = Some((outcome.best, outcome.iterations, total_time));
            }
        }
        bar.finish_and_clear();

        match best {
            Some((tour, iterations, time)) => {
                let mut solution = Solution::from_tour(&tour, solver.name()).with_schedule(&tour);
                solution.iterations = Some(iterations);
                solution.computation_time = time;
                solution
            }
            // trials >= 1 is validated with the configuration
            None => Solution::from_tour(&Tour::random(instance, &mut seeded(self.config.seed)), solver.name()),
        }
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    /// Summary over the recorded trials, `None` before any trial ran.
    pub fn statistics(&self) -> Option<TrialStatistics> {
        let first = self.results.first()?;
        let costs: Vec<f64> = self.results.iter().map(|r| r.cost).collect();
        let best_times: Vec<f64> = self.results.iter().map(|r| r.best_time).collect();
        let best_iterations: Vec<f64> = self.results.iter().map(|r| r.best_iteration as f64).collect();

        let std_cost = if costs.len() > 1 { costs.iter().std_dev() } else { 0.0 };
        Some(TrialStatistics {
            instance: first.instance.clone(),
            algorithm: first.algorithm.clone(),
            trials: self.results.len(),
            num_feasible: self.results.iter().filter(|r| r.feasible).count(),
            best_cost: Statistics::min(costs.iter()),
            worst_cost: Statistics::max(costs.iter()),
            mean_cost: costs.iter().mean(),
            std_cost,
            mean_best_time: best_times.iter().mean(),
            mean_best_iteration: best_iterations.iter().mean(),
        })
    }

    /// Export results to CSV, one row per trial
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for result in &self.results {
            writer.serialize(result)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Export the per-trial results and the summary as one JSON document
    pub fn export_to_json<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        #[derive(Serialize)]
        struct Export<'r> {
            results: &'r [TrialResult],
            statistics: Option<TrialStatistics>,
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(
            file,
            &Export {
                results: &self.results,
                statistics: self.statistics(),
            },
        )?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!(
            "{:>7} {:>10} {:>10} {:>8} {:>10} {:>10}\n",
            "Trial", "Cost", "Cviols", "Iter", "BestTime", "Time"
        ));
        for r in &self.results {
            report.push_str(&format!(
                "{:>7} {:>10.2} {:>10} {:>8} {:>10.2} {:>10.2}\n",
                r.trial, r.cost, r.constraint_violations, r.best_iteration, r.best_time, r.total_time
            ));
        }
        if let Some(stats) = self.statistics() {
            report.push_str("-".repeat(60).as_str());
            report.push('\n');
            report.push_str(&format!(
                "{} on {}: best {:.2}  mean {:.2}  sd {:.2}  worst {:.2}  feasible {}/{}\n",
                stats.algorithm,
                stats.instance,
                stats.best_cost,
                stats.mean_cost,
                stats.std_cost,
                stats.worst_cost,
                stats.num_feasible,
                stats.trials
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AntConfig, LocalSearchConfig};
    use crate::heuristics::AntSolver;
    use crate::report::NullSink;

    fn create_test_instance() -> TsptwInstance {
        let n = 6;
        let distance = (0..n)
            .map(|i| (0..n).map(|j| (i as f64 - j as f64).abs()).collect())
            .collect();
        TsptwInstance::new("bench", distance, vec![0.0; n], vec![100.0; n]).unwrap()
    }

    fn config(trials: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            trials,
            time_limit: 10.0,
            max_iterations: 2,
            seed: 7,
            progress: false,
        }
    }

    #[test]
    fn test_trial_seeds() {
        let benchmark = Benchmark::new(config(3));
        assert_eq!(benchmark.trial_seed(1), 7);
        assert_eq!(benchmark.trial_seed(3), 9);
    }

    #[test]
    fn test_benchmark_runs_all_trials() {
        let instance = create_test_instance();
        let solver = AntSolver::new(AntConfig { n_ants: 2, det_rate: 0.9 }, LocalSearchConfig::default());
        let mut benchmark = Benchmark::new(config(3));
        let solution = benchmark.run(&instance, &solver, &mut NullSink);

        assert_eq!(benchmark.results().len(), 3);
        assert!(solution.feasible);
        assert_eq!(solution.algorithm, "ACO");

        let stats = benchmark.statistics().unwrap();
        assert_eq!(stats.trials, 3);
        assert_eq!(stats.num_feasible, 3);
        assert!(stats.best_cost <= stats.mean_cost && stats.mean_cost <= stats.worst_cost);
        assert_eq!(solution.cost, stats.best_cost);
        assert!(benchmark.generate_report().contains("ACO on bench"));
    }

    #[test]
    fn test_single_trial_has_zero_deviation() {
        let instance = create_test_instance();
        let solver = AntSolver::new(AntConfig::default(), LocalSearchConfig::default());
        let mut benchmark = Benchmark::new(config(1));
        benchmark.run(&instance, &solver, &mut NullSink);
        assert_eq!(benchmark.statistics().unwrap().std_cost, 0.0);

        let path = std::env::temp_dir().join("tsptw_benchmark_test.csv");
        benchmark.export_to_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(content.starts_with("instance,algorithm,trial"));
    }
}

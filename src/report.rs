//! Improvement events emitted by the solvers.

use crate::tour::Tour;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// A new best-so-far tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    pub trial: usize,
    pub iteration: usize,
    pub cost: f64,
    pub tour_cost: f64,
    pub makespan: f64,
    pub constraint_violations: usize,
    /// Seconds since the start of the trial
    pub elapsed: f64,
}

impl Improvement {
    pub fn new(tour: &Tour, trial: usize, iteration: usize, elapsed: f64) -> Self {
        Improvement {
            trial,
            iteration,
            cost: tour.cost(),
            tour_cost: tour.tour_cost(),
            makespan: tour.makespan(),
            constraint_violations: tour.constraint_violations(),
            elapsed,
        }
    }
}

/// Receives every improvement found during a run.
pub trait ProgressSink {
    fn improvement(&mut self, event: &Improvement);
}

/// Discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn improvement(&mut self, _event: &Improvement) {}
}

/// Logs improvements at `info` level.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn improvement(&mut self, event: &Improvement) {
        log::info!(
            "trial {} iter {}: cost {:.2} ({} violations) after {:.3}s",
            event.trial,
            event.iteration,
            event.cost,
            event.constraint_violations,
            event.elapsed
        );
    }
}

/// Keeps the whole trace in memory, optionally forwarding to another sink.
#[derive(Default)]
pub struct TraceRecorder {
    events: Vec<Improvement>,
    forward_to_log: bool,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log every event like [`LogSink`].
    pub fn logging() -> Self {
        TraceRecorder {
            events: Vec::new(),
            forward_to_log: true,
        }
    }

    pub fn events(&self) -> &[Improvement] {
        &self.events
    }

    /// Export the trace as CSV, one row per improvement.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for event in &self.events {
            writer.serialize(event)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ProgressSink for TraceRecorder {
    fn improvement(&mut self, event: &Improvement) {
        if self.forward_to_log {
            LogSink.improvement(event);
        }
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::TsptwInstance;

    #[test]
    fn test_trace_recorder() {
        let instance = TsptwInstance::new(
            "pair",
            vec![vec![0.0, 2.0], vec![2.0, 0.0]],
            vec![0.0, 0.0],
            vec![10.0, 10.0],
        )
        .unwrap();
        let mut tour = Tour::new(&instance);
        tour.add(1);

        let mut recorder = TraceRecorder::new();
        recorder.improvement(&Improvement::new(&tour, 1, 3, 0.5));
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(recorder.events()[0].cost, 4.0);
        assert_eq!(recorder.events()[0].iteration, 3);

        let path = std::env::temp_dir().join("tsptw_trace_recorder_test.csv");
        recorder.export_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("trial,iteration,cost"));
        let _ = std::fs::remove_file(&path);
    }
}

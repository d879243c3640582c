//! Collected timings of a run.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Phase;
use crate::error::Result;
use crate::timing::Timing;

/// One timed operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Measurement {
    pub phase: Phase,
    /// Entity collection (`Users`) or query label (`Query 3`).
    pub target: String,
    /// Rows inserted, or rows returned by a query. Absent for deletes.
    pub rows: Option<usize>,
    pub duration_ms: Timing,
}

/// Every measurement of one run, in execution order.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub backend: String,
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    pub measurements: Vec<Measurement>,
}

impl Report {
    pub fn new(backend: impl Into<String>, seed: u64) -> Self {
        Self {
            backend: backend.into(),
            seed,
            started_at: Utc::now(),
            measurements: Vec::new(),
        }
    }

    pub fn record(
        &mut self,
        phase: Phase,
        target: impl Into<String>,
        rows: Option<usize>,
        duration_ms: Timing,
    ) {
        self.measurements.push(Measurement {
            phase,
            target: target.into(),
            rows,
            duration_ms,
        });
    }

    /// Measurements of one phase.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter().filter(move |m| m.phase == phase)
    }

    /// Summed duration of a phase; unavailable if any measurement was.
    pub fn total(&self, phase: Phase) -> Timing {
        self.phase(phase).map(|m| m.duration_ms).sum()
    }

    /// Plain-text summary table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Summary for {} (seed {}, started {})",
            self.backend,
            self.seed,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(
            out,
            "{:<8} {:<12} {:>10} {:>14}",
            "PHASE", "TARGET", "ROWS", "DURATION"
        );
        for m in &self.measurements {
            let rows = m.rows.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<8} {:<12} {:>10} {:>14}",
                m.phase.to_string(),
                m.target,
                rows,
                m.duration_ms.to_string()
            );
        }
        for phase in [Phase::Insert, Phase::Select, Phase::Delete] {
            if self.phase(phase).next().is_some() {
                let _ = writeln!(
                    out,
                    "{:<8} {:<12} {:>10} {:>14}",
                    phase.to_string(),
                    "total",
                    "",
                    self.total(phase).to_string()
                );
            }
        }
        out
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::new("sqlite", 41);
        report.record(Phase::Insert, "Users", Some(10), Timing::Millis(1.5));
        report.record(Phase::Insert, "Posts", Some(10), Timing::Millis(2.0));
        report.record(Phase::Select, "Query 1", Some(5), Timing::Unavailable);
        report.record(Phase::Delete, "Posts", None, Timing::Millis(0.25));
        report
    }

    #[test]
    fn test_phase_totals() {
        let report = sample();
        assert_eq!(report.total(Phase::Insert), Timing::Millis(3.5));
        assert_eq!(report.total(Phase::Select), Timing::Unavailable);
        assert_eq!(report.total(Phase::Update), Timing::Millis(0.0));
    }

    #[test]
    fn test_render_text() {
        let text = sample().render_text();
        assert!(text.starts_with("Summary for sqlite (seed 41"));
        assert!(text.contains("Users"));
        assert!(text.contains("1.500 ms"));
        assert!(text.contains("N/A ms"));
        assert!(!text.contains("UPDATE"));
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["backend"], "sqlite");
        let measurements = value["measurements"].as_array().unwrap();
        assert_eq!(measurements.len(), 4);
        assert_eq!(measurements[0]["phase"], "INSERT");
        assert_eq!(measurements[0]["duration_ms"], 1.5);
        assert!(measurements[2]["duration_ms"].is_null());
        assert!(measurements[3]["rows"].is_null());
    }
}

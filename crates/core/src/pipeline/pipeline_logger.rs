use std::collections::HashMap;
use std::time::Instant;

/// Observer for orchestration events: crop progress, stage timings and
/// per-invocation counts.
///
/// Keeps the orchestrator free of any particular output mechanism; the CLI
/// aggregates into a summary, tests and embedders usually discard.
pub trait PipelineLogger: Send {
    /// `current` of `total` kept detections have been classified.
    fn progress(&mut self, current: usize, total: usize);

    /// How long one stage took for one detection (or one frame for `detect`).
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A per-invocation count such as `detections` or `classifications`.
    fn metric(&mut self, name: &str, value: f64);

    /// Marks the end of one pipeline invocation.
    fn invocation_finished(&mut self) {}

    /// Emit an aggregate report. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Running count and sum of one timing or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stat {
    pub count: usize,
    pub total: f64,
}

impl Stat {
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }
}

/// Aggregates timings and counts across invocations and reports them
/// through `log` on [`PipelineLogger::summary`]. Memory stays constant per
/// stage or metric name, however many invocations run.
pub struct StdoutPipelineLogger {
    timings: HashMap<String, Stat>,
    metrics: HashMap<String, Stat>,
    start_time: Instant,
    invocations: usize,
}

impl StdoutPipelineLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            invocations: 0,
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Pipeline summary ({} invocations, {:.1}s total):",
            self.invocations,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let stat = &self.timings[stage];
            lines.push(format!(
                "  {stage:10}: avg {:6.1}ms  total {:7.0}ms  ({} calls)",
                stat.mean(),
                stat.total,
                stat.count
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let stat = &self.metrics[name];
            lines.push(format!(
                "  {name}: avg {:.1}  total {:.0}",
                stat.mean(),
                stat.total
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timing_stat(&self, stage: &str) -> Option<Stat> {
        self.timings.get(stage).copied()
    }

    pub fn metric_stat(&self, name: &str) -> Option<Stat> {
        self.metrics.get(name).copied()
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        log::debug!("Classified {current}/{total} detections");
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .record(value);
    }

    fn invocation_finished(&mut self) {
        self.invocations += 1;
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

//! Per-iteration training diagnostics and where they go
//!
//! Recording is fire-and-forget from the trainer's point of view: a sink
//! returns an error, the session logs it and keeps training.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::algo::{vector::mean_std, UpdateReport};

pub const HISTOGRAM_BUCKETS: usize = 30;

/// Equal-width histogram with `bucket_limits[i]` the upper edge of bucket `i`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub num: f64,
    pub sum: f64,
    pub sum_squares: f64,
    pub bucket_limits: Vec<f64>,
    pub bucket_counts: Vec<f64>,
}

impl Histogram {
    /// `None` for empty input
    pub fn from_values(values: &[f32], num_buckets: usize) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let data: Vec<f64> = values.iter().map(|&v| v as f64).collect();

        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let sum: f64 = data.iter().sum();
        let sum_squares: f64 = data.iter().map(|x| x * x).sum();
        let num = data.len() as f64;

        // All values equal: one bucket holds everything
        if (max - min).abs() < f64::EPSILON {
            return Some(Self {
                min,
                max,
                num,
                sum,
                sum_squares,
                bucket_limits: vec![min + 1e-10],
                bucket_counts: vec![num],
            });
        }

        let num_buckets = num_buckets.max(1);
        let bucket_width = (max - min) / num_buckets as f64;
        let bucket_limits = (0..num_buckets)
            .map(|i| min + (i as f64 + 1.0) * bucket_width)
            .collect();
        let mut bucket_counts = vec![0.0; num_buckets];
        for &value in &data {
            let bucket = (((value - min) / bucket_width).floor() as usize).min(num_buckets - 1);
            bucket_counts[bucket] += 1.0;
        }

        Some(Self {
            min,
            max,
            num,
            sum,
            sum_squares,
            bucket_limits,
            bucket_counts,
        })
    }
}

/// L2 norm, standard deviation and histogram of a parameter-space vector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorSummary {
    pub norm: f32,
    pub std: f32,
    pub histogram: Option<Histogram>,
}

impl VectorSummary {
    pub fn of(values: &[f32]) -> Self {
        let norm = values.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt() as f32;
        Self {
            norm,
            std: mean_std(values).1,
            histogram: Histogram::from_values(values, HISTOGRAM_BUCKETS),
        }
    }
}

/// Scalars and summaries recorded for one training iteration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationDiagnostics {
    pub session: usize,
    pub iteration: usize,
    pub mean_reward: f32,
    pub episodes: usize,
    pub steps: usize,
    pub accepted: bool,
    pub reject_reason: Option<String>,
    /// Accepted fraction of the full step
    pub max_step_size: f32,
    pub kl_boundary_coeff: f32,
    pub effective_lr: f32,
    pub loss_improvement: f32,
    pub kl_divergence: f32,
    pub predicted_kl: f32,
    pub value_loss: f32,
    pub search_direction: VectorSummary,
    pub full_step: VectorSummary,
}

impl IterationDiagnostics {
    pub fn from_report(
        session: usize,
        iteration: usize,
        mean_reward: f32,
        episodes: usize,
        steps: usize,
        report: &UpdateReport,
    ) -> Self {
        let reject_reason = match report.outcome {
            crate::algo::UpdateOutcome::Accepted => None,
            crate::algo::UpdateOutcome::Rejected(reason) => Some(reason.to_string()),
        };
        Self {
            session,
            iteration,
            mean_reward,
            episodes,
            steps,
            accepted: report.outcome.is_accepted(),
            reject_reason,
            max_step_size: report.step_fraction,
            kl_boundary_coeff: report.kl_coefficient,
            effective_lr: report.effective_lr,
            loss_improvement: report.improvement,
            kl_divergence: report.kl,
            predicted_kl: report.predicted_kl,
            value_loss: report.value_loss_after,
            search_direction: VectorSummary::of(&report.search_direction),
            full_step: VectorSummary::of(&report.full_step),
        }
    }
}

/// Receives diagnostics once per recorded iteration
pub trait DiagnosticsSink {
    fn record(&mut self, diagnostics: &IterationDiagnostics) -> anyhow::Result<()>;
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn record(&mut self, _diagnostics: &IterationDiagnostics) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Emits one structured `tracing` event per iteration
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&mut self, d: &IterationDiagnostics) -> anyhow::Result<()> {
        info!(
            session = d.session,
            iteration = d.iteration,
            mean_reward = d.mean_reward,
            episodes = d.episodes,
            accepted = d.accepted,
            max_step_size = d.max_step_size,
            kl_boundary_coeff = d.kl_boundary_coeff,
            effective_lr = d.effective_lr,
            loss_improvement = d.loss_improvement,
            kl = d.kl_divergence,
            value_loss = d.value_loss,
            search_dir_norm = d.search_direction.norm,
            full_step_norm = d.full_step.norm,
            "iteration"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// `<logdir>/<env>/<session>/diagnostics.jsonl`
    pub fn path_for(logdir: &Path, env_name: &str, session: usize) -> PathBuf {
        logdir
            .join(env_name)
            .join(session.to_string())
            .join("diagnostics.jsonl")
    }

    pub fn create(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating diagnostics directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticsSink for JsonLinesSink {
    fn record(&mut self, diagnostics: &IterationDiagnostics) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, diagnostics)?;
        self.writer.write_all(b"\n")?;
        self.writer
            .flush()
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Fans out to several sinks; every sink sees every record
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn DiagnosticsSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl DiagnosticsSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl DiagnosticsSink for MultiSink {
    /// Reports the first failure after all sinks were tried
    fn record(&mut self, diagnostics: &IterationDiagnostics) -> anyhow::Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.record(diagnostics) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

//! Posterior sample storage.
//!
//! [`Results`] is an append-only table of accepted parameter vectors and their
//! log-likelihoods. It grows across repeated sampler runs and never shrinks or
//! deduplicates. A short [`RunRecord`] is kept for every completed run, including
//! runs that stored no rows, and [`Results::summary`] reduces the table to
//! per-parameter statistics.

use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{OrbitFitError, Result};

/// Bookkeeping for one sampler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Name of the sampler that produced the samples
    pub sampler: String,
    /// Number of rows appended by the run
    pub samples_added: usize,
    /// Fraction of accepted proposals, when the sampler tracks it
    pub acceptance_fraction: Option<f64>,
}

/// Accumulated posterior samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Results {
    sampler_name: String,
    labels: Vec<String>,
    post: Array2<f64>,
    lnlike: Array1<f64>,
    history: Vec<RunRecord>,
}

/// Per-parameter statistics of the stored posterior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosteriorSummary {
    pub num_samples: usize,

    pub means: HashMap<String, f64>,

    pub stds: HashMap<String, f64>,

    /// Median parameter values (50th percentile)
    pub medians: HashMap<String, f64>,

    /// Central intervals as `(probability, (lower, upper))`, e.g. `(0.68, (..))`
    pub percentiles: HashMap<String, Vec<(f64, (f64, f64))>>,
}

impl Results {
    /// Empty container for samples labelled by `labels`.
    pub fn new(sampler_name: impl Into<String>, labels: Vec<String>) -> Self {
        let num_params = labels.len();
        Self {
            sampler_name: sampler_name.into(),
            labels,
            post: Array2::zeros((0, num_params)),
            lnlike: Array1::zeros(0),
            history: Vec::new(),
        }
    }

    /// Append rows of `post` (shape `(n, P)`) with their log-likelihoods.
    pub fn add_samples(&mut self, post: ArrayView2<f64>, lnlike: ArrayView1<f64>) -> Result<()> {
        if post.ncols() != self.labels.len() {
            return Err(OrbitFitError::DimensionMismatch(format!(
                "samples have {} columns, expected {}",
                post.ncols(),
                self.labels.len()
            )));
        }
        if post.nrows() != lnlike.len() {
            return Err(OrbitFitError::DimensionMismatch(format!(
                "{} samples but {} log-likelihoods",
                post.nrows(),
                lnlike.len()
            )));
        }

        self.post = concatenate(Axis(0), &[self.post.view(), post.view()])
            .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))?;
        self.lnlike = concatenate(Axis(0), &[self.lnlike.view(), lnlike.view()])
            .map_err(|e| OrbitFitError::DimensionMismatch(e.to_string()))?;
        Ok(())
    }

    /// Remember a completed run.
    pub fn record_run(&mut self, record: RunRecord) {
        self.history.push(record);
    }

    pub fn sampler_name(&self) -> &str {
        &self.sampler_name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Posterior samples, shape `(n, P)`.
    pub fn post(&self) -> &Array2<f64> {
        &self.post
    }

    /// Log-likelihood of every sample.
    pub fn lnlike(&self) -> &Array1<f64> {
        &self.lnlike
    }

    pub fn num_samples(&self) -> usize {
        self.post.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.post.nrows() == 0
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Marginal samples of a labelled parameter.
    pub fn parameter(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .labels
            .iter()
            .position(|label| label == name)
            .ok_or_else(|| OrbitFitError::ParameterNotFound(name.to_string()))?;
        Ok(self.post.column(idx))
    }

    /// Means, standard deviations, medians and central intervals of every parameter.
    ///
    /// `percentiles` are interval probabilities, e.g. `0.68` or `0.95`.
    pub fn summary(&self, percentiles: &[f64]) -> Result<PosteriorSummary> {
        let n_samples = self.num_samples();
        if n_samples == 0 {
            return Err(OrbitFitError::InvalidData(
                "cannot summarize an empty posterior".to_string(),
            ));
        }
        if let Some(p) = percentiles.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(OrbitFitError::InvalidConfiguration(format!(
                "interval probability {} is outside [0, 1]",
                p
            )));
        }

        let mut means = HashMap::new();
        let mut stds = HashMap::new();
        let mut medians = HashMap::new();
        let mut percentile_results = HashMap::new();

        for (label, column) in self.labels.iter().zip(self.post.columns()) {
            let mut samples = column.to_vec();
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            let mean = samples.iter().sum::<f64>() / n_samples as f64;
            let var = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n_samples as f64;
            means.insert(label.clone(), mean);
            stds.insert(label.clone(), var.sqrt());

            let median = if n_samples % 2 == 0 {
                let mid = n_samples / 2;
                (samples[mid - 1] + samples[mid]) / 2.0
            } else {
                samples[n_samples / 2]
            };
            medians.insert(label.clone(), median);

            let mut intervals = Vec::with_capacity(percentiles.len());
            for &p in percentiles {
                let lower_idx = ((n_samples as f64) * ((1.0 - p) / 2.0)).round() as usize;
                let upper_idx = ((n_samples as f64) * (1.0 - (1.0 - p) / 2.0)).round() as usize;
                let lower = samples[lower_idx.min(n_samples - 1)];
                let upper = samples[upper_idx.min(n_samples - 1)];
                intervals.push((p, (lower, upper)));
            }
            percentile_results.insert(label.clone(), intervals);
        }

        Ok(PosteriorSummary {
            num_samples: n_samples,
            means,
            stds,
            medians,
            percentiles: percentile_results,
        })
    }

    /// Write the container as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// Read a container written by [`Results::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let results: Results = serde_json::from_reader(reader)?;
        if results.post.ncols() != results.labels.len() || results.post.nrows() != results.lnlike.len() {
            return Err(OrbitFitError::DimensionMismatch(
                "stored posterior does not match its labels".to_string(),
            ));
        }
        Ok(results)
    }
}

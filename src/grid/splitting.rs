use ndarray::ArrayView2;
use rand::{seq::index::sample, Rng};

/// Candidate splits drawn from observed values.
#[derive(Debug, Clone)]
pub struct RandomSplit {
    pub split_try: usize,
    /// Share of columns offered per round.
    pub max_features: f64,
}

impl RandomSplit {
    /// Draws `(column, value)` candidates: a `max_features` share of the
    /// columns (at least one), and `split_try` observed values in each.
    pub fn sample_splits<R: Rng + ?Sized>(&self, rng: &mut R, x: ArrayView2<f64>) -> Vec<(usize, f64)> {
        let nrows = x.nrows();
        let ncols = x.ncols();
        if nrows == 0 || ncols == 0 {
            return vec![];
        }
        let ncols_to_sample = ((self.max_features * ncols as f64) as usize).clamp(1, ncols);
        let nrows_to_sample = self.split_try.min(nrows);

        let mut splits = Vec::with_capacity(ncols_to_sample * nrows_to_sample);
        for col in sample(rng, ncols, ncols_to_sample) {
            for idx in sample(rng, nrows, nrows_to_sample) {
                splits.push((col, x[[idx, col]]));
            }
        }
        splits
    }
}

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{check_len, Result};

pub mod aggregator;
pub mod context;
pub mod tree_weighter;

pub use aggregator::{aggregate_forest_weights, AggregationStrategy};
pub use context::ExecutionContext;
pub use tree_weighter::{accumulate_tree_weight, compute_tree_weight};

/// Forest weight matrix of shape (n_eval, n_honest).
///
/// Entry (i, j) is the share of trees in which honest observation j shares a
/// leaf with evaluation observation i, divided by that leaf's honest
/// population. Rows sum to one unless some tree left row i in a leaf without
/// honest occupants.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestWeights {
    weights: Array2<f64>,
}

impl ForestWeights {
    pub fn new(weights: Array2<f64>) -> Self {
        Self { weights }
    }

    pub fn n_eval(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_honest(&self) -> usize {
        self.weights.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.weights
    }

    /// Linear prediction of the honest outcome for every evaluation row.
    pub fn predict(&self, outcome: ArrayView1<f64>) -> Result<Array1<f64>> {
        check_len("honest outcome", self.n_honest(), outcome.len())?;
        Ok(self.weights.dot(&outcome))
    }

    /// Average weight vector over all evaluation rows.
    pub fn row_mean(&self) -> Array1<f64> {
        self.weights
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_honest()))
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            weights: self.weights.select(Axis(0), rows),
        }
    }
}

pub mod data;
pub mod error;
pub mod forest;
pub mod grid;
pub mod leaf_index;
pub mod leaf_means;
pub mod margin;
pub mod probabilities;
pub mod test_data;
pub mod variance;
pub mod weights;

use ndarray::{ArrayView1, ArrayView2};
use rand::Rng;

pub use error::{OrfError, Result};
pub use forest::{OrderedForest, OrderedForestParams, OrderedForestParamsBuilder, Prediction};
pub use leaf_index::LeafIndex;
pub use margin::{EvalPoint, MarginalEffects};
pub use weights::{AggregationStrategy, ExecutionContext, ForestWeights};

/// A fitted tree ensemble that maps observations to tree-local leaf ids.
///
/// Implementations are read-only after fitting and shared across worker
/// threads during prediction.
pub trait LeafAssigner: Send + Sync {
    /// Leaf of every row of `x` in every tree, shape (n_rows, n_trees).
    fn apply(&self, x: ArrayView2<f64>) -> Result<LeafIndex>;

    fn n_trees(&self) -> usize;

    /// Upper bound on the leaf ids `apply` can return.
    fn max_leaf_id(&self) -> usize;

    /// Rows of the fitting sample that tree `tree` was grown on, repeated
    /// when drawn more than once. `None` if the tree saw the whole sample.
    fn in_bag(&self, _tree: usize) -> Option<&[usize]> {
        None
    }
}

/// Grows one binary regression ensemble for a cut-point outcome.
pub trait EnsembleFitter {
    type Model: LeafAssigner;

    fn fit<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rng: &mut R,
        ctx: &ExecutionContext,
    ) -> Result<Self::Model>;
}

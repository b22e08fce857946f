use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{check_len, OrfError, Result};
use crate::leaf_index::LeafIndex;

use super::context::ExecutionContext;
use super::tree_weighter::{add_tree_weight, compute_tree_weight};
use super::ForestWeights;

/// How per-tree weight contributions are summed over the forest.
///
/// All variants yield the same matrix up to floating-point summation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Single-threaded running sum.
    Sequential,
    /// One task per tree, every per-tree matrix collected, then summed.
    /// Peak memory grows with n_trees x n_eval x n_honest.
    Pooled,
    /// One task per tree adding into a single mutex-guarded buffer.
    SharedAccumulator,
    /// Trees split into contiguous chunks with one partial sum per chunk.
    /// `n_chunks == 0` uses one chunk per worker thread.
    Chunked { n_chunks: usize },
}

impl Default for AggregationStrategy {
    fn default() -> Self {
        AggregationStrategy::Chunked { n_chunks: 0 }
    }
}

/// Sums the per-tree weights of the first `n_trees` trees and divides by
/// `n_trees`.
///
/// A sequential `ctx` runs every strategy as [`AggregationStrategy::Sequential`].
/// If any tree task fails, outstanding tasks are abandoned and no partial
/// sum is returned.
pub fn aggregate_forest_weights(
    eval_leaves: &LeafIndex,
    honest_leaves: &LeafIndex,
    n_trees: usize,
    strategy: AggregationStrategy,
    ctx: &ExecutionContext,
) -> Result<ForestWeights> {
    if n_trees == 0 {
        return Err(OrfError::DegenerateNormalization(
            "cannot average weights over an empty ensemble".into(),
        ));
    }
    check_len("evaluation leaf index trees", n_trees, eval_leaves.n_trees())?;
    check_len("honest leaf index trees", n_trees, honest_leaves.n_trees())?;

    let shape = (eval_leaves.n_observations(), honest_leaves.n_observations());
    let strategy = if ctx.is_parallel() {
        strategy
    } else {
        AggregationStrategy::Sequential
    };
    debug!(
        n_trees,
        n_eval = shape.0,
        n_honest = shape.1,
        ?strategy,
        "aggregating forest weights"
    );

    let tree_weight =
        |tree: usize| compute_tree_weight(eval_leaves.tree(tree), honest_leaves.tree(tree));
    let sum = match strategy {
        AggregationStrategy::Sequential => sum_range(eval_leaves, honest_leaves, 0..n_trees, shape),
        AggregationStrategy::Pooled => pooled(n_trees, shape, ctx, tree_weight)?,
        AggregationStrategy::SharedAccumulator => {
            shared_accumulator(n_trees, shape, ctx, tree_weight)?
        }
        AggregationStrategy::Chunked { n_chunks } => {
            let n_chunks = if n_chunks == 0 { ctx.n_threads() } else { n_chunks };
            chunked(eval_leaves, honest_leaves, n_trees, n_chunks, shape, ctx)?
        }
    };

    Ok(ForestWeights::new(sum / n_trees as f64))
}

/// Runs one worker task, turning a panic into a typed failure.
fn run_task<T>(tree: usize, task: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(task))
        .map_err(|_| OrfError::ConcurrencyFailure(format!("weight task for tree {tree} panicked")))
}

fn sum_range(
    eval_leaves: &LeafIndex,
    honest_leaves: &LeafIndex,
    trees: Range<usize>,
    shape: (usize, usize),
) -> Array2<f64> {
    let mut acc = Array2::zeros(shape);
    for tree in trees {
        add_tree_weight(eval_leaves.tree(tree), honest_leaves.tree(tree), acc.view_mut());
    }
    acc
}

fn pooled<F>(
    n_trees: usize,
    shape: (usize, usize),
    ctx: &ExecutionContext,
    tree_weight: F,
) -> Result<Array2<f64>>
where
    F: Fn(usize) -> Array2<f64> + Sync,
{
    let per_tree: Vec<Array2<f64>> = ctx.install(|| {
        (0..n_trees)
            .into_par_iter()
            .map(|tree| run_task(tree, || tree_weight(tree)))
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(per_tree
        .iter()
        .fold(Array2::zeros(shape), |acc, tree_weight| acc + tree_weight))
}

fn shared_accumulator<F>(
    n_trees: usize,
    shape: (usize, usize),
    ctx: &ExecutionContext,
    tree_weight: F,
) -> Result<Array2<f64>>
where
    F: Fn(usize) -> Array2<f64> + Sync,
{
    let buffer = Mutex::new(Array2::<f64>::zeros(shape));

    ctx.install(|| {
        (0..n_trees).into_par_iter().try_for_each(|tree| {
            let weight = run_task(tree, || tree_weight(tree))?;
            // only the addition happens under the lock
            let mut acc = buffer
                .lock()
                .map_err(|_| OrfError::ConcurrencyFailure("weight buffer lock poisoned".into()))?;
            *acc += &weight;
            Ok::<(), OrfError>(())
        })
    })?;

    buffer
        .into_inner()
        .map_err(|_| OrfError::ConcurrencyFailure("weight buffer lock poisoned".into()))
}

fn chunked(
    eval_leaves: &LeafIndex,
    honest_leaves: &LeafIndex,
    n_trees: usize,
    n_chunks: usize,
    shape: (usize, usize),
    ctx: &ExecutionContext,
) -> Result<Array2<f64>> {
    let chunks = chunk_ranges(n_trees, n_chunks);
    let partials: Vec<Array2<f64>> = ctx.install(|| {
        chunks
            .into_par_iter()
            .map(|trees| {
                run_task(trees.start, || sum_range(eval_leaves, honest_leaves, trees, shape))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok(partials
        .iter()
        .fold(Array2::zeros(shape), |acc, partial| acc + partial))
}

/// Contiguous, near-equal tree ranges covering `0..n_trees`.
fn chunk_ranges(n_trees: usize, n_chunks: usize) -> Vec<Range<usize>> {
    let n_chunks = n_chunks.clamp(1, n_trees.max(1));
    let chunk_len = n_trees.div_ceil(n_chunks);
    (0..n_trees)
        .step_by(chunk_len.max(1))
        .map(|start| start..(start + chunk_len).min(n_trees))
        .collect()
}

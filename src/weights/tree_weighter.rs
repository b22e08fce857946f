use std::collections::HashMap;

use ndarray::{Array2, ArrayView1, ArrayViewMut2};

use crate::error::{check_len, Result};

/// Honest observations per leaf of a single tree.
///
/// Looking a leaf up here is equivalent to the one-hot formulation over the
/// union of both samples' leaf ids: a leaf seen only by the evaluation
/// sample has an empty honest column, a leaf seen only by the honest sample
/// has no evaluation row and is never visited.
fn honest_members(honest_leaves: ArrayView1<usize>) -> HashMap<usize, Vec<usize>> {
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (j, &leaf) in honest_leaves.iter().enumerate() {
        members.entry(leaf).or_default().push(j);
    }
    members
}

/// Adds one tree's weights onto `out`, which must be (n_eval, n_honest).
pub(crate) fn add_tree_weight(
    eval_leaves: ArrayView1<usize>,
    honest_leaves: ArrayView1<usize>,
    mut out: ArrayViewMut2<f64>,
) {
    let members = honest_members(honest_leaves);
    for (mut row, leaf) in out.outer_iter_mut().zip(eval_leaves.iter()) {
        // empty honest leaf: the tree contributes nothing to this row
        let Some(cols) = members.get(leaf) else {
            continue;
        };
        let weight = 1.0 / cols.len() as f64;
        for &j in cols {
            row[j] += weight;
        }
    }
}

/// Weight contribution of a single tree, shape (n_eval, n_honest).
///
/// Row i holds `1 / population` for every honest observation sharing
/// evaluation observation i's leaf, so it sums to 1 when that leaf has
/// honest occupants and to 0 otherwise.
pub fn compute_tree_weight(
    eval_leaves: ArrayView1<usize>,
    honest_leaves: ArrayView1<usize>,
) -> Array2<f64> {
    let mut out = Array2::zeros((eval_leaves.len(), honest_leaves.len()));
    add_tree_weight(eval_leaves, honest_leaves, out.view_mut());
    out
}

/// In-place variant of [`compute_tree_weight`] for running sums.
pub fn accumulate_tree_weight(
    eval_leaves: ArrayView1<usize>,
    honest_leaves: ArrayView1<usize>,
    out: ArrayViewMut2<f64>,
) -> Result<()> {
    check_len("weight accumulator rows", eval_leaves.len(), out.nrows())?;
    check_len("weight accumulator columns", honest_leaves.len(), out.ncols())?;
    add_tree_weight(eval_leaves, honest_leaves, out);
    Ok(())
}

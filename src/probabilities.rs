use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{OrfError, Result};

/// Turns cumulative cut-point probabilities into class probabilities.
///
/// `cumulative` holds one column per cut-point, column k estimating
/// P(Y <= k + 1 | X). The bounds P(Y <= 0) = 0 and P(Y <= max) = 1 are
/// added, adjacent columns are differenced, negative masses (from cut-point
/// forests fitted independently) are clipped to zero and every row is
/// renormalised to one.
pub fn assemble_class_probabilities(cumulative: ArrayView2<f64>) -> Result<Array2<f64>> {
    let (n_rows, n_cuts) = cumulative.dim();
    let n_classes = n_cuts + 1;
    let mut probs = Array2::zeros((n_rows, n_classes));

    for (i, (cum_row, mut prob_row)) in cumulative
        .outer_iter()
        .zip(probs.outer_iter_mut())
        .enumerate()
    {
        let mut lower = 0.0;
        for class in 0..n_classes {
            let upper = if class < n_cuts { cum_row[class] } else { 1.0 };
            let mass = upper - lower;
            // NaN passes through so the row is reported below
            prob_row[class] = if mass < 0.0 { 0.0 } else { mass };
            lower = upper;
        }
        let row_sum = prob_row.sum();
        if row_sum == 0.0 || !row_sum.is_finite() {
            return Err(OrfError::DegenerateNormalization(format!(
                "class probabilities of row {i} sum to {row_sum}"
            )));
        }
        prob_row /= row_sum;
    }

    Ok(probs)
}

/// Most probable class per row, numbered from 1.
pub fn class_predictions(probs: ArrayView2<f64>) -> Array1<usize> {
    probs.map_axis(Axis(1), |row| {
        row.iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (class, &p)| {
                if p > best.1 {
                    (class, p)
                } else {
                    best
                }
            })
            .0
            + 1
    })
}

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use tracing::warn;

use crate::error::{OrfError, Result};

use super::EvalPoint;

/// Covariates with at most this many distinct values are categorical.
const MAX_CATEGORIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovariateKind {
    Continuous,
    /// Exactly two distinct values.
    Binary,
    /// Three to ten distinct values, stepped by one unit.
    Categorical,
}

/// Classifies a covariate by its number of distinct values.
pub fn covariate_kind(covariate: usize, column: ArrayView1<f64>) -> Result<CovariateKind> {
    let n_distinct = column.iter().copied().sorted_by(f64::total_cmp).dedup().count();
    match n_distinct {
        0 | 1 => Err(OrfError::ConstantCovariate { covariate }),
        2 => Ok(CovariateKind::Binary),
        n if n <= MAX_CATEGORIES => Ok(CovariateKind::Categorical),
        _ => Ok(CovariateKind::Continuous),
    }
}

/// Shifted values of one covariate.
///
/// `up` and `down` hold one value per evaluation row for
/// [`EvalPoint::Mean`] and a single value otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    pub covariate: usize,
    pub kind: CovariateKind,
    pub up: Array1<f64>,
    pub down: Array1<f64>,
    /// Mean gap `up - down`; 1 for binary and categorical covariates.
    pub scale: f64,
}

impl Perturbation {
    /// `x_eval` with the covariate replaced by its shifted-up values.
    pub fn apply_up(&self, x_eval: ArrayView2<f64>) -> Array2<f64> {
        self.replace(x_eval, &self.up)
    }

    pub fn apply_down(&self, x_eval: ArrayView2<f64>) -> Array2<f64> {
        self.replace(x_eval, &self.down)
    }

    fn replace(&self, x_eval: ArrayView2<f64>, values: &Array1<f64>) -> Array2<f64> {
        let mut x = x_eval.to_owned();
        // a single value broadcasts over all rows
        x.column_mut(self.covariate).assign(values);
        x
    }
}

/// Up and down values of `covariate` around the evaluation point, `window`
/// reference standard deviations apart on each side and kept within the
/// reference range.
pub fn perturbation(
    covariate: usize,
    x_eval: ArrayView2<f64>,
    x_ref: ArrayView2<f64>,
    eval_point: EvalPoint,
    window: f64,
) -> Result<Perturbation> {
    let eval_column = x_eval.column(covariate);
    let ref_column = x_ref.column(covariate);
    let kind = covariate_kind(covariate, eval_column)?;

    if kind == CovariateKind::Binary {
        let (min, max) = min_max(eval_column);
        return Ok(Perturbation {
            covariate,
            kind,
            up: Array1::from_elem(center_len(eval_column, eval_point), max),
            down: Array1::from_elem(center_len(eval_column, eval_point), min),
            scale: 1.0,
        });
    }

    let (ref_min, ref_max) = min_max(ref_column);
    let sd = ref_column.std(1.0);
    if !(sd > 0.0) || ref_min == ref_max {
        return Err(OrfError::ConstantCovariate { covariate });
    }
    let step = window * sd;
    let center = center(eval_column, eval_point);

    let mut up = center.mapv(|c| {
        let v = if c + step >= ref_max { ref_max } else { c + step };
        if v <= ref_min {
            ref_min + step
        } else {
            v
        }
    });
    let mut down = center.mapv(|c| {
        let v = if c - step <= ref_min { ref_min } else { c - step };
        if v >= ref_max {
            ref_max - step
        } else {
            v
        }
    });

    let n_coinciding = separate_coinciding(&mut up, &mut down, step, ref_min, ref_max);
    if n_coinciding > 0 {
        warn!(covariate, n_coinciding, "perturbed values coincided, gap widened");
    }

    if kind == CovariateKind::Categorical {
        up.mapv_inplace(f64::ceil);
        down = &up - 1.0;
        return Ok(Perturbation {
            covariate,
            kind,
            up,
            down,
            scale: 1.0,
        });
    }

    let scale = (&up - &down).mean().unwrap_or(0.0);
    if !(scale > 0.0) {
        return Err(OrfError::DegenerateNormalization(format!(
            "perturbation of covariate {covariate} has no width"
        )));
    }
    Ok(Perturbation {
        covariate,
        kind,
        up,
        down,
        scale,
    })
}

/// Moves coinciding `up`/`down` pairs apart by half a step towards the side
/// with more room in `[ref_min, ref_max]` and returns how many pairs moved.
///
/// The clipping above keeps the values apart for any positive step, so only
/// floating-point rounding of `center +- step` can produce equal pairs.
fn separate_coinciding(
    up: &mut Array1<f64>,
    down: &mut Array1<f64>,
    step: f64,
    ref_min: f64,
    ref_max: f64,
) -> usize {
    let mut n_moved = 0;
    for (u, d) in up.iter_mut().zip(down.iter_mut()) {
        if *u != *d {
            continue;
        }
        n_moved += 1;
        if ref_max - *u >= *d - ref_min {
            *u = (*u + 0.5 * step).min(ref_max);
        } else {
            *d = (*d - 0.5 * step).max(ref_min);
        }
    }
    n_moved
}

fn center_len(column: ArrayView1<f64>, eval_point: EvalPoint) -> usize {
    match eval_point {
        EvalPoint::Mean => column.len(),
        EvalPoint::AtMean | EvalPoint::AtMedian => 1,
    }
}

fn center(column: ArrayView1<f64>, eval_point: EvalPoint) -> Array1<f64> {
    match eval_point {
        EvalPoint::Mean => column.to_owned(),
        EvalPoint::AtMean => Array1::from_elem(1, column.mean().unwrap_or(0.0)),
        EvalPoint::AtMedian => Array1::from_elem(1, median(column)),
    }
}

fn median(column: ArrayView1<f64>) -> f64 {
    let values = column.iter().copied().sorted_by(f64::total_cmp).collect_vec();
    let n = values.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => values[n / 2],
        _ => 0.5 * (values[n / 2 - 1] + values[n / 2]),
    }
}

fn min_max(column: ArrayView1<f64>) -> (f64, f64) {
    match column.iter().copied().minmax() {
        MinMaxResult::NoElements => (f64::INFINITY, f64::NEG_INFINITY),
        MinMaxResult::OneElement(v) => (v, v),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    }
}

use ndarray::{Array1, Array2, ArrayView1, Zip};

use crate::error::{check_len, OrfError, Result};
use crate::weights::ForestWeights;

/// The finite-sample factor n / (n - 1).
pub(crate) fn sample_scale(n: usize) -> Result<f64> {
    if n < 2 {
        return Err(OrfError::DegenerateNormalization(format!(
            "variance needs at least two observations, got {n}"
        )));
    }
    Ok(n as f64 / (n as f64 - 1.0))
}

/// Contributions `w_j * y_j - prediction / n` of every honest observation to
/// one linear prediction.
pub(crate) fn demeaned_contributions(
    weights: ArrayView1<f64>,
    outcome: ArrayView1<f64>,
    n: usize,
) -> Array1<f64> {
    let mean = weights.dot(&outcome) / n as f64;
    Zip::from(weights)
        .and(outcome)
        .map_collect(|&w, &y| w * y - mean)
}

/// Per-class variance from the de-meaned contributions of every cut-point.
///
/// Var(class k) = Var(cum k) + Var(cum k-1) - 2 Cov(cum k-1, cum k); the
/// outer bounds P = 0 and P = 1 carry no variance.
pub(crate) fn class_variance(demeaned: &[Array1<f64>], scale: f64) -> Array1<f64> {
    let n_cuts = demeaned.len();
    let cut_variance: Vec<f64> = demeaned.iter().map(|a| scale * a.dot(a)).collect();
    let adjacent_covariance: Vec<f64> = demeaned
        .windows(2)
        .map(|pair| 2.0 * scale * pair[0].dot(&pair[1]))
        .collect();

    Array1::from_shape_fn(n_cuts + 1, |class| {
        let upper = if class < n_cuts { cut_variance[class] } else { 0.0 };
        let lower = if class > 0 { cut_variance[class - 1] } else { 0.0 };
        let covariance = if class > 0 && class < n_cuts {
            adjacent_covariance[class - 1]
        } else {
            0.0
        };
        // exact arithmetic is a sum of squares; clip rounding noise
        (upper + lower - covariance).max(0.0)
    })
}

fn check_inputs(weights: &[ForestWeights], outcomes: &[ArrayView1<f64>]) -> Result<usize> {
    if weights.is_empty() {
        return Err(OrfError::InvalidInput(
            "variance needs at least one cut-point".into(),
        ));
    }
    check_len("outcomes per cut-point", weights.len(), outcomes.len())?;
    let n_eval = weights[0].n_eval();
    for (w, y) in weights.iter().zip(outcomes) {
        check_len("weight matrix rows", n_eval, w.n_eval())?;
        check_len("honest outcome", w.n_honest(), y.len())?;
    }
    Ok(n_eval)
}

fn fill_rows(
    weights: &[ForestWeights],
    outcomes: &[ArrayView1<f64>],
    rows: &[usize],
    n: usize,
    out: &mut Array2<f64>,
) -> Result<()> {
    let scale = sample_scale(n)?;
    for &i in rows {
        let demeaned: Vec<Array1<f64>> = weights
            .iter()
            .zip(outcomes)
            .map(|(w, y)| demeaned_contributions(w.view().row(i), y.view(), n))
            .collect();
        out.row_mut(i).assign(&class_variance(&demeaned, scale));
    }
    Ok(())
}

/// Analytic variance of the class probabilities of every evaluation row.
///
/// `weights[k]` and `outcomes[k]` belong to cut-point k; `honest_size` is the
/// n of the n / (n - 1) correction and of the de-meaning.
pub fn estimate_variance(
    weights: &[ForestWeights],
    outcomes: &[ArrayView1<f64>],
    honest_size: usize,
) -> Result<Array2<f64>> {
    let n_eval = check_inputs(weights, outcomes)?;
    let mut variance = Array2::zeros((n_eval, weights.len() + 1));
    let rows: Vec<usize> = (0..n_eval).collect();
    fill_rows(weights, outcomes, &rows, honest_size, &mut variance)?;
    Ok(variance)
}

/// Variance of fit-time predictions when the evaluation rows are the union
/// of the training and honest samples.
///
/// Rows listed in `honest` use n = honest.len(), rows in `train` use
/// n = train.len(); results stay in the original row order.
pub fn estimate_variance_split(
    weights: &[ForestWeights],
    outcomes: &[ArrayView1<f64>],
    train: &[usize],
    honest: &[usize],
) -> Result<Array2<f64>> {
    let n_eval = check_inputs(weights, outcomes)?;
    check_len("train and honest partition", n_eval, train.len() + honest.len())?;
    let mut variance = Array2::zeros((n_eval, weights.len() + 1));
    fill_rows(weights, outcomes, honest, honest.len(), &mut variance)?;
    fill_rows(weights, outcomes, train, train.len(), &mut variance)?;
    Ok(variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Axis};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_weights(rng: &mut StdRng, n_eval: usize, n_honest: usize) -> ForestWeights {
        let mut w = Array2::from_shape_fn((n_eval, n_honest), |_| rng.gen_range(0.0..1.0));
        let sums = w.sum_axis(Axis(1)).insert_axis(Axis(1));
        w /= &sums;
        ForestWeights::new(w)
    }

    #[test]
    fn test_single_cut_point_by_hand() {
        let weights = vec![ForestWeights::new(array![[0.5, 0.5, 0.0, 0.0]])];
        let outcome = array![1.0, 0.0, 1.0, 1.0];
        let var = estimate_variance(&weights, &[outcome.view()], 4).unwrap();
        assert!((var[[0, 0]] - 0.25).abs() < 1e-12);
        assert!((var[[0, 1]] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_identical_cut_points_leave_middle_class_certain() {
        let w = ForestWeights::new(array![[0.25, 0.25, 0.25, 0.25]]);
        let outcome = array![1.0, 0.0, 1.0, 0.0];
        let var = estimate_variance(
            &[w.clone(), w],
            &[outcome.view(), outcome.view()],
            4,
        )
        .unwrap();
        assert!(var[[0, 1]].abs() < 1e-12);
        assert!(var[[0, 0]] > 0.0);
        assert!((var[[0, 0]] - var[[0, 2]]).abs() < 1e-12);
    }

    #[test]
    fn test_variance_is_non_negative() {
        let mut rng = StdRng::seed_from_u64(7);
        let n_honest = 30;
        let weights: Vec<ForestWeights> =
            (0..3).map(|_| random_weights(&mut rng, 20, n_honest)).collect();
        let outcomes: Vec<Array1<f64>> = (0..3)
            .map(|_| Array1::from_shape_fn(n_honest, |_| rng.gen_range(0..2) as f64))
            .collect();
        let views: Vec<_> = outcomes.iter().map(|y| y.view()).collect();
        let var = estimate_variance(&weights, &views, n_honest).unwrap();
        assert_eq!(var.dim(), (20, 4));
        assert!(var.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_single_observation_is_degenerate() {
        let weights = vec![ForestWeights::new(array![[1.0]])];
        let outcome = array![1.0];
        let res = estimate_variance(&weights, &[outcome.view()], 1);
        assert!(matches!(res, Err(OrfError::DegenerateNormalization(_))));
    }

    #[test]
    fn test_outcome_length_is_checked() {
        let weights = vec![ForestWeights::new(array![[0.5, 0.5]])];
        let outcome = array![1.0, 0.0, 1.0];
        let res = estimate_variance(&weights, &[outcome.view()], 3);
        assert!(matches!(res, Err(OrfError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_split_keeps_original_order() {
        let mut rng = StdRng::seed_from_u64(11);
        let n_honest = 6;
        let weights = vec![random_weights(&mut rng, 9, n_honest)];
        let outcome = Array1::from_shape_fn(n_honest, |_| rng.gen_range(0..2) as f64);
        let train = vec![4, 0, 7, 2];
        let honest = vec![1, 8, 3, 6, 5];

        let var = estimate_variance_split(&weights, &[outcome.view()], &train, &honest).unwrap();

        let honest_var =
            estimate_variance(&[weights[0].select_rows(&honest)], &[outcome.view()], 5).unwrap();
        let train_var =
            estimate_variance(&[weights[0].select_rows(&train)], &[outcome.view()], 4).unwrap();
        for (r, &i) in honest.iter().enumerate() {
            assert_eq!(var.row(i), honest_var.row(r));
        }
        for (r, &i) in train.iter().enumerate() {
            assert_eq!(var.row(i), train_var.row(r));
        }
    }
}

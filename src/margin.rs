use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info};

use crate::error::{check_len, OrfError, Result};
use crate::probabilities::assemble_class_probabilities;
use crate::variance::{class_variance, demeaned_contributions, sample_scale};
use crate::weights::ForestWeights;

pub mod perturbation;

pub use perturbation::{covariate_kind, perturbation, CovariateKind, Perturbation};

/// Where marginal effects are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalPoint {
    /// Perturb every evaluation row around its own value and average.
    #[default]
    Mean,
    /// Perturb around the covariate mean.
    AtMean,
    /// Perturb around the covariate median.
    AtMedian,
}

/// A fitted model that yields cumulative cut-point probabilities.
pub trait CumulativePredictor {
    fn n_cuts(&self) -> usize;

    /// Cumulative probabilities of `x` (n_rows x n_cuts), with the forest
    /// weights of every cut-point when the model predicts through weights.
    fn predict_cumulative(
        &self,
        x: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Option<Vec<ForestWeights>>)>;

    /// Binary honest outcome of every cut-point.
    fn honest_outcomes(&self) -> Vec<ArrayView1<'_, f64>>;
}

/// Effect of one covariate on every class probability.
#[derive(Debug, Clone, PartialEq)]
pub struct CovariateEffect {
    pub effects: Array1<f64>,
    /// Present when the predictor supplies forest weights.
    pub variances: Option<Array1<f64>>,
}

/// Marginal effects of all covariates, one row per covariate and one column
/// per class.
#[derive(Debug, Clone, PartialEq)]
pub struct MarginalEffects {
    pub eval_point: EvalPoint,
    pub window: f64,
    pub effects: Array2<f64>,
    pub variances: Option<Array2<f64>>,
    pub std_errors: Option<Array2<f64>>,
    pub t_values: Option<Array2<f64>>,
    pub p_values: Option<Array2<f64>>,
}

fn check_window(window: f64) -> Result<()> {
    if window > 0.0 && window <= 1.0 {
        Ok(())
    } else {
        Err(OrfError::InvalidParameter(format!(
            "window must be within (0,1], got {window}"
        )))
    }
}

fn check_samples(x_eval: ArrayView2<f64>, x_ref: ArrayView2<f64>) -> Result<()> {
    check_len("reference covariate columns", x_eval.ncols(), x_ref.ncols())?;
    if x_eval.nrows() == 0 || x_ref.nrows() < 2 {
        return Err(OrfError::InvalidInput(
            "marginal effects need evaluation rows and at least two reference rows".into(),
        ));
    }
    Ok(())
}

/// Row-mean cumulative probabilities of `x` and the row-mean weight vector
/// of every cut-point.
fn averaged_run<P: CumulativePredictor + ?Sized>(
    predictor: &P,
    x: ArrayView2<f64>,
) -> Result<(Array1<f64>, Option<Vec<Array1<f64>>>)> {
    let (cumulative, weights) = predictor.predict_cumulative(x)?;
    let mean = cumulative
        .mean_axis(Axis(0))
        .ok_or_else(|| OrfError::InvalidInput("empty evaluation sample".into()))?;
    let mean_weights = weights.map(|weights| weights.iter().map(|w| w.row_mean()).collect());
    Ok((mean, mean_weights))
}

fn class_probabilities(mean_cumulative: Array1<f64>) -> Result<Array1<f64>> {
    let probs = assemble_class_probabilities(mean_cumulative.insert_axis(Axis(0)).view())?;
    Ok(probs.row(0).to_owned())
}

/// Variance of a scaled difference of two weight-based predictions.
///
/// `weight_diffs[k]` is the up-minus-down row-mean weight vector of
/// cut-point k over the honest sample.
pub fn variance_of_difference(
    weight_diffs: &[Array1<f64>],
    outcomes: &[ArrayView1<f64>],
    scale: f64,
) -> Result<Array1<f64>> {
    check_len("outcomes per cut-point", weight_diffs.len(), outcomes.len())?;
    let honest_size = outcomes.first().map_or(0, |y| y.len());
    let demeaned = weight_diffs
        .iter()
        .zip(outcomes)
        .map(|(diff, y)| {
            check_len("honest outcome", diff.len(), y.len())?;
            Ok(demeaned_contributions(diff.view(), y.view(), honest_size))
        })
        .collect::<Result<Vec<_>>>()?;
    let variance = class_variance(&demeaned, sample_scale(honest_size)?);
    Ok(variance / (scale * scale))
}

/// Runs the up and down evaluations of an already computed perturbation.
fn effect_of<P: CumulativePredictor + ?Sized>(
    predictor: &P,
    perturbation: &Perturbation,
    x_eval: ArrayView2<f64>,
) -> Result<CovariateEffect> {
    let (up, up_weights) = averaged_run(predictor, perturbation.apply_up(x_eval).view())?;
    let (down, down_weights) = averaged_run(predictor, perturbation.apply_down(x_eval).view())?;

    let effects =
        (class_probabilities(up)? - class_probabilities(down)?) / perturbation.scale;

    let variances = match (up_weights, down_weights) {
        (Some(up_weights), Some(down_weights)) => {
            let diffs: Vec<Array1<f64>> = up_weights
                .iter()
                .zip(&down_weights)
                .map(|(u, d)| u - d)
                .collect();
            Some(variance_of_difference(
                &diffs,
                &predictor.honest_outcomes(),
                perturbation.scale,
            )?)
        }
        _ => None,
    };
    debug!(
        covariate = perturbation.covariate,
        kind = ?perturbation.kind,
        scale = perturbation.scale,
        "marginal effect evaluated"
    );
    Ok(CovariateEffect { effects, variances })
}

/// Marginal effect of a single covariate.
///
/// `x_eval` holds the evaluation rows and `x_ref` the honest rows that fix
/// the covariate's spread and range.
pub fn marginal_effect<P: CumulativePredictor + ?Sized>(
    predictor: &P,
    covariate: usize,
    x_eval: ArrayView2<f64>,
    x_ref: ArrayView2<f64>,
    eval_point: EvalPoint,
    window: f64,
) -> Result<CovariateEffect> {
    check_window(window)?;
    check_samples(x_eval, x_ref)?;
    if covariate >= x_eval.ncols() {
        return Err(OrfError::InvalidInput(format!(
            "covariate {covariate} out of range for {} columns",
            x_eval.ncols()
        )));
    }
    let perturbation = perturbation(covariate, x_eval, x_ref, eval_point, window)?;
    effect_of(predictor, &perturbation, x_eval)
}

/// Marginal effects of every covariate, with standard errors, t-values and
/// two-sided p-values when variances are available.
///
/// All covariates are checked before any prediction runs.
pub fn marginal_effects<P: CumulativePredictor + ?Sized>(
    predictor: &P,
    x_eval: ArrayView2<f64>,
    x_ref: ArrayView2<f64>,
    eval_point: EvalPoint,
    window: f64,
) -> Result<MarginalEffects> {
    check_window(window)?;
    check_samples(x_eval, x_ref)?;
    let perturbations = (0..x_eval.ncols())
        .map(|covariate| perturbation(covariate, x_eval, x_ref, eval_point, window))
        .collect::<Result<Vec<_>>>()?;

    let n_classes = predictor.n_cuts() + 1;
    let mut effects = Array2::zeros((perturbations.len(), n_classes));
    let mut variances = Array2::zeros((perturbations.len(), n_classes));
    let mut has_variance = true;
    for (row, perturbation) in perturbations.iter().enumerate() {
        let effect = effect_of(predictor, perturbation, x_eval)?;
        effects.row_mut(row).assign(&effect.effects);
        match effect.variances {
            Some(variance) => variances.row_mut(row).assign(&variance),
            None => has_variance = false,
        }
    }
    info!(
        n_covariates = perturbations.len(),
        ?eval_point,
        window,
        inference = has_variance,
        "marginal effects computed"
    );

    let mut result = MarginalEffects {
        eval_point,
        window,
        effects,
        variances: None,
        std_errors: None,
        t_values: None,
        p_values: None,
    };
    if has_variance {
        let std_errors = variances.mapv(f64::sqrt);
        let t_values = ndarray::Zip::from(&result.effects)
            .and(&std_errors)
            .map_collect(|&effect, &se| if se != 0.0 { effect / se } else { 0.0 });
        let normal = Normal::standard();
        let p_values = t_values.mapv(|t| 2.0 * normal.sf(t.abs()));
        result.variances = Some(variances);
        result.std_errors = Some(std_errors);
        result.t_values = Some(t_values);
        result.p_values = Some(p_values);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    /// Cumulative probability P(Y <= 1) rises linearly in the first column.
    struct LinearPredictor {
        outcome: Array1<f64>,
        with_weights: bool,
    }

    impl CumulativePredictor for LinearPredictor {
        fn n_cuts(&self) -> usize {
            1
        }

        fn predict_cumulative(
            &self,
            x: ArrayView2<f64>,
        ) -> Result<(Array2<f64>, Option<Vec<ForestWeights>>)> {
            let cumulative = x
                .column(0)
                .mapv(|v| (0.5 + 0.1 * v).clamp(0.0, 1.0))
                .insert_axis(Axis(1));
            let n_honest = self.outcome.len();
            let weights = self.with_weights.then(|| {
                vec![ForestWeights::new(Array2::from_shape_fn(
                    (x.nrows(), n_honest),
                    |(i, j)| if x[[i, 0]] > 0.0 && j < 2 { 0.5 } else { 1.0 / n_honest as f64 },
                ))]
            });
            Ok((cumulative, weights))
        }

        fn honest_outcomes(&self) -> Vec<ArrayView1<'_, f64>> {
            vec![self.outcome.view()]
        }
    }

    fn sample() -> Array2<f64> {
        Array2::from_shape_fn((20, 2), |(i, j)| {
            if j == 0 {
                i as f64 - 10.0
            } else {
                (i % 2) as f64
            }
        })
    }

    #[test]
    fn test_linear_effect_is_slope() {
        let predictor = LinearPredictor {
            outcome: array![1.0, 0.0, 1.0, 0.0],
            with_weights: false,
        };
        let x = sample();
        let effect =
            marginal_effect(&predictor, 0, x.view(), x.view(), EvalPoint::AtMean, 0.1).unwrap();
        // P(Y = 1) rises by 0.1 per unit, P(Y = 2) falls by the same amount
        assert!((effect.effects[0] - 0.1).abs() < 1e-9);
        assert!((effect.effects[1] + 0.1).abs() < 1e-9);
        assert!(effect.variances.is_none());
    }

    #[test]
    fn test_effects_sum_to_zero() {
        let predictor = LinearPredictor {
            outcome: array![1.0, 0.0, 1.0, 0.0],
            with_weights: false,
        };
        let x = sample();
        let margins =
            marginal_effects(&predictor, x.view(), x.view(), EvalPoint::Mean, 0.1).unwrap();
        assert_eq!(margins.effects.dim(), (2, 2));
        for row in margins.effects.outer_iter() {
            assert!(row.sum().abs() < 1e-9);
        }
        // the dummy column does not move the predictor
        assert!(margins.effects.row(1).iter().all(|v| v.abs() < 1e-12));
        assert!(margins.p_values.is_none());
    }

    #[test]
    fn test_inference_outputs() {
        let predictor = LinearPredictor {
            outcome: array![1.0, 0.0, 1.0, 0.0],
            with_weights: true,
        };
        let x = sample();
        let margins =
            marginal_effects(&predictor, x.view(), x.view(), EvalPoint::AtMean, 0.2).unwrap();
        let variances = margins.variances.unwrap();
        let std_errors = margins.std_errors.unwrap();
        let p_values = margins.p_values.unwrap();
        assert!(variances.iter().all(|&v| v >= 0.0));
        for (v, se) in variances.iter().zip(&std_errors) {
            assert!((v.sqrt() - se).abs() < 1e-12);
        }
        assert!(p_values.iter().all(|&p| (0.0..=1.0).contains(&p)));
        // the dummy column leaves the weights unchanged
        assert!(variances.row(1).iter().all(|&v| v == 0.0));
        assert!(margins.t_values.unwrap().row(1).iter().all(|&t| t == 0.0));
    }

    #[test]
    fn test_constant_covariate_fails_first() {
        let predictor = LinearPredictor {
            outcome: array![1.0, 0.0],
            with_weights: false,
        };
        let mut x = sample();
        x.column_mut(1).fill(3.0);
        let res = marginal_effects(&predictor, x.view(), x.view(), EvalPoint::Mean, 0.1);
        assert!(matches!(res, Err(OrfError::ConstantCovariate { covariate: 1 })));
    }

    #[test]
    fn test_window_bounds() {
        let predictor = LinearPredictor {
            outcome: array![1.0, 0.0],
            with_weights: false,
        };
        let x = sample();
        for window in [0.0, 1.5] {
            let res = marginal_effects(&predictor, x.view(), x.view(), EvalPoint::Mean, window);
            assert!(matches!(res, Err(OrfError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_variance_of_difference_by_hand() {
        let diffs = vec![array![0.5, -0.5, 0.0, 0.0]];
        let outcome = array![1.0, 1.0, 0.0, 1.0];
        let var = variance_of_difference(&diffs, &[outcome.view()], 2.0).unwrap();
        // contributions 0.5, -0.5, 0, 0 around a zero mean, scaled by 4/3 and 1/2^2
        assert!((var[0] - 4.0 / 3.0 * 0.5 / 4.0).abs() < 1e-12);
        assert!((var[0] - var[1]).abs() < 1e-12);
    }
}

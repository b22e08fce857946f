pub mod fitter;
pub mod honesty;
pub mod params;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, info};

use crate::error::{check_len, OrfError, Result};
use crate::leaf_index::LeafIndex;
use crate::leaf_means::LeafMeans;
use crate::margin::{self, CumulativePredictor, EvalPoint, MarginalEffects};
use crate::probabilities::{assemble_class_probabilities, class_predictions};
use crate::variance::estimate_variance;
use crate::weights::{aggregate_forest_weights, ExecutionContext, ForestWeights};
use crate::LeafAssigner;

pub use honesty::{split_sample, SamplePartition};
pub use params::{OrderedForestParams, OrderedForestParamsBuilder};

/// How cumulative probabilities are read off the per-class ensembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// Forest weights times the honest outcome; supports inference.
    Weights,
    /// Mean honest outcome of the leaf, averaged over trees.
    HonestLeafMeans,
    /// Mean training outcome of the leaf, averaged over trees.
    InSampleLeafMeans,
}

impl PredictionMode {
    pub fn from_params(params: &OrderedForestParams) -> Self {
        match (params.honesty, params.inference) {
            (true, true) => PredictionMode::Weights,
            (true, false) => PredictionMode::HonestLeafMeans,
            (false, _) => PredictionMode::InSampleLeafMeans,
        }
    }
}

/// Everything kept for one cut-point after fitting.
#[derive(Debug, Clone)]
pub struct PerClassState<M> {
    /// Cut-point id; this state models `class <= cut + 1`.
    pub cut: usize,
    pub model: M,
    /// Leaves of the honest sample (the training sample without honesty).
    pub honest_leaves: LeafIndex,
    /// Binary outcome over the same rows as `honest_leaves`.
    pub outcome: Array1<f64>,
    /// Present unless predictions go through forest weights.
    pub leaf_means: Option<LeafMeans>,
}

/// Class probabilities and, with inference, their variances.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub probabilities: Array2<f64>,
    pub variances: Option<Array2<f64>>,
}

/// Ordered forest: one binary ensemble per cut-point of an ordered outcome.
#[derive(Debug)]
pub struct OrderedForest<M> {
    params: OrderedForestParams,
    mode: PredictionMode,
    class_values: Vec<f64>,
    x_fit: Array2<f64>,
    partition: Option<SamplePartition>,
    states: Vec<PerClassState<M>>,
    fitted: Prediction,
    ctx: ExecutionContext,
}

impl<M: LeafAssigner> OrderedForest<M> {
    pub fn params(&self) -> &OrderedForestParams {
        &self.params
    }

    pub fn mode(&self) -> PredictionMode {
        self.mode
    }

    pub fn n_classes(&self) -> usize {
        self.class_values.len()
    }

    pub fn n_features(&self) -> usize {
        self.x_fit.ncols()
    }

    /// Original outcome value of every class, class 1 first.
    pub fn class_values(&self) -> &[f64] {
        &self.class_values
    }

    /// Training/honest split of the fit rows; `None` without honesty.
    pub fn partition(&self) -> Option<&SamplePartition> {
        self.partition.as_ref()
    }

    pub fn states(&self) -> &[PerClassState<M>] {
        &self.states
    }

    /// In-sample predictions for every fit row, in the original order.
    pub fn fitted(&self) -> &Prediction {
        &self.fitted
    }

    /// Fit rows that play the honest role.
    fn reference_rows(&self) -> Vec<usize> {
        match &self.partition {
            Some(partition) => partition.honest.clone(),
            None => (0..self.x_fit.nrows()).collect(),
        }
    }

    /// Cumulative probabilities of `x`, one column per cut-point, plus the
    /// forest weights when predicting through weights.
    pub(crate) fn cumulative(
        &self,
        x: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Option<Vec<ForestWeights>>)> {
        check_len("covariate columns", self.n_features(), x.ncols())?;
        let mut cumulative = Array2::zeros((x.nrows(), self.states.len()));
        let mut weights = Vec::new();

        for state in &self.states {
            let leaves = state.model.apply(x)?;
            let column = match &state.leaf_means {
                Some(leaf_means) => leaf_means.predict(&leaves)?,
                None => {
                    let forest_weights = aggregate_forest_weights(
                        &leaves,
                        &state.honest_leaves,
                        state.model.n_trees(),
                        self.params.aggregation,
                        &self.ctx,
                    )?;
                    let column = forest_weights.predict(state.outcome.view())?;
                    weights.push(forest_weights);
                    column
                }
            };
            debug!(cut = state.cut, n_rows = x.nrows(), "cut-point predicted");
            cumulative.column_mut(state.cut).assign(&column);
        }

        let weights = (self.mode == PredictionMode::Weights).then_some(weights);
        Ok((cumulative, weights))
    }

    /// Class probabilities of new data, or of the fit data for `None`.
    ///
    /// Variances are returned with inference only; for new data they use the
    /// honest sample size. Passing the fit data itself returns the fit-time
    /// result.
    pub fn predict(&self, x: Option<ArrayView2<f64>>) -> Result<Prediction> {
        let Some(x) = x else {
            return Ok(self.fitted.clone());
        };
        if x.ncols() != self.n_features() {
            return Err(OrfError::InvalidInput(format!(
                "expected {} covariates, got {}",
                self.n_features(),
                x.ncols()
            )));
        }

        if x == self.x_fit {
            debug!("prediction data equals the fit data");
            return Ok(self.fitted.clone());
        }

        let (cumulative, weights) = self.cumulative(x)?;
        let probabilities = assemble_class_probabilities(cumulative.view())?;
        let variances = match weights {
            Some(weights) if self.params.inference => Some(estimate_variance(
                &weights,
                &self.honest_outcomes(),
                self.honest_size(),
            )?),
            _ => None,
        };
        info!(n_rows = x.nrows(), inference = variances.is_some(), "predicted");
        Ok(Prediction {
            probabilities,
            variances,
        })
    }

    /// Most probable class (1-based) of every row.
    pub fn predict_classes(&self, x: Option<ArrayView2<f64>>) -> Result<Array1<usize>> {
        let prediction = self.predict(x)?;
        Ok(class_predictions(prediction.probabilities.view()))
    }

    /// Marginal effects of every covariate.
    ///
    /// Without `x` the effects are evaluated on the honest rows of the fit
    /// data (all fit rows without honesty). Standard errors and p-values are
    /// only available with inference.
    pub fn margin(
        &self,
        x: Option<ArrayView2<f64>>,
        eval_point: EvalPoint,
        window: f64,
    ) -> Result<MarginalEffects> {
        let reference = self.x_fit.select(Axis(0), &self.reference_rows());
        let x_eval = match x {
            Some(x) => {
                check_len("covariate columns", self.n_features(), x.ncols())?;
                x.to_owned()
            }
            None => reference.clone(),
        };
        margin::marginal_effects(self, x_eval.view(), reference.view(), eval_point, window)
    }

    fn honest_size(&self) -> usize {
        self.states.first().map_or(0, |state| state.outcome.len())
    }
}

impl<M: LeafAssigner> CumulativePredictor for OrderedForest<M> {
    fn n_cuts(&self) -> usize {
        self.states.len()
    }

    fn predict_cumulative(
        &self,
        x: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Option<Vec<ForestWeights>>)> {
        self.cumulative(x)
    }

    fn honest_outcomes(&self) -> Vec<ArrayView1<'_, f64>> {
        self.states.iter().map(|state| state.outcome.view()).collect()
    }
}

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info};

use crate::data::recode_labels;
use crate::error::{check_len, OrfError, Result};
use crate::grid::GridForest;
use crate::leaf_means::LeafMeans;
use crate::probabilities::assemble_class_probabilities;
use crate::variance::estimate_variance_split;
use crate::weights::ExecutionContext;
use crate::{EnsembleFitter, LeafAssigner};

use super::honesty::split_sample;
use super::{OrderedForest, OrderedForestParams, PerClassState, Prediction, PredictionMode};

impl OrderedForest<GridForest> {
    /// Fits an ordered forest with the built-in grid tree provider and a
    /// worker pool of `params.n_threads` threads.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        params: &OrderedForestParams,
    ) -> Result<Self> {
        let ctx = ExecutionContext::with_threads(params.n_threads)?;
        Self::fit_with(x, y, params, &params.grid_fitter(), ctx)
    }
}

impl<M: LeafAssigner> OrderedForest<M> {
    /// Fits one ensemble per cut-point with `fitter`.
    ///
    /// `ctx` is kept by the forest and reused for every later weight
    /// aggregation.
    pub fn fit_with<F>(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        params: &OrderedForestParams,
        fitter: &F,
        ctx: ExecutionContext,
    ) -> Result<Self>
    where
        F: EnsembleFitter<Model = M>,
    {
        check_len("outcome length", x.nrows(), y.len())?;
        if x.ncols() == 0 {
            return Err(OrfError::InvalidInput("no covariates supplied".into()));
        }
        let labels = recode_labels(y)?;
        let n_samples = x.nrows();
        let mode = PredictionMode::from_params(params);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let partition = if params.honesty {
            Some(split_sample(n_samples, params.honesty_fraction, params.seed)?)
        } else {
            None
        };
        let all_rows: Vec<usize> = (0..n_samples).collect();
        let (train_rows, honest_rows) = match &partition {
            Some(partition) => (&partition.train[..], &partition.honest[..]),
            None => (&all_rows[..], &all_rows[..]),
        };
        let x_train = x.select(Axis(0), train_rows);
        let x_honest = x.select(Axis(0), honest_rows);
        info!(
            n_samples,
            n_classes = labels.n_classes(),
            n_train = train_rows.len(),
            n_honest = honest_rows.len(),
            ?mode,
            "fitting ordered forest"
        );

        let mut states = Vec::with_capacity(labels.n_classes() - 1);
        for cut in 0..labels.n_classes() - 1 {
            let indicator = labels.cumulative_indicator(cut + 1);
            let y_train = indicator.select(Axis(0), train_rows);
            let model = fitter.fit(x_train.view(), y_train.view(), &mut rng, &ctx)?;

            let honest_leaves = model.apply(x_honest.view())?;
            let outcome = indicator.select(Axis(0), honest_rows);
            let leaf_means = match mode {
                PredictionMode::Weights => None,
                PredictionMode::HonestLeafMeans => Some(LeafMeans::fit(
                    &honest_leaves,
                    outcome.view(),
                    model.max_leaf_id(),
                )?),
                // every tree is valued with the rows it was grown on
                PredictionMode::InSampleLeafMeans => {
                    Some(LeafMeans::fit_in_bag(&honest_leaves, outcome.view(), &model)?)
                }
            };
            debug!(cut, n_trees = model.n_trees(), "cut-point ensemble fitted");
            states.push(PerClassState {
                cut,
                model,
                honest_leaves,
                outcome,
                leaf_means,
            });
        }

        let mut forest = OrderedForest {
            params: params.clone(),
            mode,
            class_values: labels.values,
            x_fit: x.to_owned(),
            partition,
            states,
            fitted: Prediction {
                probabilities: Array2::zeros((0, 0)),
                variances: None,
            },
            ctx,
        };
        forest.fitted = forest.fit_predictions()?;
        Ok(forest)
    }

    /// Predictions of all fit rows. Without honesty they are out-of-bag.
    /// With inference, training and honest rows get variances with their own
    /// sample sizes.
    fn fit_predictions(&self) -> Result<Prediction> {
        let (cumulative, weights) = match self.mode {
            PredictionMode::InSampleLeafMeans => (self.out_of_bag_cumulative()?, None),
            _ => self.cumulative(self.x_fit.view())?,
        };
        let probabilities = assemble_class_probabilities(cumulative.view())?;
        let variances = match (weights, &self.partition) {
            (Some(weights), Some(partition)) if self.params.inference => {
                let outcomes: Vec<_> = self.states.iter().map(|s| s.outcome.view()).collect();
                Some(estimate_variance_split(
                    &weights,
                    &outcomes,
                    &partition.train,
                    &partition.honest,
                )?)
            }
            _ => None,
        };
        Ok(Prediction {
            probabilities,
            variances,
        })
    }

    /// Out-of-bag cumulative probabilities of the fit rows; without honesty
    /// the leaf index of every state covers all fit rows in order.
    fn out_of_bag_cumulative(&self) -> Result<Array2<f64>> {
        let mut cumulative = Array2::zeros((self.x_fit.nrows(), self.states.len()));
        for state in &self.states {
            let Some(leaf_means) = &state.leaf_means else {
                continue;
            };
            let column = leaf_means.predict_out_of_bag(&state.honest_leaves, &state.model)?;
            cumulative.column_mut(state.cut).assign(&column);
        }
        Ok(cumulative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::OrderedForestParamsBuilder;
    use crate::test_data::ordered_data;
    use rand::Rng;

    fn small_params() -> OrderedForestParamsBuilder {
        OrderedForestParamsBuilder::new()
            .n_trees(20)
            .n_iter(6)
            .split_try(5)
            .max_features(1.0)
            .n_threads(1)
    }

    #[test]
    fn test_fit_in_sample_leaf_means() {
        let (x, y) = ordered_data(150, 2, 42);
        let params = small_params().build().unwrap();
        let forest = OrderedForest::fit(x.view(), y.view(), &params).unwrap();

        assert_eq!(forest.mode(), PredictionMode::InSampleLeafMeans);
        assert_eq!(forest.n_classes(), 3);
        assert_eq!(forest.states().len(), 2);
        assert!(forest.partition().is_none());
        let fitted = forest.fitted();
        assert_eq!(fitted.probabilities.dim(), (150, 3));
        assert!(fitted.variances.is_none());
    }

    #[test]
    fn test_fit_with_inference_has_variances() {
        let (x, y) = ordered_data(120, 2, 3);
        let params = small_params()
            .honesty(true)
            .replace(false)
            .inference(true)
            .build()
            .unwrap();
        let forest = OrderedForest::fit(x.view(), y.view(), &params).unwrap();

        assert_eq!(forest.mode(), PredictionMode::Weights);
        let partition = forest.partition().unwrap();
        assert_eq!(partition.honest.len(), 60);
        for state in forest.states() {
            assert!(state.leaf_means.is_none());
            assert_eq!(state.honest_leaves.n_observations(), 60);
        }
        let variances = forest.fitted().variances.as_ref().unwrap();
        assert_eq!(variances.dim(), (120, 3));
        assert!(variances.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_fit_predictions_are_out_of_bag_on_noise() {
        let (x, _) = ordered_data(400, 2, 11);
        let mut rng = StdRng::seed_from_u64(5);
        let y: ndarray::Array1<f64> = (0..400).map(|_| rng.gen_range(1..=3) as f64).collect();
        let params = OrderedForestParamsBuilder::new()
            .n_trees(100)
            .min_samples_leaf(1)
            .max_features(1.0)
            .n_threads(2)
            .build()
            .unwrap();
        let forest = OrderedForest::fit(x.view(), y.view(), &params).unwrap();

        let accuracy = |classes: ndarray::Array1<usize>| {
            classes
                .iter()
                .zip(y.iter())
                .filter(|(&c, &label)| c as f64 == label)
                .count() as f64
                / y.len() as f64
        };
        // labels carry no signal, so honest fit-time accuracy stays near 1/3
        let fitted = accuracy(forest.predict_classes(None).unwrap());
        assert!(fitted < 0.5, "fit-time accuracy {fitted}");
        // re-predicting the fit rows returns the same out-of-bag result
        let again = forest.predict(Some(x.view())).unwrap();
        assert_eq!(&again, forest.fitted());
    }

    #[test]
    fn test_outcome_length_mismatch() {
        let (x, y) = ordered_data(30, 2, 1);
        let params = small_params().build().unwrap();
        let y_short = y.slice(ndarray::s![..20]);
        assert!(matches!(
            OrderedForest::fit(x.view(), y_short, &params),
            Err(OrfError::ShapeMismatch { .. })
        ));
    }
}

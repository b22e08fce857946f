use crate::error::{OrfError, Result};
use crate::grid::{GridForestFitter, GridTreeParamsBuilder};
use crate::weights::AggregationStrategy;

/// Configuration of an ordered forest, validated once by
/// [`OrderedForestParamsBuilder::build`].
#[derive(Debug, Clone)]
pub struct OrderedForestParams {
    pub n_trees: usize,
    pub min_samples_leaf: usize,
    /// Share of covariates offered to every split search, in (0, 1].
    pub max_features: f64,
    /// Grow trees on bootstrap draws instead of subsamples.
    pub replace: bool,
    /// Share of the training rows each tree sees, in (0, 1].
    pub sample_fraction: f64,
    pub honesty: bool,
    /// Share of the rows held out as the honest sample, in (0, 1).
    pub honesty_fraction: f64,
    pub inference: bool,
    /// 0 uses every core, 1 runs sequentially.
    pub n_threads: usize,
    pub aggregation: AggregationStrategy,
    pub seed: u64,
    pub n_iter: usize,
    pub split_try: usize,
}

impl OrderedForestParams {
    /// Grid tree provider configured from these parameters.
    pub fn grid_fitter(&self) -> GridForestFitter {
        GridForestFitter {
            n_trees: self.n_trees,
            sample_fraction: self.sample_fraction,
            replace: self.replace,
            tree_params: GridTreeParamsBuilder::new()
                .n_iter(self.n_iter)
                .split_try(self.split_try)
                .max_features(self.max_features)
                .min_samples_leaf(self.min_samples_leaf)
                .build(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_trees < 1 {
            return Err(invalid(format!("n_trees must be at least 1, got {}", self.n_trees)));
        }
        if self.min_samples_leaf < 1 {
            return Err(invalid(format!(
                "min_samples_leaf must be at least 1, got {}",
                self.min_samples_leaf
            )));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(invalid(format!(
                "max_features must be within (0,1], got {}",
                self.max_features
            )));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(invalid(format!(
                "sample_fraction must be within (0,1], got {}",
                self.sample_fraction
            )));
        }
        if !(self.honesty_fraction > 0.0 && self.honesty_fraction < 1.0) {
            return Err(invalid(format!(
                "honesty_fraction must be within (0,1), got {}",
                self.honesty_fraction
            )));
        }
        if self.split_try < 1 {
            return Err(invalid(format!("split_try must be at least 1, got {}", self.split_try)));
        }
        if self.inference && !self.honesty {
            return Err(invalid("inference requires honesty".into()));
        }
        if self.honesty && self.replace {
            return Err(invalid("honesty requires subsampling, set replace to false".into()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> OrfError {
    OrfError::InvalidParameter(message)
}

// Builder for OrderedForestParams
#[derive(Debug, Clone)]
pub struct OrderedForestParamsBuilder {
    params: OrderedForestParams,
}

impl OrderedForestParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: OrderedForestParams {
                n_trees: 1000,
                min_samples_leaf: 5,
                max_features: 0.3,
                replace: true,
                sample_fraction: 0.5,
                honesty: false,
                honesty_fraction: 0.5,
                inference: false,
                n_threads: 0,
                aggregation: AggregationStrategy::default(),
                seed: 42,
                n_iter: 25,
                split_try: 10,
            },
        }
    }

    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.params.n_trees = n_trees;
        self
    }

    pub fn min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.params.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn max_features(mut self, max_features: f64) -> Self {
        self.params.max_features = max_features;
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.params.replace = replace;
        self
    }

    pub fn sample_fraction(mut self, sample_fraction: f64) -> Self {
        self.params.sample_fraction = sample_fraction;
        self
    }

    pub fn honesty(mut self, honesty: bool) -> Self {
        self.params.honesty = honesty;
        self
    }

    pub fn honesty_fraction(mut self, honesty_fraction: f64) -> Self {
        self.params.honesty_fraction = honesty_fraction;
        self
    }

    pub fn inference(mut self, inference: bool) -> Self {
        self.params.inference = inference;
        self
    }

    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.params.n_threads = n_threads;
        self
    }

    pub fn aggregation(mut self, aggregation: AggregationStrategy) -> Self {
        self.params.aggregation = aggregation;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.params.n_iter = n_iter;
        self
    }

    pub fn split_try(mut self, split_try: usize) -> Self {
        self.params.split_try = split_try;
        self
    }

    pub fn build(self) -> Result<OrderedForestParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl Default for OrderedForestParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct GridTreeParams {
    pub n_iter: usize,
    pub split_try: usize,
    pub max_features: f64,
    pub min_samples_leaf: usize,
}

// Builder for GridTreeParams
#[derive(Debug, Clone)]
pub struct GridTreeParamsBuilder {
    n_iter: usize,
    split_try: usize,
    max_features: f64,
    min_samples_leaf: usize,
}

impl GridTreeParamsBuilder {
    pub fn new() -> Self {
        Self {
            n_iter: 25,
            split_try: 10,
            max_features: 0.3,
            min_samples_leaf: 5,
        }
    }

    pub fn n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn split_try(mut self, split_try: usize) -> Self {
        self.split_try = split_try;
        self
    }

    pub fn max_features(mut self, max_features: f64) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    pub fn build(self) -> GridTreeParams {
        GridTreeParams {
            n_iter: self.n_iter,
            split_try: self.split_try,
            max_features: self.max_features,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

impl Default for GridTreeParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for GridTreeParams {
    fn default() -> Self {
        GridTreeParamsBuilder::new().build()
    }
}

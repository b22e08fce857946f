use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{check_len, OrfError, Result};
use crate::leaf_index::LeafIndex;
use crate::weights::ExecutionContext;
use crate::{EnsembleFitter, LeafAssigner};

use super::{fitter, FittedTreeGrid, GridTreeParams};

/// A bag of tree grids grown on row subsamples.
#[derive(Debug, Clone)]
pub struct GridForest {
    trees: Vec<FittedTreeGrid>,
    /// Drawn rows of every tree; empty when unknown.
    in_bag: Vec<Vec<usize>>,
}

impl GridForest {
    pub fn new(trees: Vec<FittedTreeGrid>) -> Self {
        Self {
            trees,
            in_bag: Vec::new(),
        }
    }

    /// Trees together with the rows each one was grown on.
    pub fn with_in_bag(trees: Vec<FittedTreeGrid>, in_bag: Vec<Vec<usize>>) -> Self {
        debug_assert_eq!(trees.len(), in_bag.len());
        Self { trees, in_bag }
    }

    pub fn trees(&self) -> &[FittedTreeGrid] {
        &self.trees
    }
}

impl LeafAssigner for GridForest {
    fn apply(&self, x: ArrayView2<f64>) -> Result<LeafIndex> {
        if let Some(tree) = self.trees.first() {
            check_len("covariate columns", tree.n_features(), x.ncols())?;
        }
        let ids = Array2::from_shape_fn((x.nrows(), self.trees.len()), |(i, t)| {
            self.trees[t].leaf_id(x.row(i))
        });
        Ok(LeafIndex::new(ids))
    }

    fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn max_leaf_id(&self) -> usize {
        self.trees
            .iter()
            .map(|tree| tree.n_leaves() - 1)
            .max()
            .unwrap_or(0)
    }

    fn in_bag(&self, tree: usize) -> Option<&[usize]> {
        self.in_bag.get(tree).map(Vec::as_slice)
    }
}

/// Grows [`GridForest`]s, one tree per pre-drawn seed.
#[derive(Debug, Clone)]
pub struct GridForestFitter {
    pub n_trees: usize,
    /// Share of rows drawn for every tree.
    pub sample_fraction: f64,
    /// Draw rows with replacement.
    pub replace: bool,
    pub tree_params: GridTreeParams,
}

impl Default for GridForestFitter {
    fn default() -> Self {
        Self {
            n_trees: 1000,
            sample_fraction: 0.5,
            replace: true,
            tree_params: GridTreeParams::default(),
        }
    }
}

impl GridForestFitter {
    fn subsample_size(&self, n: usize) -> usize {
        ((self.sample_fraction * n as f64).round() as usize).clamp(1, n)
    }

    /// Grows one tree on a row subsample and returns it with the drawn rows.
    fn fit_tree(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        seed: u64,
    ) -> (FittedTreeGrid, Vec<usize>) {
        let mut tree_rng = StdRng::seed_from_u64(seed);
        let n = x.nrows();
        let size = self.subsample_size(n);
        let rows: Vec<usize> = if self.replace {
            (0..size).map(|_| tree_rng.gen_range(0..n)).collect()
        } else {
            sample(&mut tree_rng, n, size).into_vec()
        };
        let x_sample = x.select(Axis(0), &rows);
        let y_sample = y.select(Axis(0), &rows);
        let tree = fitter::fit(
            x_sample.view(),
            y_sample.view(),
            &self.tree_params,
            &mut tree_rng,
        );
        (tree, rows)
    }
}

impl EnsembleFitter for GridForestFitter {
    type Model = GridForest;

    fn fit<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        rng: &mut R,
        ctx: &ExecutionContext,
    ) -> Result<GridForest> {
        check_len("outcome length", x.nrows(), y.len())?;
        if x.nrows() == 0 {
            return Err(OrfError::InvalidInput(
                "cannot grow trees on an empty sample".into(),
            ));
        }

        // Pre-generate seeds so the parallel path grows the same trees
        let seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.gen()).collect();
        debug!(
            n_trees = self.n_trees,
            n_rows = x.nrows(),
            parallel = ctx.is_parallel(),
            "growing grid forest"
        );

        let grown: Vec<(FittedTreeGrid, Vec<usize>)> = if ctx.is_parallel() {
            ctx.install(|| {
                seeds
                    .into_par_iter()
                    .map(|seed| self.fit_tree(x, y, seed))
                    .collect()
            })
        } else {
            seeds
                .into_iter()
                .map(|seed| self.fit_tree(x, y, seed))
                .collect()
        };

        let (trees, in_bag): (Vec<_>, Vec<_>) = grown.into_iter().unzip();
        Ok(GridForest::with_in_bag(trees, in_bag))
    }
}

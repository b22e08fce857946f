use ndarray::ArrayView1;

pub mod ensemble;
mod fitter;
mod grid_index;
pub mod params;
mod splitting;

use fitter::TreeGridFitter;
use grid_index::{compute_strides, flat_index};

pub use ensemble::{GridForest, GridForestFitter};
pub use params::{GridTreeParams, GridTreeParamsBuilder};

/// A single fitted tree grid. Only the partition is kept: the leaf of a
/// point is the flat index of the grid cell containing it.
#[derive(Debug, Clone)]
pub struct FittedTreeGrid {
    pub boundaries: Vec<Vec<f64>>,
    strides: Vec<usize>,
}

impl FittedTreeGrid {
    pub fn new(boundaries: Vec<Vec<f64>>) -> Self {
        let dims: Vec<usize> = boundaries.iter().map(|b| b.len() + 1).collect();
        Self {
            strides: compute_strides(&dims),
            boundaries,
        }
    }

    pub fn n_features(&self) -> usize {
        self.boundaries.len()
    }

    /// Number of cells, populated or not. Leaf ids lie in `0..n_leaves()`.
    pub fn n_leaves(&self) -> usize {
        self.boundaries.iter().map(|b| b.len() + 1).product()
    }

    #[inline]
    pub fn leaf_id(&self, point: ArrayView1<f64>) -> usize {
        debug_assert_eq!(
            point.len(),
            self.n_features(),
            "Input dimension must match tree grid dimension"
        );
        flat_index(&self.boundaries, &self.strides, point)
    }
}

impl<'a> From<TreeGridFitter<'a>> for FittedTreeGrid {
    fn from(fitter: TreeGridFitter<'a>) -> Self {
        Self {
            boundaries: fitter.grid_index.boundaries,
            strides: fitter.grid_index.strides,
        }
    }
}

use ndarray::{ArrayView1, ArrayView2};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// GridIndex represents a p-dimensional grid over a set of n points.
/// Each axis is partitioned by sorted boundaries. Initially no boundaries
/// exist, so each axis spans (-inf, inf) and the grid has one cell holding
/// all points. A cell's flat index doubles as its leaf id.
#[derive(Debug, Clone)]
pub struct GridIndex {
    /// For each axis, the sorted list of split values.
    pub boundaries: Vec<Vec<f64>>,
    /// Sparse grid cells; only cells holding points are stored. Ordered so
    /// that sweeps over cells are reproducible.
    pub cells: BTreeMap<usize, Vec<usize>>,
    /// Strides for flattening multi-dimensional cell indices.
    pub strides: Vec<usize>,
}

impl GridIndex {
    /// Creates a new GridIndex from an n x p matrix of points.
    pub fn new(points: ArrayView2<'_, f64>) -> Self {
        let n = points.nrows();
        let p = points.ncols();
        let boundaries = vec![Vec::new(); p];
        let strides = compute_strides(&vec![1; p]);
        let mut cells = BTreeMap::new();
        cells.insert(0, (0..n).collect());
        GridIndex {
            boundaries,
            cells,
            strides,
        }
    }

    /// Number of intervals along each axis.
    pub fn current_dims(&self) -> Vec<usize> {
        self.boundaries.iter().map(|b| b.len() + 1).collect()
    }

    /// Total number of cells, populated or not.
    pub fn n_cells(&self) -> usize {
        self.current_dims().iter().product()
    }

    /// Interval position of `value` along `axis`: the number of boundaries
    /// that are <= value.
    pub fn compute_col_index_for_point(&self, axis: usize, value: f64) -> usize {
        col_index(&self.boundaries[axis], value)
    }

    /// Interval position of the flat cell `cell` along `axis`.
    pub fn axis_position(&self, cell: usize, axis: usize) -> usize {
        (cell / self.strides[axis]) % (self.boundaries[axis].len() + 1)
    }

    pub fn has_boundary(&self, axis: usize, split: f64) -> bool {
        self.boundaries[axis].iter().any(|&b| b == split)
    }

    /// Inserts `split` as a new boundary along `axis` and reassigns all
    /// points. Existing boundaries are left untouched.
    pub fn split_axis(&mut self, axis: usize, split: f64, points: ArrayView2<'_, f64>) {
        if self.has_boundary(axis, split) {
            return;
        }
        let pos = self.compute_col_index_for_point(axis, split);
        self.boundaries[axis].insert(pos, split);
        self.strides = compute_strides(&self.current_dims());
        self.reassign_cells(points);
    }

    fn reassign_cells(&mut self, points: ArrayView2<'_, f64>) {
        let mut new_cells: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, point) in points.outer_iter().enumerate() {
            let cell = flat_index(&self.boundaries, &self.strides, point);
            new_cells.entry(cell).or_default().push(i);
        }
        self.cells = new_cells;
    }
}

/// For dims = [d0, ..., d(p-1)] the stride of axis i is the product of
/// d(i+1)..d(p-1).
pub(crate) fn compute_strides(dims: &[usize]) -> Vec<usize> {
    let p = dims.len();
    let mut strides = vec![1; p];
    for i in (0..p.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

pub(crate) fn col_index(boundaries: &[f64], value: f64) -> usize {
    boundaries
        .binary_search_by(|b| {
            if *b <= value {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })
        .unwrap_or_else(|i| i)
}

/// Flat cell index of a single point.
pub(crate) fn flat_index(boundaries: &[Vec<f64>], strides: &[usize], point: ArrayView1<f64>) -> usize {
    point
        .iter()
        .zip(boundaries.iter().zip(strides))
        .map(|(&value, (b, &stride))| col_index(b, value) * stride)
        .sum()
}

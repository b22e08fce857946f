use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{check_len, OrfError, Result};

/// Per-tree leaf assignments of a sample: one row per observation, one
/// column per tree. Leaf ids are only comparable within a column.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafIndex {
    ids: Array2<usize>,
}

impl LeafIndex {
    pub fn new(ids: Array2<usize>) -> Self {
        Self { ids }
    }

    /// Builds an index from row-major leaf ids of `n_observations` rows.
    pub fn from_shape_vec(n_observations: usize, n_trees: usize, ids: Vec<usize>) -> Result<Self> {
        let found = ids.len();
        let ids = Array2::from_shape_vec((n_observations, n_trees), ids).map_err(|_| {
            OrfError::ShapeMismatch {
                context: "leaf index buffer",
                expected: n_observations * n_trees,
                found,
            }
        })?;
        Ok(Self { ids })
    }

    /// Builds an index from one leaf-id column per tree.
    pub fn from_columns(n_observations: usize, columns: &[Vec<usize>]) -> Result<Self> {
        let mut ids = Array2::zeros((n_observations, columns.len()));
        for (tree, column) in columns.iter().enumerate() {
            check_len("leaf index column", n_observations, column.len())?;
            ids.column_mut(tree)
                .iter_mut()
                .zip(column)
                .for_each(|(slot, &id)| *slot = id);
        }
        Ok(Self { ids })
    }

    pub fn n_observations(&self) -> usize {
        self.ids.nrows()
    }

    pub fn n_trees(&self) -> usize {
        self.ids.ncols()
    }

    /// Leaf ids of every observation in a single tree.
    pub fn tree(&self, tree: usize) -> ArrayView1<'_, usize> {
        self.ids.column(tree)
    }

    pub fn view(&self) -> ArrayView2<'_, usize> {
        self.ids.view()
    }

    pub fn max_leaf_id(&self) -> Option<usize> {
        self.ids.iter().copied().max()
    }

    /// Restricts the index to the given observations, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            ids: self.ids.select(Axis(0), rows),
        }
    }
}

impl From<Array2<usize>> for LeafIndex {
    fn from(ids: Array2<usize>) -> Self {
        Self::new(ids)
    }
}

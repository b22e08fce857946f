use ndarray::{Array1, Array2, ArrayView1};
use tracing::warn;

use crate::error::{check_len, OrfError, Result};
use crate::leaf_index::LeafIndex;
use crate::LeafAssigner;

/// Mean outcome of every leaf of every tree, shape (max_leaf_id + 1, n_trees).
///
/// Leaves that received no observations hold 0.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafMeans {
    means: Array2<f64>,
    counts: Array2<f64>,
}

impl LeafMeans {
    /// Leaf means of `outcome` over all observations in `leaves`.
    pub fn fit(leaves: &LeafIndex, outcome: ArrayView1<f64>, max_leaf_id: usize) -> Result<Self> {
        Self::fit_rows(leaves, outcome, max_leaf_id, |_| None)
    }

    /// Leaf means where every tree only sees the rows it was grown on.
    ///
    /// `leaves` and `outcome` cover the whole fitting sample of `model`.
    /// Rows drawn several times count several times.
    pub fn fit_in_bag<M: LeafAssigner + ?Sized>(
        leaves: &LeafIndex,
        outcome: ArrayView1<f64>,
        model: &M,
    ) -> Result<Self> {
        check_len("leaf index trees", model.n_trees(), leaves.n_trees())?;
        Self::fit_rows(leaves, outcome, model.max_leaf_id(), |tree| model.in_bag(tree))
    }

    fn fit_rows<'r>(
        leaves: &LeafIndex,
        outcome: ArrayView1<f64>,
        max_leaf_id: usize,
        rows_of: impl Fn(usize) -> Option<&'r [usize]>,
    ) -> Result<Self> {
        let n_obs = leaves.n_observations();
        check_len("leaf mean outcome", n_obs, outcome.len())?;
        let n_slots = max_leaf_id.max(leaves.max_leaf_id().unwrap_or(0)) + 1;
        let mut sums = Array2::<f64>::zeros((n_slots, leaves.n_trees()));
        let mut counts = Array2::<f64>::zeros((n_slots, leaves.n_trees()));

        for tree in 0..leaves.n_trees() {
            let column = leaves.tree(tree);
            let mut add = |i: usize| {
                sums[[column[i], tree]] += outcome[i];
                counts[[column[i], tree]] += 1.0;
            };
            match rows_of(tree) {
                Some(rows) => {
                    if let Some(&bad) = rows.iter().find(|&&i| i >= n_obs) {
                        return Err(OrfError::InvalidInput(format!(
                            "tree {tree} was grown on row {bad} of a {n_obs}-row sample"
                        )));
                    }
                    rows.iter().for_each(|&i| add(i));
                }
                None => (0..n_obs).for_each(add),
            }
        }
        sums.zip_mut_with(&counts, |sum, &count| {
            if count > 0.0 {
                *sum /= count;
            }
        });
        Ok(Self {
            means: sums,
            counts,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.means.ncols()
    }

    /// Average over trees of the mean of the leaf each row falls into.
    /// Leaves never seen while fitting count as 0.
    pub fn predict(&self, leaves: &LeafIndex) -> Result<Array1<f64>> {
        check_len("leaf index trees", self.n_trees(), leaves.n_trees())?;
        Ok(leaves
            .view()
            .outer_iter()
            .map(|row| self.tree_average(row))
            .collect())
    }

    /// Out-of-bag predictions for the fitting sample of `model`.
    ///
    /// Row i averages the trees that did not draw it and whose leaf for it
    /// holds drawn rows. Rows without any such tree fall back to the
    /// average over all trees.
    pub fn predict_out_of_bag<M: LeafAssigner + ?Sized>(
        &self,
        leaves: &LeafIndex,
        model: &M,
    ) -> Result<Array1<f64>> {
        check_len("leaf index trees", self.n_trees(), leaves.n_trees())?;
        let n_obs = leaves.n_observations();
        let mut in_bag = Array2::from_elem((n_obs, self.n_trees()), false);
        for tree in 0..self.n_trees() {
            match model.in_bag(tree) {
                Some(rows) => {
                    for &i in rows.iter().filter(|&&i| i < n_obs) {
                        in_bag[[i, tree]] = true;
                    }
                }
                None => in_bag.column_mut(tree).fill(true),
            }
        }

        let mut n_fallback = 0;
        let predictions: Array1<f64> = leaves
            .view()
            .outer_iter()
            .zip(in_bag.outer_iter())
            .map(|(row, drawn)| {
                let (sum, n) = row
                    .iter()
                    .zip(drawn)
                    .enumerate()
                    .filter(|&(tree, (&leaf, &was_drawn))| !was_drawn && self.is_populated(leaf, tree))
                    .fold((0.0, 0usize), |(sum, n), (tree, (&leaf, _))| {
                        (sum + self.means[[leaf, tree]], n + 1)
                    });
                if n > 0 {
                    sum / n as f64
                } else {
                    n_fallback += 1;
                    self.tree_average(row)
                }
            })
            .collect();
        if n_fallback > 0 {
            warn!(n_fallback, n_obs, "rows without out-of-bag trees averaged over every tree");
        }
        Ok(predictions)
    }

    fn is_populated(&self, leaf: usize, tree: usize) -> bool {
        self.counts.get((leaf, tree)).is_some_and(|&count| count > 0.0)
    }

    fn tree_average(&self, row: ArrayView1<usize>) -> f64 {
        let n_trees = self.n_trees().max(1) as f64;
        row.iter()
            .enumerate()
            .map(|(tree, &leaf)| self.means.get((leaf, tree)).copied().unwrap_or(0.0))
            .sum::<f64>()
            / n_trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Fixed leaves with known drawn rows.
    struct Bagged {
        in_bag: Vec<Vec<usize>>,
    }

    impl LeafAssigner for Bagged {
        fn apply(&self, _x: ndarray::ArrayView2<f64>) -> Result<LeafIndex> {
            unreachable!()
        }

        fn n_trees(&self) -> usize {
            self.in_bag.len()
        }

        fn max_leaf_id(&self) -> usize {
            1
        }

        fn in_bag(&self, tree: usize) -> Option<&[usize]> {
            self.in_bag.get(tree).map(Vec::as_slice)
        }
    }

    #[test]
    fn test_leaf_means_per_tree() {
        let leaves = LeafIndex::new(array![[0, 1], [0, 0], [1, 0], [1, 1]]);
        let outcome = array![1.0, 0.0, 1.0, 1.0];
        let means = LeafMeans::fit(&leaves, outcome.view(), 2).unwrap();

        let eval = LeafIndex::new(array![[0, 1], [1, 0], [2, 2]]);
        let pred = means.predict(&eval).unwrap();
        // tree 0: leaf 0 -> 0.5, leaf 1 -> 1.0; tree 1: leaf 0 -> 0.5, leaf 1 -> 1.0
        assert!((pred[0] - 0.75).abs() < 1e-12);
        assert!((pred[1] - 0.75).abs() < 1e-12);
        // leaf 2 is empty in both trees
        assert_eq!(pred[2], 0.0);
    }

    #[test]
    fn test_unknown_leaf_counts_as_zero() {
        let leaves = LeafIndex::new(array![[0], [0]]);
        let means = LeafMeans::fit(&leaves, array![1.0, 1.0].view(), 0).unwrap();
        let pred = means.predict(&LeafIndex::new(array![[0], [9]])).unwrap();
        assert_eq!(pred, array![1.0, 0.0]);
    }

    #[test]
    fn test_tree_count_must_match() {
        let leaves = LeafIndex::new(array![[0, 0]]);
        let means = LeafMeans::fit(&leaves, array![1.0].view(), 0).unwrap();
        assert!(means.predict(&LeafIndex::new(array![[0]])).is_err());
    }

    #[test]
    fn test_in_bag_means_use_drawn_rows_only() {
        let leaves = LeafIndex::new(array![[0, 0], [0, 0], [1, 1], [1, 1]]);
        let outcome = array![1.0, 0.0, 1.0, 0.0];
        let model = Bagged {
            in_bag: vec![vec![0, 0, 1], vec![2, 3, 3]],
        };
        let means = LeafMeans::fit_in_bag(&leaves, outcome.view(), &model).unwrap();
        // tree 0: leaf 0 -> 2/3, leaf 1 empty; tree 1: leaf 0 empty, leaf 1 -> 1/3
        let pred = means.predict(&LeafIndex::new(array![[0, 0], [1, 1]])).unwrap();
        assert!((pred[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((pred[1] - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_bag_skips_trees_that_drew_the_row() {
        let leaves = LeafIndex::new(array![[0, 0], [0, 0], [1, 1], [1, 1]]);
        let outcome = array![1.0, 0.0, 1.0, 0.0];
        let model = Bagged {
            in_bag: vec![vec![0, 2], vec![1, 3]],
        };
        let means = LeafMeans::fit_in_bag(&leaves, outcome.view(), &model).unwrap();
        let oob = means.predict_out_of_bag(&leaves, &model).unwrap();
        // every row is predicted by the tree that never saw its label
        assert_eq!(oob, array![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_out_of_bag_falls_back_without_free_trees() {
        let leaves = LeafIndex::new(array![[0], [1]]);
        let outcome = array![1.0, 0.0];
        let model = Bagged {
            in_bag: vec![vec![0]],
        };
        let means = LeafMeans::fit_in_bag(&leaves, outcome.view(), &model).unwrap();
        let oob = means.predict_out_of_bag(&leaves, &model).unwrap();
        // row 0 was drawn by the only tree, row 1 sits in an empty leaf
        assert_eq!(oob, array![1.0, 0.0]);
    }

    #[test]
    fn test_in_bag_rows_must_exist() {
        let leaves = LeafIndex::new(array![[0], [1]]);
        let model = Bagged {
            in_bag: vec![vec![5]],
        };
        assert!(matches!(
            LeafMeans::fit_in_bag(&leaves, array![1.0, 0.0].view(), &model),
            Err(OrfError::InvalidInput(_))
        ));
    }
}

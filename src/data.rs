use std::path::Path;

use csv::ReaderBuilder;
use itertools::Itertools;
use ndarray::{Array1, Array2, ArrayView1};

use crate::error::{OrfError, Result};

/// Ordered outcome recoded to classes `1..=n_classes`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedLabels {
    /// Sorted distinct original values; class k is `values[k - 1]`.
    pub values: Vec<f64>,
    pub classes: Array1<usize>,
}

impl OrderedLabels {
    pub fn n_classes(&self) -> usize {
        self.values.len()
    }

    /// 0/1 indicator of `class <= cut` for every observation.
    pub fn cumulative_indicator(&self, cut: usize) -> Array1<f64> {
        self.classes.mapv(|c| if c <= cut { 1.0 } else { 0.0 })
    }
}

/// Maps labels to their rank among the sorted distinct values.
pub fn recode_labels(y: ArrayView1<f64>) -> Result<OrderedLabels> {
    if y.iter().any(|v| !v.is_finite()) {
        return Err(OrfError::InvalidInput("outcome contains non-finite values".into()));
    }
    let values = y.iter().copied().sorted_by(f64::total_cmp).dedup().collect_vec();
    if values.len() < 2 {
        return Err(OrfError::InvalidInput(format!(
            "an ordered outcome needs at least two classes, got {}",
            values.len()
        )));
    }
    let classes = y.mapv(|v| values.partition_point(|&u| u < v) + 1);
    Ok(OrderedLabels { values, classes })
}

/// Reads a CSV file with a header row; the first column is the outcome and
/// every further column a covariate.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<(Array2<f64>, Array1<f64>)> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut x_data = Vec::new();
    let mut y_data = Vec::new();
    let mut n_features = None;
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let values = record
            .iter()
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| {
                    OrfError::InvalidInput(format!("row {}: cannot parse '{field}'", line + 1))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let Some((&y, x_row)) = values.split_first() else {
            continue;
        };
        if *n_features.get_or_insert(x_row.len()) != x_row.len() {
            return Err(OrfError::InvalidInput(format!(
                "row {} has {} covariates, expected {}",
                line + 1,
                x_row.len(),
                n_features.unwrap_or_default()
            )));
        }
        y_data.push(y);
        x_data.extend_from_slice(x_row);
    }

    let n_features = n_features.unwrap_or(0);
    if y_data.is_empty() || n_features == 0 {
        return Err(OrfError::InvalidInput(
            "data needs at least one row and one covariate".into(),
        ));
    }
    let x = Array2::from_shape_vec((y_data.len(), n_features), x_data).map_err(|_| {
        OrfError::InvalidInput("covariate rows have inconsistent lengths".into())
    })?;
    Ok((x, Array1::from(y_data)))
}

use thiserror::Error;

/// Errors raised while fitting, weighting or predicting with an ordered forest.
#[derive(Debug, Error)]
pub enum OrfError {
    /// Leaf-id, weight or covariate matrices of incompatible dimensions.
    #[error("shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// A probability row summed to zero after clipping, or a variance
    /// denominator (n - 1) vanished.
    #[error("degenerate normalization: {0}")]
    DegenerateNormalization(String),

    /// A worker task failed; the aggregation was abandoned as a whole.
    #[error("concurrent aggregation failed: {0}")]
    ConcurrencyFailure(String),

    #[error("covariate {covariate} is constant, marginal effects are undefined")]
    ConstantCovariate { covariate: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, OrfError>;

pub(crate) fn check_len(context: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(OrfError::ShapeMismatch {
            context,
            expected,
            found,
        })
    }
}

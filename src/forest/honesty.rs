use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::error::{OrfError, Result};

/// Disjoint training and honest row indices of a fit sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePartition {
    pub train: Vec<usize>,
    pub honest: Vec<usize>,
}

/// Seeded random split of `0..n`; the honest part holds
/// `ceil(n * honesty_fraction)` rows.
pub fn split_sample(n: usize, honesty_fraction: f64, seed: u64) -> Result<SamplePartition> {
    let n_honest = (n as f64 * honesty_fraction).ceil() as usize;
    if n_honest == 0 || n_honest >= n {
        return Err(OrfError::InvalidInput(format!(
            "cannot split {n} observations into non-empty training and honest samples"
        )));
    }
    let mut rows: Vec<usize> = (0..n).collect();
    rows.shuffle(&mut StdRng::seed_from_u64(seed));
    let honest = rows.split_off(n - n_honest);
    Ok(SamplePartition {
        train: rows,
        honest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let split = split_sample(11, 0.5, 42).unwrap();
        assert_eq!(split.honest.len(), 6);
        assert_eq!(split.train.len(), 5);
        let mut all: Vec<usize> = split.train.iter().chain(&split.honest).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        assert_eq!(split_sample(50, 0.3, 7).unwrap(), split_sample(50, 0.3, 7).unwrap());
        assert_ne!(split_sample(50, 0.3, 7).unwrap(), split_sample(50, 0.3, 8).unwrap());
    }

    #[test]
    fn test_tiny_sample_cannot_split() {
        assert!(split_sample(1, 0.5, 0).is_err());
    }
}

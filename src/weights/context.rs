use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;

/// Caller-owned worker pool for tree-level parallelism.
///
/// A sequential context holds no pool at all; every strategy then runs on the
/// calling thread.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    pool: Option<ThreadPool>,
}

impl ExecutionContext {
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// `0` uses every available core, `1` stays sequential.
    pub fn with_threads(n_threads: usize) -> Result<Self> {
        if n_threads == 1 {
            return Ok(Self::sequential());
        }
        let pool = ThreadPoolBuilder::new().num_threads(n_threads).build()?;
        Ok(Self { pool: Some(pool) })
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    pub fn n_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads())
    }

    /// Runs `op` inside the pool so nested rayon iterators use its workers.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

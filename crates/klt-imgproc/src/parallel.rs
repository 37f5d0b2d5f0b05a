use rayon::prelude::*;

/// How row and feature loops are scheduled.
///
/// Both strategies produce bit-identical results: every output element is
/// computed independently and results are collected in input order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExecutionStrategy {
    /// Run everything on the calling thread.
    #[default]
    Serial,
    /// Spread the work over the global rayon thread pool.
    Parallel,
}

impl ExecutionStrategy {
    /// Apply `f` to every row of a row-major buffer with `cols` elements per row.
    ///
    /// # Arguments
    ///
    /// * `dst` - The buffer to fill.
    /// * `cols` - The number of elements per row.
    /// * `f` - Called with the row index and the mutable row slice.
    pub fn for_each_row<T, F>(&self, dst: &mut [T], cols: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if cols == 0 {
            return;
        }

        match self {
            ExecutionStrategy::Serial => dst
                .chunks_exact_mut(cols)
                .enumerate()
                .for_each(|(y, row)| f(y, row)),
            ExecutionStrategy::Parallel => dst
                .par_chunks_exact_mut(cols)
                .enumerate()
                .for_each(|(y, row)| f(y, row)),
        }
    }

    /// Map every item of a slice, keeping the input order in the output.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        match self {
            ExecutionStrategy::Serial => items.iter().map(f).collect(),
            ExecutionStrategy::Parallel => items.par_iter().map(f).collect(),
        }
    }

    /// Mutate every item of a slice in place.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Send + Sync,
    {
        match self {
            ExecutionStrategy::Serial => items.iter_mut().for_each(f),
            ExecutionStrategy::Parallel => items.par_iter_mut().for_each(f),
        }
    }
}

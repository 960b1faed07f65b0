//! Fork-join runner for one half of an ALS iteration.
//!
//! The output buffer is split into fixed-width chunks and each chunk is handed
//! to exactly one unit of work. Units never see each other's chunks, so the
//! only synchronization needed is the join at the end of [`PassRunner::run`].

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{AlsError, Result};

pub struct PassRunner {
    workers: usize,
    pool: Option<ThreadPool>,
}

impl PassRunner {
    /// `workers == 0` uses rayon's global pool, `1` runs on the calling thread,
    /// anything else builds a dedicated pool of that size.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = if workers > 1 {
            let pool = ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("als-worker-{}", i))
                .build()
                .map_err(|e| AlsError::invalid("workers", e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self { workers, pool })
    }

    pub fn sequential() -> Self {
        Self {
            workers: 1,
            pool: None,
        }
    }

    pub fn workers(&self) -> usize {
        match (&self.pool, self.workers) {
            (Some(pool), _) => pool.current_num_threads(),
            (None, 1) => 1,
            (None, _) => rayon::current_num_threads(),
        }
    }

    /// Run `work(index, chunk)` for every `width`-sized chunk of `out`.
    /// Returns once all chunks are done, or with the first error observed.
    pub fn run<T, F>(&self, out: &mut [T], width: usize, work: F) -> Result<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<()> + Send + Sync,
    {
        self.run_with(out, width, || (), |_, index, chunk| work(index, chunk))
    }

    /// Like [`run`](Self::run), with per-worker scratch state created by `init`.
    pub fn run_with<T, S, I, F>(&self, out: &mut [T], width: usize, init: I, work: F) -> Result<()>
    where
        T: Send,
        I: Fn() -> S + Send + Sync,
        F: Fn(&mut S, usize, &mut [T]) -> Result<()> + Send + Sync,
    {
        if width == 0 || out.is_empty() {
            return Ok(());
        }
        if out.len() % width != 0 {
            return Err(AlsError::Shape(format!(
                "buffer of length {} does not split into chunks of {}",
                out.len(),
                width
            )));
        }

        if self.pool.is_none() && self.workers == 1 {
            let mut scratch = init();
            return out
                .chunks_mut(width)
                .enumerate()
                .try_for_each(|(index, chunk)| work(&mut scratch, index, chunk));
        }

        match &self.pool {
            Some(pool) => pool.install(|| fan_out(out, width, &init, &work)),
            None => fan_out(out, width, &init, &work),
        }
    }
}

fn fan_out<T, S, I, F>(out: &mut [T], width: usize, init: &I, work: &F) -> Result<()>
where
    T: Send,
    I: Fn() -> S + Send + Sync,
    F: Fn(&mut S, usize, &mut [T]) -> Result<()> + Send + Sync,
{
    out.par_chunks_mut(width)
        .enumerate()
        .try_for_each_init(init, |scratch, (index, chunk)| work(scratch, index, chunk))
}

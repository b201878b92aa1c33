use crate::error::{FoamError, Result};
use once_cell::sync::OnceCell;
use rayon::ThreadPoolBuilder;
use std::sync::Arc;

static DEFAULT_POOL: OnceCell<Arc<rayon::ThreadPool>> = OnceCell::new();

/// Number of worker threads used when nothing is configured
#[must_use]
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
        .min(8)
}

/// Build a dedicated pool with `num_threads` workers
///
/// # Errors
///
/// Returns an error if the operating system refuses to spawn the workers
pub fn build_pool(num_threads: usize) -> Result<Arc<rayon::ThreadPool>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .thread_name(|i| format!("foam-worker-{i}"))
        .build()
        .map_err(|e| FoamError::access("thread pool", std::io::Error::other(e)))?;
    Ok(Arc::new(pool))
}

/// Get the shared pool, creating it with [`default_threads`] workers on first use
///
/// # Errors
///
/// Returns an error if the pool cannot be created
pub fn shared_pool() -> Result<Arc<rayon::ThreadPool>> {
    DEFAULT_POOL
        .get_or_try_init(|| build_pool(default_threads()))
        .cloned()
}

/// Pool sized for `num_threads`: the shared one when that matches the
/// default size, otherwise a dedicated pool
///
/// # Errors
///
/// Returns an error if a pool cannot be created
pub fn pool_for(num_threads: usize) -> Result<Arc<rayon::ThreadPool>> {
    if num_threads == 0 || num_threads == default_threads() {
        shared_pool()
    } else {
        build_pool(num_threads)
    }
}

use thiserror::Error;

/// Failures that can occur while constructing a [`crate::PoolHandle`].
///
/// Submission and future resolution do not appear here: once a pool is
/// built, `submit` cannot fail (task allocation is an ordinary `Box`, and if
/// that allocator gives up so does everything else), and misuse of the
/// handles — submitting after shutdown, freeing before resolving — is a
/// contract violation the pool panics on rather than reports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// `PoolBuilder::new` was given a worker count of zero.
    #[error("a pool needs at least one worker thread")]
    ZeroWorkers,

    /// The OS refused to spawn one of the worker threads.
    #[error("failed to spawn worker thread {index}: {source}")]
    SpawnFailed {
        /// Index (0-based) of the worker that failed to spawn.
        index: usize,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}

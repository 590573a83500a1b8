//! Work-stealing fork/join task scheduler with a futures-based completion
//! model.
//!
//! A [`PoolHandle`] owns a fixed number of worker threads. Any thread —
//! worker or outside caller — can [`Pool::submit`] a computation and later
//! [`Task::join`] it to block for (or, if it hasn't started yet, help run)
//! its result. Internal submissions (from inside a running task) go to the
//! submitting worker's own deque for LIFO locality; external submissions go
//! to a global FIFO queue any idle worker can drain. Idle workers steal from
//! the back of the first non-empty sibling deque, in a fixed registry order.
//!
//! ```
//! use fj_core::pool_new;
//!
//! let pool = pool_new(2).unwrap();
//! let task = pool.submit((20usize, 22usize), |_pool, (a, b)| a + b);
//! assert_eq!(task.join(&pool), 42);
//! ```

mod error;
mod pool;
mod task;

pub use error::PoolError;
pub use pool::{pool_new, Pool, PoolBuilder, PoolHandle};
pub use task::Task;

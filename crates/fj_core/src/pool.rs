use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use fj_list::List;

use crate::error::PoolError;
use crate::task::{self, Location, Outcome, Task, TaskInner};

thread_local! {
    /// `(pool id, index into that pool's worker registry)` for the pool this
    /// thread is a worker of, if any. Keyed by pool identity rather than a
    /// bare boolean so a task running on pool A that happens to touch pool B
    /// from the same thread never mistakes itself for one of B's workers.
    static CURRENT_WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

fn next_pool_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// A rendezvous point every worker thread passes through before it enters
/// its run loop, so the constructor never returns before every `WorkerSlot`
/// is registered (and so no worker looks itself up in the registry before
/// it's there, see `steal_and_dispatch_loop`).
///
/// Unlike `std::sync::Barrier`, this can be torn down early: if spawning a
/// later worker thread fails, [`StartGate::abort`] releases every worker
/// already parked here instead of leaving them waiting for a party count
/// that can now never be reached, which would otherwise hang the cleanup
/// path's `JoinHandle::join` forever.
struct StartGate {
    state: Mutex<StartGateState>,
    cv: Condvar,
}

struct StartGateState {
    arrived: usize,
    target: usize,
    aborted: bool,
}

impl StartGate {
    fn new(target: usize) -> Self {
        Self {
            state: Mutex::new(StartGateState { arrived: 0, target, aborted: false }),
            cv: Condvar::new(),
        }
    }

    /// Called by a worker thread on startup. Returns `true` once every
    /// worker has arrived, `false` if construction was aborted — in which
    /// case the caller has no registry slot and must exit without entering
    /// its loop.
    fn worker_arrive_and_wait(&self) -> bool {
        let mut state = self.state.lock().expect("start gate mutex poisoned");
        state.arrived += 1;
        if state.arrived >= state.target {
            self.cv.notify_all();
        }
        while state.arrived < state.target && !state.aborted {
            state = self.cv.wait(state).expect("start gate mutex poisoned");
        }
        !state.aborted
    }

    /// Called by the constructing thread after every worker thread has been
    /// spawned. Blocks until every worker has reached the gate.
    fn wait_for_workers(&self) {
        let mut state = self.state.lock().expect("start gate mutex poisoned");
        while state.arrived < state.target && !state.aborted {
            state = self.cv.wait(state).expect("start gate mutex poisoned");
        }
    }

    /// Release every worker currently parked at the gate without waiting
    /// for the rest to arrive. Used when construction fails partway through
    /// so the threads that did spawn can be joined instead of hanging.
    fn abort(&self) {
        let mut state = self.state.lock().expect("start gate mutex poisoned");
        state.aborted = true;
        self.cv.notify_all();
    }
}

struct WorkerSlot {
    thread_id: ThreadId,
    deque: List<TaskInner>,
}

struct PoolState {
    global_queue: List<TaskInner>,
    workers: Vec<WorkerSlot>,
    shutdown: bool,
}

impl PoolState {
    /// The idle gate: a worker may sleep only when there is nothing left to
    /// do anywhere and the pool is not shutting down. Checking just the
    /// caller's own deque would let a worker sleep while a sibling's deque
    /// still has stealable work.
    fn idle(&self) -> bool {
        !self.shutdown && self.global_queue.is_empty() && self.workers.iter().all(|w| w.deque.is_empty())
    }
}

/// The shared scheduler core: the part every worker thread and every task
/// body holds a reference to, and the type `submit`/`join` are called on —
/// both from outside the pool and recursively from inside a running task.
///
/// Construct one (really, a [`PoolHandle`] wrapping one) with [`PoolBuilder`]
/// or [`crate::pool_new`].
pub struct Pool {
    id: u64,
    state: Mutex<PoolState>,
    idle_cv: Condvar,
    start_gate: StartGate,
}

impl Pool {
    /// Submit a fork/join task.
    ///
    /// If the calling thread is one of this pool's own workers, the task is
    /// pushed to the front of that worker's deque (continuation-stealing
    /// locality: the same worker picks it back up first). Otherwise it goes
    /// to the back of the global queue, where any idle worker can claim it.
    pub fn submit<T, R, F>(&self, input: T, f: F) -> Task<R>
    where
        F: FnOnce(&Pool, T) -> R + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
    {
        let job: task::Job = Box::new(move |pool: &Pool| -> Box<dyn Any + Send> {
            Box::new(f(pool, input))
        });
        let inner = TaskInner::new_for_pool(job);
        let for_queue = Arc::clone(&inner);

        let mut state = self.state.lock().expect("pool mutex poisoned");
        assert!(!state.shutdown, "submit called on a pool that is shutting down");

        match self.current_worker_index() {
            Some(idx) => {
                unsafe { for_queue.payload_mut().location = Location::Worker(idx) };
                state.workers[idx].deque.push_front(for_queue);
            }
            None => {
                unsafe { for_queue.payload_mut().location = Location::Global };
                state.global_queue.push_back(for_queue);
            }
        }
        // Single signal, under the lock: exactly one task became available.
        self.idle_cv.notify_one();
        drop(state);

        Task::new(inner)
    }

    fn current_worker_index(&self) -> Option<usize> {
        CURRENT_WORKER.with(|c| match c.get() {
            Some((pool_id, idx)) if pool_id == self.id => Some(idx),
            _ => None,
        })
    }

    /// The `future_get` operation: resolve `inner`, helping (running it
    /// inline) if it hasn't been dispatched yet, otherwise waiting on its
    /// completion signal.
    pub(crate) fn resolve(&self, inner: &Arc<TaskInner>) -> Box<dyn Any + Send> {
        let mut state = self.state.lock().expect("pool mutex poisoned");

        let outcome = if inner.status() == task::not_started() {
            let ptr = NonNull::from(&**inner);
            let location = unsafe { inner.payload_mut().location };
            let removed = match location {
                Location::Global => unsafe { state.global_queue.remove(ptr) },
                Location::Worker(idx) => unsafe { state.workers[idx].deque.remove(ptr) },
            };
            debug_assert!(removed.is_some(), "task claimed NotStarted but was not in its recorded queue");
            // `removed` and `inner` are the same Arc; drop the extra strong
            // ref the queue was holding, we already have ours.
            drop(removed);

            inner.set_status(task::in_progress());
            let body = unsafe { inner.payload_mut().body.take() }
                .expect("task body missing for a NotStarted task");
            drop(state);

            let ran = run_body_owned(body, self);

            let state2 = self.state.lock().expect("pool mutex poisoned");
            unsafe { inner.payload_mut().result = Some(ran) };
            inner.set_status(task::completed());
            inner.completion().notify_all();
            // Take the result while `state2` is still held: `payload_mut`'s
            // contract requires the pool mutex, and dropping the guard first
            // would leave this read unguarded even though no other thread
            // can observe it yet.
            let taken = unsafe { inner.payload_mut().result.take() }.expect("completed task has no result");
            drop(state2);
            taken
        } else {
            while inner.status() != task::completed() {
                state = inner
                    .completion()
                    .wait(state)
                    .expect("pool mutex poisoned");
            }
            let taken = unsafe { inner.payload_mut().result.take() }.expect("completed task has no result");
            drop(state);
            taken
        };

        match outcome {
            Outcome::Value(v) => v,
            Outcome::Panicked(payload) => panic::resume_unwind(payload),
        }
    }

    fn steal_and_dispatch_loop(self: Arc<Self>) {
        if !self.start_gate.worker_arrive_and_wait() {
            // Construction was aborted: a sibling worker thread failed to
            // spawn, so this worker was never registered with a `WorkerSlot`
            // to look itself up in. There is nothing queued for it and
            // nothing to clean up; just exit so the builder's join succeeds.
            return;
        }

        let mut my_index: Option<usize> = None;
        loop {
            let mut state = self.state.lock().expect("pool mutex poisoned");

            let idx = *my_index.get_or_insert_with(|| {
                let tid = thread::current().id();
                let idx = state
                    .workers
                    .iter()
                    .position(|w| w.thread_id == tid)
                    .expect("worker thread id missing from its own pool's registry");
                CURRENT_WORKER.with(|c| c.set(Some((self.id, idx))));
                idx
            });

            while state.idle() {
                state = self.idle_cv.wait(state).expect("pool mutex poisoned");
            }

            if state.shutdown {
                drop(state);
                break;
            }

            let Some(inner) = select_task(&mut state, idx) else {
                // Spurious wake, or another worker already grabbed the only
                // task between our wake-up and the lock; re-check the
                // predicate rather than assume work exists.
                drop(state);
                continue;
            };

            inner.set_status(task::in_progress());
            let body = unsafe { inner.payload_mut().body.take() }
                .expect("dispatched task had no body");
            drop(state);

            let outcome = run_body_owned(body, &self);

            let state2 = self.state.lock().expect("pool mutex poisoned");
            unsafe { inner.payload_mut().result = Some(outcome) };
            inner.set_status(task::completed());
            inner.completion().notify_all();
            drop(state2);
        }
    }
}

/// Runs an owned task body, catching panics so one task can't take a worker
/// thread down with it; the payload is re-raised by whichever thread later
/// calls `Task::join`, mirroring `std::thread::JoinHandle::join`.
fn run_body_owned(body: task::Job, pool: &Pool) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| body(pool))) {
        Ok(value) => Outcome::Value(value),
        Err(payload) => Outcome::Panicked(payload),
    }
}

/// §4.4 worker queue discipline: own deque front, then global queue front,
/// then steal the first non-empty victim's back, in deterministic registry
/// order.
fn select_task(state: &mut PoolState, my_index: usize) -> Option<Arc<TaskInner>> {
    if let Some(t) = state.workers[my_index].deque.pop_front() {
        return Some(t);
    }
    if let Some(t) = state.global_queue.pop_front() {
        return Some(t);
    }
    for i in 0..state.workers.len() {
        if i == my_index {
            continue;
        }
        if let Some(t) = state.workers[i].deque.pop_back() {
            return Some(t);
        }
    }
    None
}

/// Owning handle returned by [`crate::pool_new`] / [`PoolBuilder::build`].
///
/// Dropping it shuts the pool down in an orderly fashion: the shutdown flag
/// is raised, every sleeping worker is woken, and all worker threads are
/// joined before the drop returns. Tasks still sitting in a queue at that
/// point may or may not run; callers that care should `join` every
/// outstanding [`Task`] first.
pub struct PoolHandle {
    pool: Arc<Pool>,
    threads: Vec<JoinHandle<()>>,
}

impl std::ops::Deref for PoolHandle {
    type Target = Pool;
    fn deref(&self) -> &Pool {
        &self.pool
    }
}

impl PoolHandle {
    /// Named alias for dropping this handle, matching the scheduler's
    /// external operation table: shuts the pool down and joins every worker.
    pub fn shutdown_and_destroy(self) {
        drop(self);
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.pool.state.lock().expect("pool mutex poisoned");
            state.shutdown = true;
            let abandoned: usize = state.global_queue.len()
                + state.workers.iter().map(|w| w.deque.len()).sum::<usize>();
            self.pool.idle_cv.notify_all();
            abandoned
        };

        if abandoned > 0 {
            log::warn!(
                "shutting down pool {} with {abandoned} task(s) still queued and undispatched",
                self.pool.id
            );
        }

        for thread in std::mem::take(&mut self.threads) {
            if thread.join().is_err() {
                log::warn!("a worker thread in pool {} panicked", self.pool.id);
            }
        }
    }
}

/// Builder for a [`PoolHandle`], mirroring the worker-count/thread-naming/
/// stack-size knobs a production thread pool builder exposes.
pub struct PoolBuilder {
    num_threads: usize,
    thread_name: Option<String>,
    stack_size: Option<usize>,
}

impl PoolBuilder {
    /// Start building a pool with `num_threads` workers.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads,
            thread_name: None,
            stack_size: None,
        }
    }

    /// Name worker threads `"{prefix}-{n}"` instead of leaving them unnamed.
    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = Some(prefix.into());
        self
    }

    /// Override the OS-default stack size for worker threads.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Build the pool: spawns all worker threads and blocks until every one
    /// of them has entered its run loop before returning.
    pub fn build(self) -> Result<PoolHandle, PoolError> {
        if self.num_threads == 0 {
            return Err(PoolError::ZeroWorkers);
        }

        let pool = Arc::new(Pool {
            id: next_pool_id(),
            state: Mutex::new(PoolState {
                global_queue: List::new(),
                workers: Vec::with_capacity(self.num_threads),
                shutdown: false,
            }),
            idle_cv: Condvar::new(),
            start_gate: StartGate::new(self.num_threads),
        });

        let mut threads = Vec::with_capacity(self.num_threads);
        for index in 0..self.num_threads {
            let mut builder = thread::Builder::new();
            if let Some(prefix) = &self.thread_name {
                builder = builder.name(format!("{prefix}-{index}"));
            }
            if let Some(size) = self.stack_size {
                builder = builder.stack_size(size);
            }

            let pool_for_thread = Arc::clone(&pool);
            let handle = builder
                .spawn(move || pool_for_thread.steal_and_dispatch_loop())
                .map_err(|source| {
                    // Unwind what we've started. The threads that did spawn
                    // are parked at the start gate waiting for `num_threads`
                    // arrivals that will now never come; `abort` releases
                    // them (each exits without entering its loop) so the
                    // joins below can't hang.
                    let mut state = pool.state.lock().expect("pool mutex poisoned");
                    state.shutdown = true;
                    drop(state);
                    pool.start_gate.abort();
                    pool.idle_cv.notify_all();
                    for t in threads.drain(..) {
                        let _ = t.join();
                    }
                    PoolError::SpawnFailed { index, source }
                })?;

            {
                let mut state = pool.state.lock().expect("pool mutex poisoned");
                state.workers.push(WorkerSlot {
                    thread_id: handle.thread().id(),
                    deque: List::new(),
                });
            }
            threads.push(handle);
        }

        log::trace!("pool {} starting {} worker thread(s)", pool.id, self.num_threads);
        pool.start_gate.wait_for_workers();

        Ok(PoolHandle { pool, threads })
    }
}

/// `pool_new`: build a pool of `n` workers with default thread naming and
/// stack size. Blocks until all workers are ready.
pub fn pool_new(n: usize) -> Result<PoolHandle, PoolError> {
    PoolBuilder::new(n).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn is_send<T: Send>() {}
    fn is_sync<T: Sync>() {}

    #[test]
    fn pool_and_handle_are_send_and_sync() {
        is_send::<Pool>();
        is_sync::<Pool>();
        is_send::<PoolHandle>();
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(pool_new(0), Err(PoolError::ZeroWorkers)));
    }

    #[test]
    fn adder_on_one_thread() {
        let pool = pool_new(1).unwrap();
        let task = pool.submit((20usize, 22usize), |_pool, (a, b)| a + b);
        assert_eq!(task.join(&pool), 42);
    }

    #[test]
    fn batched_multiplier_on_one_thread() {
        let pool = pool_new(1).unwrap();
        let tasks: Vec<_> = (0..200)
            .map(|i: usize| pool.submit(i, |_pool, i| i * (i + 1)))
            .collect();
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.join(&pool), i * (i + 1));
        }
    }

    #[test]
    fn each_task_body_runs_exactly_once() {
        let pool = pool_new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit((), move |_pool, ()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.join(&pool);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn helping_resolves_recursive_fork_join_on_a_single_worker() {
        // A single-worker pool can only make progress on a deep recursive
        // fork/join chain if `future_get` executes unstarted tasks inline.
        fn rec(pool: &Pool, n: u32) -> u32 {
            if n == 0 {
                return 0;
            }
            let child = pool.submit(n - 1, rec);
            1 + child.join(pool)
        }
        let pool = pool_new(1).unwrap();
        let task = pool.submit(50u32, rec);
        assert_eq!(task.join(&pool), 50);
    }

    #[test]
    fn work_conservation_across_workers() {
        let pool = pool_new(4).unwrap();
        let start = std::time::Instant::now();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                pool.submit((), |_pool, ()| {
                    std::thread::sleep(Duration::from_millis(50));
                })
            })
            .collect();
        for task in tasks {
            task.join(&pool);
        }
        // 8 tasks / 4 workers = 2 rounds of ~50ms; generous slack for CI jitter.
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn shutdown_joins_every_worker() {
        let pool = pool_new(3).unwrap();
        let task = pool.submit((1usize, 1usize), |_pool, (a, b)| a + b);
        assert_eq!(task.join(&pool), 2);
        pool.shutdown_and_destroy();
    }

    #[test]
    fn panic_in_a_task_body_is_re_raised_on_join() {
        let pool = pool_new(1).unwrap();
        let task = pool.submit((), |_pool: &Pool, ()| -> u32 { panic!("boom") });
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.join(&pool)));
        assert!(result.is_err());
    }
}

use std::any::Any;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::offset_of;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar};

use fj_list::{Linked, Links};

use crate::pool::Pool;

const NOT_STARTED: u8 = 0;
const IN_PROGRESS: u8 = 1;
const COMPLETED: u8 = 2;

/// Where an unstarted task currently sits, so the helping path in
/// [`Task::join`] knows which queue to unlink it from without scanning.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Location {
    Global,
    Worker(usize),
}

pub(crate) type Job = Box<dyn FnOnce(&Pool) -> Box<dyn Any + Send> + Send>;

/// What a completed task produced: its value, or the payload of a panic
/// caught while running the body.
pub(crate) enum Outcome {
    Value(Box<dyn Any + Send>),
    Panicked(Box<dyn Any + Send>),
}

/// The payload mutated under the owning pool's mutex. Never touched without
/// holding that lock.
pub(crate) struct TaskPayload {
    pub(crate) body: Option<Job>,
    pub(crate) result: Option<Outcome>,
    pub(crate) location: Location,
}

/// The heap node a submitted task lives as. Intrusively linked into exactly
/// one of the pool's queues while `status == NotStarted`.
pub(crate) struct TaskInner {
    links: Links<TaskInner>,
    status: AtomicU8,
    payload: UnsafeCell<TaskPayload>,
    completion: Condvar,
}

// `payload` is only ever read or written while the owning pool's mutex is
// held; `status` is a plain atomic and safe to load from any thread at any
// time (used by `Task::drop`'s diagnostic check, among others).
unsafe impl Sync for TaskInner {}

impl TaskInner {
    pub(crate) fn new_for_pool(body: Job) -> Arc<Self> {
        Arc::new(Self {
            links: Links::new(),
            status: AtomicU8::new(NOT_STARTED),
            payload: UnsafeCell::new(TaskPayload {
                body: Some(body),
                result: None,
                location: Location::Global,
            }),
            completion: Condvar::new(),
        })
    }

    pub(crate) fn status(&self) -> u8 {
        self.status.load(Ordering::Acquire)
    }

    /// # Safety
    /// Caller must hold the owning pool's mutex.
    pub(crate) unsafe fn payload_mut(&self) -> &mut TaskPayload {
        unsafe { &mut *self.payload.get() }
    }

    pub(crate) fn completion(&self) -> &Condvar {
        &self.completion
    }

    pub(crate) fn set_status(&self, status: u8) {
        self.status.store(status, Ordering::Release);
    }
}

unsafe impl Linked for TaskInner {
    type Handle = Arc<TaskInner>;

    fn into_ptr(handle: Arc<TaskInner>) -> NonNull<TaskInner> {
        unsafe { NonNull::new_unchecked(Arc::into_raw(handle) as *mut TaskInner) }
    }

    unsafe fn from_ptr(ptr: NonNull<TaskInner>) -> Arc<TaskInner> {
        unsafe { Arc::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<TaskInner>) -> NonNull<Links<TaskInner>> {
        unsafe { fj_list::offset_to(ptr, offset_of!(TaskInner, links)) }
    }
}

/// A handle to a submitted computation's eventual result.
///
/// Resolve it with [`Task::join`]. There is no separate "free" step: once
/// `join` has consumed the handle (or the handle is dropped before ever being
/// joined, which is a misuse logged as a warning), the underlying node drops
/// like any other `Arc`.
#[must_use = "a Task does nothing unless joined; dropping it without joining abandons its result"]
pub struct Task<R> {
    pub(crate) inner: Arc<TaskInner>,
    _marker: PhantomData<fn() -> R>,
}

// SAFETY: `Task<R>` only ever moves an `Arc<TaskInner>` across threads and
// produces an `R` on `join`; it carries no `R` value itself.
unsafe impl<R: Send> Send for Task<R> {}

impl<R: Send + 'static> Task<R> {
    pub(crate) fn new(inner: Arc<TaskInner>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Block until this task's body has run, returning its result.
    ///
    /// If the task has not yet been dispatched to a worker, the calling
    /// thread runs it inline instead of waiting — this is what lets a
    /// single-worker pool resolve a recursive fork/join chain without
    /// deadlocking. If the body panicked, that panic is re-raised here.
    pub fn join(self, pool: &Pool) -> R {
        let boxed = pool.resolve(&self.inner);
        *boxed
            .downcast::<R>()
            .expect("task result type did not match Task<R>'s R; this is a fj_core bug")
    }
}

impl<R> Drop for Task<R> {
    fn drop(&mut self) {
        if self.inner.status() != COMPLETED {
            debug_assert!(
                false,
                "a Task was dropped without being joined; every submitted task must be joined exactly once"
            );
            log::warn!(
                "a Task was dropped without being joined; its result (or the work itself, \
                 if never dispatched) is discarded"
            );
        }
    }
}

pub(crate) const fn not_started() -> u8 {
    NOT_STARTED
}

pub(crate) const fn in_progress() -> u8 {
    IN_PROGRESS
}

pub(crate) const fn completed() -> u8 {
    COMPLETED
}

//! # Worker Pool
//!
//! A fixed set of OS threads, each pinned to a logical CPU at spawn,
//! coordinating through one mutex/condvar pair and a **single-slot mailbox**:
//! at most one task is pending at any instant. A worker clears the mailbox
//! before it starts executing, so dispatch of the next task overlaps
//! execution of the previous one - but dispatch itself is fully serialized
//! through the slot, which is what lets [`ThreadPool::wait_for_tasks`] treat
//! "mailbox empty" as "nothing left to dispatch".
//!
//! There is no cancellation and no timeout anywhere: a task that never
//! returns blocks the pool (and the program) forever. The workload is
//! trusted and short-lived by design.
//!
//! ## Safety Note
//!
//! This module requires unsafe code to hand each worker a reference to its
//! arena-resident busy flag. All unsafe blocks are reviewed and documented.

#![allow(unsafe_code)]

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::exec::affinity::{self, CpuMask};
use crate::memory::{Arena, FixedArray};

/// A dispatched task; receives the index of the worker executing it.
type Task = Box<dyn FnOnce(usize) + Send>;

/// The single-slot mailbox plus the pool run state, guarded by one mutex.
struct Mailbox {
    /// False once shutdown has begun; workers drain and terminate.
    running: bool,
    /// The one pending task, or empty.
    pending: Option<Task>,
}

/// State shared between the coordinator and every worker.
struct PoolShared {
    mailbox: Mutex<Mailbox>,
    /// Signalled when a task lands in the mailbox, when a worker claims one,
    /// when a worker finishes one, and at shutdown.
    task_received: Condvar,
}

/// Per-worker descriptor, resident in the init arena.
struct WorkerSlot {
    /// Set while the worker executes a claimed task. Written by the worker,
    /// read lock-free by the completion spin in `wait_for_tasks`.
    busy: AtomicBool,
    /// Join handle, taken at shutdown.
    handle: Option<JoinHandle<()>>,
}

/// Returns the arena bytes the worker-descriptor table needs for
/// `thread_count` workers, including the block header.
///
/// Callers sizing an arena up front add this to their own table sizes.
#[must_use]
pub fn worker_table_bytes(thread_count: usize) -> usize {
    thread_count * mem::size_of::<WorkerSlot>() + 2 * mem::size_of::<usize>()
}

/// A fixed worker pool with a single-slot task mailbox.
///
/// # Usage
///
/// The pool expects one coordinating thread to drive it: that thread calls
/// [`ThreadPool::push`], [`ThreadPool::parallel_for`] and
/// [`ThreadPool::wait_for_tasks`], exactly like the simulation's frame loop.
/// Tasks themselves run concurrently across workers.
///
/// ```rust,ignore
/// let arena = Arena::new();
/// assert!(arena.reserve(1 << 16, None));
///
/// let mut pool = ThreadPool::new(&arena, 3, 2);
/// pool.parallel_for(|start, end| heavy_math(start..end), 400_000, 0);
/// pool.shutdown();
/// ```
pub struct ThreadPool<'a> {
    /// Worker descriptors, carved from the init arena.
    workers: FixedArray<'a, WorkerSlot>,
    shared: Arc<PoolShared>,
}

impl<'a> ThreadPool<'a> {
    /// Spawns `thread_count` workers, allocating their descriptor table from
    /// `arena`.
    ///
    /// Worker `i` pins itself to logical CPU `affinity_offset + i * 2`,
    /// skipping SMT siblings so two workers never share a physical core.
    ///
    /// # Panics
    ///
    /// Panics if `thread_count` is zero, the arena cannot hold the worker
    /// table, or the OS refuses to spawn a thread.
    #[must_use]
    pub fn new(arena: &'a Arena, thread_count: usize, affinity_offset: usize) -> Self {
        assert!(thread_count > 0, "a pool needs at least one worker");

        let mut workers = FixedArray::from_fn(arena, thread_count, |_| WorkerSlot {
            busy: AtomicBool::new(false),
            handle: None,
        });

        let shared = Arc::new(PoolShared {
            mailbox: Mutex::new(Mailbox {
                running: true,
                pending: None,
            }),
            task_received: Condvar::new(),
        });

        // One raw base for every per-slot access below. Indexing the array
        // again after a worker holds its flag pointer would reborrow the
        // slot and invalidate that pointer under the aliasing model.
        let slots: *mut WorkerSlot = workers.as_mut_slice().as_mut_ptr();

        for index in 0..thread_count {
            let shared = Arc::clone(&shared);
            // SAFETY: the descriptor table lives in arena memory at a stable
            // address, and shutdown() joins every worker before the table
            // (or the arena behind it) can be torn down. Drop runs
            // shutdown() as well, so the flag outlives the thread either
            // way.
            let busy: &'static AtomicBool =
                unsafe { &*std::ptr::addr_of!((*slots.add(index)).busy) };
            let cpu = affinity_offset + index * 2;

            let handle = thread::Builder::new()
                .name(format!("skein-worker-{index}"))
                .spawn(move || worker_loop(&shared, busy, index, cpu))
                .expect("failed to spawn pool worker");

            // SAFETY: index < thread_count; writing through the same base
            // the flag pointer was derived from leaves that pointer valid.
            unsafe { (*slots.add(index)).handle = Some(handle) };
        }

        tracing::debug!(workers = thread_count, affinity_offset, "worker pool started");

        Self { workers, shared }
    }

    /// Returns the number of workers.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Returns whether the pool is accepting wakeups (shutdown not begun).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.mailbox.lock().running
    }

    /// Blocks until the mailbox is empty, installs `task`, and wakes one
    /// waiter.
    ///
    /// The call does not return before the mailbox has accepted the task, so
    /// no task is ever silently dropped. It *does* return before the task
    /// runs; pair with [`ThreadPool::wait_for_tasks`] to observe completion.
    pub fn push<F>(&self, task: F)
    where
        F: FnOnce(usize) + Send + 'static,
    {
        self.push_boxed(Box::new(task));
    }

    /// [`ThreadPool::push`] for tasks that ignore their worker index.
    pub fn push_untagged<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.push(move |_worker| task());
    }

    fn push_boxed(&self, task: Task) {
        let mut mailbox = self.shared.mailbox.lock();
        self.shared
            .task_received
            .wait_while(&mut mailbox, |m| m.pending.is_some());
        mailbox.pending = Some(task);
        drop(mailbox);
        self.shared.task_received.notify_one();
    }

    /// Splits `[0, iters)` into contiguous chunks and runs `task` over all
    /// of them: every chunk but the last is dispatched through the mailbox,
    /// and the final (clamped) chunk runs on the calling thread so the
    /// caller always contributes one unit of work alongside the in-flight
    /// chunks.
    ///
    /// The chunk size is `iters / (threads + 1)`; with `requested_threads`
    /// zero the pool's worker count is used. The call returns only after
    /// **every** chunk has finished executing, so `task` may freely borrow
    /// caller state - and a following [`ThreadPool::wait_for_tasks`] is a
    /// no-op. The completion wait also runs if `task` panics on the calling
    /// thread, so an unwinding caller cannot free state an in-flight chunk
    /// still reads.
    ///
    /// # Panics
    ///
    /// Panics if the effective thread count is zero, or on workloads smaller
    /// than the thread count (`iters <= threads` would produce a zero-sized
    /// chunk step that can never reach the end of the range).
    pub fn parallel_for<F>(&self, task: F, iters: usize, requested_threads: usize)
    where
        F: Fn(usize, usize) + Sync,
    {
        let threads = if requested_threads == 0 {
            self.worker_count()
        } else {
            requested_threads
        };
        assert!(threads > 0, "parallel_for needs a worker to split across");
        assert!(
            iters > threads,
            "parallel_for requires more iterations than threads ({iters} <= {threads})"
        );

        let chunk_size = iters / (threads + 1);
        let raw = RawRangeTask {
            context: std::ptr::addr_of!(task).cast(),
            call: call_range_task::<F>,
        };

        // Workers reach `task` through a pointer into this frame, so the
        // frame must not unwind while a chunk is in flight: the guard runs
        // the completion wait on every exit path, panicking included.
        let completion = CompletionWait { pool: self };

        let mut chunk = 0;
        loop {
            let start = chunk * chunk_size;
            let end = ((chunk + 1) * chunk_size).min(iters);

            if end == iters {
                // Final chunk: the caller does this one itself, overlapping
                // whatever is still in flight.
                task(start, end);
                break;
            }

            self.push_boxed(Box::new(move |_worker| {
                // Move the whole struct into the closure; capturing its
                // raw-pointer fields one by one would sidestep the Send
                // impl on RawRangeTask.
                let raw = raw;
                // SAFETY: `task` outlives every chunk because the guard
                // above blocks this frame until full completion.
                unsafe { (raw.call)(raw.context, start, end) };
            }));
            chunk += 1;
        }

        drop(completion);
    }

    /// Blocks until the mailbox is empty (every pushed task has been
    /// *claimed*), then spins until every worker's busy flag clears (every
    /// claimed task has *finished*).
    ///
    /// The two phases are both required: mailbox-empty only proves dispatch
    /// completed. The spin trades CPU for wake-up latency, which is the
    /// right trade for tasks that are short next to a scheduler tick.
    pub fn wait_for_tasks(&self) {
        let mut mailbox = self.shared.mailbox.lock();
        self.shared
            .task_received
            .wait_while(&mut mailbox, |m| m.pending.is_some());
        drop(mailbox);

        for slot in self.workers.iter() {
            while slot.busy.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
        }
    }

    /// Stops issuing wakeups, then joins every worker unconditionally.
    ///
    /// A task already claimed by a worker runs to completion; a task still
    /// in the mailbox is drained by the last worker to notice shutdown.
    /// Idempotent - also invoked from `Drop`, so a pool that falls out of
    /// scope still joins its threads.
    pub fn shutdown(&mut self) {
        {
            let mut mailbox = self.shared.mailbox.lock();
            if !mailbox.running {
                return;
            }
            mailbox.running = false;
        }
        self.shared.task_received.notify_all();

        for slot in self.workers.as_mut_slice() {
            if let Some(handle) = slot.handle.take() {
                let _ = handle.join();
            }
            slot.busy.store(false, Ordering::Relaxed);
        }

        tracing::debug!("worker pool joined");
    }
}

impl Drop for ThreadPool<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Blocks on [`ThreadPool::wait_for_tasks`] when dropped, so `parallel_for`
/// performs its completion wait even while unwinding out of a panicking
/// caller-side chunk.
struct CompletionWait<'p, 'a> {
    pool: &'p ThreadPool<'a>,
}

impl Drop for CompletionWait<'_, '_> {
    fn drop(&mut self) {
        self.pool.wait_for_tasks();
    }
}

/// Borrow-erased range task used by `parallel_for`; `Send` because the
/// pointee is `Sync` and outlives the dispatch (see the SAFETY note at the
/// push site).
#[derive(Clone, Copy)]
struct RawRangeTask {
    context: *const (),
    call: unsafe fn(*const (), usize, usize),
}

// SAFETY: `context` points at a `Sync` closure; see RawRangeTask docs.
unsafe impl Send for RawRangeTask {}

/// Trampoline recovering the concrete closure type behind the erased
/// context pointer.
unsafe fn call_range_task<F: Fn(usize, usize)>(context: *const (), start: usize, end: usize) {
    let task = &*context.cast::<F>();
    task(start, end);
}

/// The per-worker state machine: Idle (waiting on the condvar) ->
/// Dispatched (claimed and cleared the mailbox, marked busy) -> Executing
/// (outside the lock) -> Idle.
fn worker_loop(shared: &PoolShared, busy: &AtomicBool, index: usize, cpu: usize) {
    let mut mask = CpuMask::new();
    mask.add(cpu);
    affinity::pin_current_thread(&mask);

    loop {
        let mut mailbox = shared.mailbox.lock();
        shared
            .task_received
            .wait_while(&mut mailbox, |m| m.running && m.pending.is_none());

        // Claim-and-clear: the mailbox is free for the next push before this
        // task has even started.
        let Some(task) = mailbox.pending.take() else {
            // Shutdown with nothing left to dispatch.
            return;
        };

        // Busy rises under the same lock that empties the mailbox, so a
        // waiter that sees the slot empty also sees this worker busy.
        busy.store(true, Ordering::Release);
        drop(mailbox);
        shared.task_received.notify_all();

        task(index);

        busy.store(false, Ordering::Release);
        shared.task_received.notify_all();
    }
}

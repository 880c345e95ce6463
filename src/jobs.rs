//! Job scheduler and completion barriers.
//!
//! The scheduler runs fire-and-forget jobs on a fixed worker pool with no
//! ordering guarantee between jobs. Callers that need a synchronization point
//! create a [`JobCompletion`] barrier, attach one [`CompletionTicket`] per
//! dispatched job and wait on the barrier once all jobs are in flight.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = JobScheduler::with_default_threads();
//! let completion = scheduler.create_completion();
//! for work in workloads {
//!     scheduler.dispatch_with(&completion, move || work.run());
//! }
//! completion.wait(); // blocks until every job finished
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

/// Concurrency policy for a frame phase.
///
/// `Serial` bypasses the scheduler entirely and executes work synchronously
/// on the calling thread in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPolicy {
    /// Run work inline on the calling thread.
    Serial,
    /// Dispatch work to the worker pool.
    Parallel,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared state of a completion barrier.
#[derive(Debug)]
struct CompletionState {
    outstanding: Mutex<usize>,
    condvar: Condvar,
}

impl CompletionState {
    fn wait(&self) {
        let mut outstanding = self.outstanding.lock();
        while *outstanding > 0 {
            self.condvar.wait(&mut outstanding);
        }
    }
}

/// Barrier over a group of dispatched jobs.
///
/// Each job holds a [`CompletionTicket`]; the barrier is released when every
/// ticket has been dropped. Dropping an unwaited barrier waits too, so an
/// early return can never leak outstanding-task handles.
#[derive(Debug)]
pub struct JobCompletion {
    state: Arc<CompletionState>,
    waited: bool,
}

impl JobCompletion {
    /// Creates a barrier with no outstanding jobs.
    pub fn new() -> Self {
        Self {
            state: Arc::new(CompletionState {
                outstanding: Mutex::new(0),
                condvar: Condvar::new(),
            }),
            waited: false,
        }
    }

    /// Registers one outstanding job on this barrier.
    pub fn ticket(&self) -> CompletionTicket {
        *self.state.outstanding.lock() += 1;
        CompletionTicket {
            state: self.state.clone(),
        }
    }

    /// Number of jobs that have not finished yet.
    pub fn outstanding(&self) -> usize {
        *self.state.outstanding.lock()
    }

    /// Blocks until every ticket has been dropped, consuming the barrier.
    pub fn wait(mut self) {
        self.state.wait();
        self.waited = true;
    }
}

impl Default for JobCompletion {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobCompletion {
    fn drop(&mut self) {
        if !self.waited {
            self.state.wait();
        }
    }
}

/// RAII handle for one outstanding job; releases the barrier on drop.
///
/// The ticket is captured by the job closure, so it is released even if the
/// job panics.
#[derive(Debug)]
pub struct CompletionTicket {
    state: Arc<CompletionState>,
}

impl Drop for CompletionTicket {
    fn drop(&mut self) {
        let mut outstanding = self.state.outstanding.lock();
        *outstanding -= 1;
        if *outstanding == 0 {
            self.state.condvar.notify_all();
        }
    }
}

/// Fixed-size worker pool executing dispatched jobs.
///
/// Workers pull jobs from a shared channel; there is no ordering guarantee
/// between dispatched jobs. The pool joins its workers on drop.
#[derive(Debug)]
pub struct JobScheduler {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl JobScheduler {
    /// Creates a scheduler with the specified worker count (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("scene-job-{i}"))
                .spawn(move || loop {
                    let job = {
                        let receiver = receiver.lock();
                        receiver.recv()
                    };
                    match job {
                        Ok(job) => {
                            if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                log::error!("Job panicked on worker thread");
                            }
                        }
                        // Channel closed: scheduler is shutting down.
                        Err(_) => break,
                    }
                })
                .expect("failed to spawn job worker thread");
            workers.push(handle);
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            num_threads,
        }
    }

    /// Creates a scheduler sized to the machine's available parallelism.
    pub fn with_default_threads() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(threads)
    }

    /// Returns the configured worker count.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Dispatches a fire-and-forget job to the worker pool.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) {
        let sender = self.sender.lock();
        if let Some(sender) = sender.as_ref() {
            // Send only fails when all workers are gone, i.e. during shutdown.
            if sender.send(Box::new(job)).is_err() {
                log::warn!("Dispatch after scheduler shutdown; job dropped");
            }
        } else {
            log::warn!("Dispatch after scheduler shutdown; job dropped");
        }
    }

    /// Dispatches a job tracked by the given completion barrier.
    pub fn dispatch_with(&self, completion: &JobCompletion, job: impl FnOnce() + Send + 'static) {
        let ticket = completion.ticket();
        self.dispatch(move || {
            job();
            drop(ticket);
        });
    }

    /// Creates a new completion barrier for a group of jobs.
    pub fn create_completion(&self) -> JobCompletion {
        JobCompletion::new()
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        // Close the channel so workers exit their receive loop.
        self.sender.lock().take();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

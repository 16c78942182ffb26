//! A fixed-size worker pool with a "drain to quiescence" barrier.
//!
//! A FIFO task queue guarded by its own lock/condvar, and a *separate*
//! pending-work counter guarded by its own lock/condvar so that `finish()`
//! never has to touch the queue's head/tail lock to decide whether the
//! barrier is satisfied.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::warn;

type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct Pending {
    count: Mutex<usize>,
    zero: Condvar,
}

/// A pool of `thread_count` worker threads draining a shared FIFO queue.
pub struct WorkQueue {
    queue: Arc<Mutex<QueueState>>,
    not_empty: Arc<Condvar>,
    pending: Arc<Pending>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl WorkQueue {
    /// `thread_count` is clamped to at least 1; the CLI-level fallback to 5
    /// threads happens in the driver, not here.
    pub fn new(thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        let queue = Arc::new(Mutex::new(QueueState {
            tasks: VecDeque::new(),
            shutdown: false,
        }));
        let not_empty = Arc::new(Condvar::new());
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            zero: Condvar::new(),
        });

        let workers = (0..thread_count)
            .map(|id| {
                let queue = Arc::clone(&queue);
                let not_empty = Arc::clone(&not_empty);
                let pending = Arc::clone(&pending);
                thread::Builder::new()
                    .name(format!("workqueue-{id}"))
                    .spawn(move || worker_loop(queue, not_empty, pending))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self {
            queue,
            not_empty,
            pending,
            workers: Mutex::new(workers),
            thread_count,
        }
    }

    /// Enqueue a task for execution on some worker thread. Never blocks on
    /// worker readiness; increments the pending counter before the task is
    /// visible to workers. A no-op once `shutdown()` has been signalled: no
    /// worker remains to ever dequeue (and decrement pending for) a task
    /// accepted after that point.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let state = self.queue.lock().unwrap();
            if state.shutdown {
                return;
            }
        }
        {
            let mut count = self.pending.count.lock().unwrap();
            *count += 1;
        }
        {
            let mut state = self.queue.lock().unwrap();
            if state.shutdown {
                let mut count = self.pending.count.lock().unwrap();
                *count -= 1;
                if *count == 0 {
                    self.pending.zero.notify_all();
                }
                return;
            }
            state.tasks.push_back(Box::new(task));
        }
        self.not_empty.notify_one();
    }

    /// Block until the pending-work counter reaches zero. Workers stay alive
    /// and the queue remains usable afterward.
    pub fn finish(&self) {
        let mut count = self.pending.count.lock().unwrap();
        while *count != 0 {
            count = self.pending.zero.wait(count).unwrap();
        }
    }

    /// Signal workers to exit once the queue drains of tasks already
    /// enqueued. Idempotent. `execute()` rejects outright (no-op) any task
    /// submitted after this point, since no worker remains to ever dequeue
    /// (and decrement pending for) it.
    pub fn shutdown(&self) {
        let mut state = self.queue.lock().unwrap();
        state.shutdown = true;
        drop(state);
        self.not_empty.notify_all();
    }

    /// `finish()`, then `shutdown()`, then wait for every worker thread to
    /// terminate. Safe to call with other `Arc<WorkQueue>` handles still
    /// alive — it only drains the worker `JoinHandle`s, not the queue value
    /// itself.
    pub fn join(&self) {
        self.finish();
        self.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.join();
        }
    }

    /// Whether any work is currently enqueued or in flight.
    pub fn is_active(&self) -> bool {
        *self.pending.count.lock().unwrap() != 0
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Number of tasks currently sitting in the queue, not counting tasks a
    /// worker has already dequeued and is executing.
    pub fn size(&self) -> usize {
        self.queue.lock().unwrap().tasks.len()
    }
}

fn worker_loop(queue: Arc<Mutex<QueueState>>, not_empty: Arc<Condvar>, pending: Arc<Pending>) {
    loop {
        let task = {
            let mut state = queue.lock().unwrap();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                state = not_empty.wait(state).unwrap();
            }
        };

        let Some(task) = task else {
            break;
        };

        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            warn!(task.panic = %message, "work queue task panicked, continuing");
        }

        let mut count = pending.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            pending.zero.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn finish_waits_for_all_enqueued_work() {
        let queue = WorkQueue::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let counter = Arc::clone(&counter);
            queue.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.finish();
        assert_eq!(counter.load(Ordering::SeqCst), 200);
        queue.join();
    }

    #[test]
    fn finish_can_be_called_multiple_times() {
        let queue = WorkQueue::new(2);
        queue.execute(|| {});
        queue.finish();
        queue.execute(|| {});
        queue.finish();
        assert!(!queue.is_active());
        queue.join();
    }

    #[test]
    fn panicking_task_does_not_deadlock_finish() {
        let queue = WorkQueue::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        queue.execute(|| panic!("boom"));
        {
            let counter = Arc::clone(&counter);
            queue.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        queue.finish();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        queue.join();
    }

    #[test]
    fn execute_after_shutdown_is_rejected_not_hung() {
        let queue = WorkQueue::new(2);
        queue.shutdown();
        queue.execute(|| panic!("must never run"));
        // A task accepted after shutdown would have no worker left to
        // decrement its pending count; finish() would hang forever if
        // execute() didn't reject it outright.
        queue.finish();
        assert!(!queue.is_active());
    }

    #[test]
    fn join_drains_queue_before_workers_exit() {
        let queue = WorkQueue::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            queue.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        queue.join();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}

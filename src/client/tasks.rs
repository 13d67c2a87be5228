// src/client/tasks.rs
//! Fire-and-forget deferred tasks on a single worker. The delay is the only
//! ordering guarantee; there is no cancellation.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

struct Job {
    run_at: Instant,
    run: Box<dyn FnOnce() + Send>,
}

pub struct TaskQueue {
    tx: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("pvr-tasks".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let now = Instant::now();
                    if job.run_at > now {
                        thread::sleep(job.run_at - now);
                    }
                    (job.run)();
                }
                debug!("task worker stopped");
            })
            .expect("spawn task worker");
        Self { tx: Some(tx), worker: Some(worker) }
    }

    /// Run `task` roughly `delay` after now, without blocking the caller.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Job { run_at: Instant::now() + delay, run: Box::new(task) });
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        // Disconnect first so the worker drains and exits
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

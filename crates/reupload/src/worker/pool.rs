use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error};

use crate::error::WorkerError;

/// Runs `f`, turning a panic into an error message.
pub fn run_guarded<T, F: FnOnce() -> T>(f: F) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Fixed set of named threads applying one handler to submitted jobs.
///
/// Results come back in completion order. Dropping the pool closes the job
/// channel and joins every thread, so queued jobs always run to the end.
pub struct WorkerPool<J, R> {
    name: String,
    job_sender: Option<Sender<J>>,
    result_receiver: Receiver<Result<R, WorkerError>>,
    workers: Vec<JoinHandle<()>>,
}

impl<J, R> WorkerPool<J, R>
where
    J: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(name: impl Into<String>, worker_count: usize, handler: F) -> Result<Self, WorkerError>
    where
        F: Fn(J) -> R + Send + Sync + 'static,
    {
        let name = name.into();
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = unbounded::<J>();
        let (result_sender, result_receiver) = unbounded::<Result<R, WorkerError>>();
        let handler = Arc::new(handler);

        let mut pool = Self {
            name,
            job_sender: Some(job_sender),
            result_receiver,
            workers: Vec::with_capacity(worker_count),
        };

        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let handler = Arc::clone(&handler);
            let thread_name = format!("{}-{}", pool.name, worker_id);

            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run_worker(&thread_name, job_rx, result_tx, handler.as_ref()))
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;
            pool.workers.push(handle);
        }

        debug!("Started {} {} workers", worker_count, pool.name);
        Ok(pool)
    }

    pub fn submit(&self, job: J) -> Result<(), WorkerError> {
        self.job_sender
            .as_ref()
            .ok_or(WorkerError::ChannelClosed)?
            .send(job)
            .map_err(|_| WorkerError::ChannelClosed)
    }

    /// Blocks until any worker finishes a job. `None` once every worker has
    /// exited and no results remain.
    pub fn recv_result(&self) -> Option<Result<R, WorkerError>> {
        self.result_receiver.recv().ok()
    }

    /// Closes the job channel and joins all workers.
    pub fn wait(mut self) {
        self.shutdown_and_join();
    }
}

impl<J, R> WorkerPool<J, R> {
    fn shutdown_and_join(&mut self) {
        self.job_sender.take();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.join() {
                error!("{} worker thread panicked: {}", self.name, panic_message(e));
            }
        }
    }
}

impl<J, R> Drop for WorkerPool<J, R> {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

fn run_worker<J, R, F>(
    thread_name: &str,
    job_receiver: Receiver<J>,
    result_sender: Sender<Result<R, WorkerError>>,
    handler: &F,
) where
    F: Fn(J) -> R,
{
    debug!("Worker {} started", thread_name);

    for job in job_receiver.iter() {
        let result = run_guarded(|| handler(job)).map_err(|message| {
            error!("Worker {} panicked: {}", thread_name, message);
            WorkerError::Panicked(message)
        });
        if result_sender.send(result).is_err() {
            debug!("Worker {} result channel closed", thread_name);
            break;
        }
    }

    debug!("Worker {} stopped", thread_name);
}

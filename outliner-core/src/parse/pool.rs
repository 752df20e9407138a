use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::info_span;

use super::page::{parse_page, WorkerContext};
use crate::{
    entities::{PageResult, Task},
    error::{PoolError, WorkerInitError},
};

/// Builds the context of worker `id`, called on the worker's own thread.
pub type ContextFactory =
    Arc<dyn Fn(usize) -> Result<WorkerContext, WorkerInitError> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    pub task_capacity: usize,
    pub result_capacity: usize,
}

/// Cloneable handle feeding the task queue. Submitting blocks while the
/// queue is full.
#[derive(Debug, Clone)]
pub struct TaskSubmitter {
    tx: Sender<Task>,
}

impl TaskSubmitter {
    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.tx.send(task).map_err(|_| PoolError::Closed)
    }
}

/// Fixed set of blocking workers pulling tasks from one shared queue.
///
/// Every worker loads its models once at startup and reports readiness.
/// Workers that fail to load exit without taking tasks.
pub struct WorkerPool {
    task_tx: Option<Sender<Task>>,
    stop_tx: Sender<()>,
    results_rx: mpsc::Receiver<PageResult>,
    handles: Vec<JoinHandle<()>>,
    healthy: usize,
    failures: Vec<WorkerInitError>,
}

impl WorkerPool {
    /// Starts `config.workers` workers and waits until each one is ready
    /// or has failed. Fails when no worker could load its models.
    pub async fn start(config: PoolConfig, factory: ContextFactory) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::EmptyPool);
        }
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(config.task_capacity.max(1));
        let (stop_tx, stop_rx) = crossbeam_channel::unbounded::<()>();
        let (result_tx, results_rx) = mpsc::channel(config.result_capacity.max(1));
        let (ready_tx, mut ready_rx) = mpsc::channel(config.workers);

        let mut handles = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let factory = Arc::clone(&factory);
            let task_rx = task_rx.clone();
            let stop_rx = stop_rx.clone();
            let result_tx = result_tx.clone();
            let ready_tx = ready_tx.clone();
            let span = info_span!("worker", id);
            handles.push(tokio::task::spawn_blocking(move || {
                let _guard = span.enter();
                run_worker(id, factory, task_rx, stop_rx, result_tx, ready_tx)
            }));
        }
        // Only workers hold these now
        drop((task_rx, result_tx, ready_tx));

        let mut healthy = 0;
        let mut failures = Vec::new();
        while let Some((id, status)) = ready_rx.recv().await {
            match status {
                Ok(()) => {
                    tracing::debug!("worker {id} ready");
                    healthy += 1;
                }
                Err(e) => {
                    tracing::error!("{e}");
                    failures.push(e);
                }
            }
        }

        let pool = Self {
            task_tx: Some(task_tx),
            stop_tx,
            results_rx,
            handles,
            healthy,
            failures,
        };
        if pool.healthy == 0 {
            let failures = pool.failures.clone();
            pool.shutdown().await;
            return Err(PoolError::NoHealthyWorker { failures });
        }
        tracing::info!("worker pool started with {healthy} workers");
        Ok(pool)
    }

    pub fn healthy_workers(&self) -> usize {
        self.healthy
    }

    pub fn init_failures(&self) -> &[WorkerInitError] {
        &self.failures
    }

    pub fn submitter(&self) -> Result<TaskSubmitter, PoolError> {
        self.task_tx
            .as_ref()
            .map(|tx| TaskSubmitter { tx: tx.clone() })
            .ok_or(PoolError::Closed)
    }

    pub fn submit(&self, task: Task) -> Result<(), PoolError> {
        self.submitter()?.submit(task)
    }

    /// Results in completion order. Yields `None` once every worker exited.
    pub fn results(&mut self) -> &mut mpsc::Receiver<PageResult> {
        &mut self.results_rx
    }

    /// Closes the queue, stops every worker after its current task and
    /// waits for all of them. Queued tasks are dropped.
    pub async fn shutdown(self) {
        let Self {
            task_tx,
            stop_tx,
            results_rx,
            handles,
            ..
        } = self;
        drop(task_tx);
        for _ in 0..handles.len() {
            // Workers that already exited dropped their receiver
            let _ = stop_tx.send(());
        }
        // Unblocks workers waiting on a full result channel
        drop(results_rx);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("worker panicked: {e}");
            }
        }
        tracing::debug!("worker pool shut down");
    }
}

fn run_worker(
    id: usize,
    factory: ContextFactory,
    task_rx: Receiver<Task>,
    stop_rx: Receiver<()>,
    result_tx: mpsc::Sender<PageResult>,
    ready_tx: mpsc::Sender<(usize, Result<(), WorkerInitError>)>,
) {
    let ctx = match factory(id) {
        Ok(ctx) => {
            let _ = ready_tx.blocking_send((id, Ok(())));
            ctx
        }
        Err(e) => {
            let _ = ready_tx.blocking_send((id, Err(e)));
            return;
        }
    };
    drop(ready_tx);

    let mut processed = 0usize;
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(task_rx) -> task => match task {
                Ok(task) => {
                    let result = parse_page(&ctx, task);
                    processed += 1;
                    if result_tx.blocking_send(result).is_err() {
                        tracing::warn!("result channel closed, stopping");
                        break;
                    }
                }
                // Queue closed and drained
                Err(_) => break,
            },
        }
    }
    tracing::debug!("worker exiting after {processed} pages");
}

//! Bounded background executor for menu jobs.
//!
//! Submission is fire-and-forget: the HTTP handler enqueues a job and returns
//! immediately, and a fixed set of workers drains the queue. The queue bound
//! gives backpressure instead of one unmanaged task per upload.

use crate::ai::AiService;
use crate::db::Pool;
use crate::pipeline;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// One unit of background work.
#[derive(Debug)]
pub enum Job {
    /// Run the full pipeline for a freshly created menu.
    Process { menu_id: Uuid, image: Vec<u8> },
    /// Re-run image generation for a single item.
    RegenerateImage { item_id: Uuid },
}

/// Cloneable handle for submitting jobs to the pool.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Enqueue a job. Waits only if the queue is at capacity.
    pub async fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|_| anyhow!("worker pool is shut down"))
    }
}

pub struct WorkerPool {
    queue: JobQueue,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `worker_count` workers sharing one bounded queue.
    pub fn spawn(
        pool: Pool,
        ai: Arc<dyn AiService>,
        worker_count: usize,
        enrich_concurrency: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(worker_count * 2);
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            let pool = pool.clone();
            let ai = Arc::clone(&ai);
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, receiver, pool, ai, enrich_concurrency).await;
            }));
        }
        info!(worker_count, "started worker pool");

        Self {
            queue: JobQueue { sender },
            handles,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Stop accepting jobs and wait for in-flight ones to finish.
    pub async fn shutdown(self) {
        drop(self.queue);
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(?err, "worker task panicked");
            }
        }
        info!("worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    pool: Pool,
    ai: Arc<dyn AiService>,
    enrich_concurrency: usize,
) {
    debug!(worker_id, "worker started");
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            debug!(worker_id, "worker stopping");
            break;
        };
        let result = match job {
            Job::Process { menu_id, image } => {
                pipeline::process_menu(&pool, ai.as_ref(), menu_id, &image, enrich_concurrency)
                    .await
            }
            Job::RegenerateImage { item_id } => {
                pipeline::regenerate_item_image(&pool, ai.as_ref(), item_id)
                    .await
                    .map(|_| ())
            }
        };
        if let Err(err) = result {
            error!(?err, worker_id, "job failed");
        }
    }
}

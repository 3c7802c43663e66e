use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::database::{Collection, StoreError};
use crate::registry::{Invocable, OperationError};
use crate::types::{OperationOutput, RequestData};

pub const DEFAULT_QUEUE_DEPTH: usize = 64;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from CollectionManager
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to open collection {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Operation panicked")]
    Panicked,

    #[error("Collection worker for {0} stopped")]
    WorkerStopped(PathBuf),

    #[error("Collection manager is shut down")]
    ShutDown,
}

struct Job {
    operation: Invocable,
    data: RequestData,
    ids: Vec<String>,
    respond_to: oneshot::Sender<Result<OperationOutput, ExecutorError>>,
}

struct WorkerHandle {
    sender: mpsc::Sender<Job>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    fn spawn(path: PathBuf, queue_depth: usize, idle_timeout: Option<Duration>) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth);
        let worker = CollectionWorker {
            path,
            receiver,
            idle_timeout,
            collection: None,
        };
        Self {
            sender,
            task: tokio::spawn(worker.run()),
        }
    }

    fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Serializes all work on a collection through one worker task per store path.
///
/// Workers are started on the first request for a path. A worker that sees no job for
/// the idle timeout closes its store and exits; the next request for that path starts a
/// fresh one. Jobs for one path run one at a time in submission order; different paths
/// run concurrently.
///
/// [`shutdown`]: CollectionManager::shutdown
pub struct CollectionManager {
    workers: RwLock<HashMap<PathBuf, WorkerHandle>>,
    queue_depth: usize,
    idle_timeout: Option<Duration>,
    shut_down: AtomicBool,
}

impl Default for CollectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl CollectionManager {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            shut_down: AtomicBool::new(false),
        }
    }

    /// How long a worker may sit without jobs before it closes its collection.
    /// `None` keeps workers alive until [`shutdown`](CollectionManager::shutdown).
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Run `operation` against the collection stored at `path` and wait for its result.
    pub async fn execute(
        &self,
        path: &Path,
        operation: Invocable,
        data: RequestData,
        ids: Vec<String>,
    ) -> Result<OperationOutput, ExecutorError> {
        let (respond_to, response) = oneshot::channel();
        let job = Job {
            operation,
            data,
            ids,
            respond_to,
        };

        let sender = self.sender_for(path).await?;
        if let Err(mpsc::error::SendError(job)) = sender.send(job).await {
            // The worker went idle between lookup and send; start a new one
            debug!("Collection worker for {} exited, retrying", path.display());
            self.sender_for(path)
                .await?
                .send(job)
                .await
                .map_err(|_| ExecutorError::WorkerStopped(path.to_path_buf()))?;
        }

        response
            .await
            .map_err(|_| ExecutorError::WorkerStopped(path.to_path_buf()))?
    }

    /// Get the live worker for `path` or start one lazily
    async fn sender_for(&self, path: &Path) -> Result<mpsc::Sender<Job>, ExecutorError> {
        // Fast path: try read lock
        {
            let workers = self.workers.read().await;
            if let Some(worker) = workers.get(path).filter(|w| w.is_alive()) {
                return Ok(worker.sender.clone());
            }
        }

        let mut workers = self.workers.write().await;
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ExecutorError::ShutDown);
        }
        // Someone may have started it while we waited for the write lock
        if let Some(worker) = workers.get(path).filter(|w| w.is_alive()) {
            return Ok(worker.sender.clone());
        }

        // Forget workers that exited on their own
        workers.retain(|p, w| w.is_alive() || p.as_path() == path);
        let worker = WorkerHandle::spawn(path.to_path_buf(), self.queue_depth, self.idle_timeout);
        let sender = worker.sender.clone();
        if workers.insert(path.to_path_buf(), worker).is_some() {
            warn!("Replaced stopped collection worker for: {}", path.display());
        } else {
            info!("Started collection worker for: {}", path.display());
        }
        Ok(sender)
    }

    /// Number of running workers
    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.values().filter(|w| w.is_alive()).count()
    }

    /// Stop accepting work, let every worker drain its queue, and close all collections.
    pub async fn shutdown(&self) {
        let workers: Vec<(PathBuf, WorkerHandle)> = {
            let mut workers = self.workers.write().await;
            self.shut_down.store(true, Ordering::Release);
            workers.drain().collect()
        };

        for (path, worker) in workers {
            drop(worker.sender);
            if let Err(e) = worker.task.await {
                error!("Collection worker for {} failed: {}", path.display(), e);
            }
        }
        info!("All collection workers stopped");
    }
}

/// Owns one collection and processes its jobs strictly in order.
struct CollectionWorker {
    path: PathBuf,
    receiver: mpsc::Receiver<Job>,
    idle_timeout: Option<Duration>,
    collection: Option<Collection>,
}

impl CollectionWorker {
    async fn run(mut self) {
        loop {
            let next = match self.idle_timeout {
                Some(idle) => tokio::time::timeout(idle, self.receiver.recv()).await,
                None => Ok(self.receiver.recv().await),
            };
            match next {
                Ok(Some(job)) => self.handle(job).await,
                Ok(None) => break,
                Err(_) => {
                    debug!("Collection {} idle, stopping worker", self.path.display());
                    // Refuse new sends, then finish whatever was queued before the close
                    self.receiver.close();
                    while let Some(job) = self.receiver.recv().await {
                        self.handle(job).await;
                    }
                    break;
                }
            }
        }

        if let Some(collection) = self.collection.take() {
            if let Err(e) = collection.close().await {
                warn!("Failed to close collection {}: {}", self.path.display(), e);
            }
        }
    }

    async fn handle(&mut self, job: Job) {
        let Job {
            operation,
            data,
            ids,
            respond_to,
        } = job;

        let result = self.process(operation, data, ids).await;
        if let Err(e) = &result {
            warn!("Operation on {} failed: {}", self.path.display(), e);
        }
        if respond_to.send(result).is_err() {
            debug!("Caller for {} went away before the result", self.path.display());
        }
    }

    async fn process(
        &mut self,
        operation: Invocable,
        data: RequestData,
        ids: Vec<String>,
    ) -> Result<OperationOutput, ExecutorError> {
        let collection = self.open().await?;

        match AssertUnwindSafe(operation(collection, data, ids))
            .catch_unwind()
            .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                // The store may be mid-transaction; reopen it for the next job
                error!("Operation on {} panicked", self.path.display());
                self.collection = None;
                Err(ExecutorError::Panicked)
            }
        }
    }

    /// The open collection, opening it first if needed. A failed open is retried on the next job.
    async fn open(&mut self) -> Result<&mut Collection, ExecutorError> {
        let collection = match self.collection.take() {
            Some(collection) => collection,
            None => Collection::open(&self.path)
                .await
                .map_err(|source| ExecutorError::Open {
                    path: self.path.clone(),
                    source,
                })?,
        };
        Ok(self.collection.insert(collection))
    }
}

use crate::error::{Result, ShortenerError};
use parking_lot::Mutex;
use snip_core::{normalize_user, Repository, ShortKey};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of requests buffered before `enqueue` applies backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A batch of keys to soft-delete on behalf of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// `None` deletes regardless of owner.
    pub user_id: Option<String>,
    pub keys: Vec<ShortKey>,
}

/// Single-consumer soft-delete pipeline.
///
/// Requests are applied by one background task, in submission order, one
/// request fully applied before the next starts. Callers are acknowledged
/// as soon as the request is queued. Failures from the repository are
/// logged and dropped; nothing is retried.
pub struct DeleteQueue {
    sender: mpsc::Sender<DeleteRequest>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DeleteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeleteQueue")
            .field("capacity", &self.sender.max_capacity())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl DeleteQueue {
    /// Starts the worker task. Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn spawn<R>(repository: Arc<R>, capacity: usize) -> Self
    where
        R: Repository + ?Sized,
    {
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = tokio::spawn(run(repository, receiver, shutdown_rx));

        Self {
            sender,
            shutdown: Mutex::new(Some(shutdown_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queues a request, waiting for room when the queue is full.
    pub async fn enqueue(&self, user_id: Option<String>, keys: Vec<ShortKey>) -> Result<()> {
        let Some(request) = request(user_id, keys) else {
            return Ok(());
        };
        self.sender
            .send(request)
            .await
            .map_err(|_| ShortenerError::QueueClosed)
    }

    /// Queues a request, failing with [`ShortenerError::QueueFull`] instead
    /// of waiting.
    pub fn try_enqueue(&self, user_id: Option<String>, keys: Vec<ShortKey>) -> Result<()> {
        let Some(request) = request(user_id, keys) else {
            return Ok(());
        };
        self.sender.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => ShortenerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ShortenerError::QueueClosed,
        })
    }

    /// Stops accepting requests and waits until every queued request has
    /// been applied. Later calls return immediately.
    pub async fn shutdown(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(error = %err, "delete worker terminated abnormally");
            }
        }
    }
}

fn request(user_id: Option<String>, keys: Vec<ShortKey>) -> Option<DeleteRequest> {
    if keys.is_empty() {
        return None;
    }
    Some(DeleteRequest {
        user_id: normalize_user(user_id),
        keys,
    })
}

async fn run<R>(
    repository: Arc<R>,
    mut receiver: mpsc::Receiver<DeleteRequest>,
    mut shutdown: oneshot::Receiver<()>,
) where
    R: Repository + ?Sized,
{
    debug!("delete worker started");

    loop {
        tokio::select! {
            biased;
            request = receiver.recv() => match request {
                Some(request) => apply(repository.as_ref(), request).await,
                None => break,
            },
            _ = &mut shutdown => {
                receiver.close();
                break;
            }
        }
    }

    let mut drained = 0usize;
    while let Some(request) = receiver.recv().await {
        apply(repository.as_ref(), request).await;
        drained += 1;
    }

    info!(drained, "delete worker stopped");
}

async fn apply<R>(repository: &R, request: DeleteRequest)
where
    R: Repository + ?Sized,
{
    let user_id = request.user_id.as_deref();

    match repository.delete_urls(user_id, &request.keys).await {
        Ok(()) => debug!(user_id, keys = request.keys.len(), "applied delete request"),
        Err(err) => warn!(
            user_id,
            keys = request.keys.len(),
            error = %err,
            "delete request failed, dropping it"
        ),
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::upload::{
    HttpRequest,
    Result,
    TaskCompletion,
    TaskId,
    TaskProgress,
    TaskResponse,
    TaskTag,
    Transport,
    UploadError,
};
use super::progress_stream::{ProgressStream, ProgressTracker};

const UPLOAD_CHUNK_CAPACITY: usize = 64 * 1024;

struct Subscription {
    completion_tx: mpsc::UnboundedSender<TaskCompletion>,
    shutdown: CancellationToken,
}

struct TaskHandle {
    tag: TaskTag,
    cancellation_token: CancellationToken,
}

/// Transport over reqwest. Tasks register synchronously and execute on
/// spawned workers gated by a semaphore, so excess submissions queue instead
/// of transferring all at once. Each task carries a child cancellation token;
/// completions are delivered exactly once and dropped after shutdown.
pub struct HttpTransport {
    client: Client,
    semaphore: Arc<Semaphore>,
    progress_interval: Duration,
    next_task_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TaskId, TaskHandle>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl HttpTransport {
    pub fn new(max_concurrent: usize, progress_interval: Duration) -> Self {
        Self {
            client: Client::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            progress_interval,
            next_task_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            subscription: Mutex::new(None),
        }
    }

    fn lock_tasks(tasks: &Mutex<HashMap<TaskId, TaskHandle>>) -> MutexGuard<'_, HashMap<TaskId, TaskHandle>> {
        tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscription(&self) -> Result<(mpsc::UnboundedSender<TaskCompletion>, CancellationToken)> {
        let guard = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match guard.as_ref() {
            Some(subscription) => Ok((
                subscription.completion_tx.clone(),
                subscription.shutdown.clone(),
            )),
            None => Err(UploadError::internal_error(
                "Transport has no completion subscriber",
            )),
        }
    }

    fn register_task(&self, tag: TaskTag, shutdown: &CancellationToken) -> (TaskId, CancellationToken) {
        let task_id = TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let token = shutdown.child_token();

        Self::lock_tasks(&self.tasks).insert(task_id, TaskHandle {
            tag,
            cancellation_token: token.clone(),
        });

        (task_id, token)
    }

    async fn execute_download(
        client: Client,
        semaphore: Arc<Semaphore>,
        request: HttpRequest,
        destination: PathBuf,
    ) -> Result<TaskResponse> {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| UploadError::internal_error("Transport closed"))?;

        let mut builder = client.request(request.method, request.url).headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let mut file = tokio::fs::File::create(&destination).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(TaskResponse {
            status,
            body: Some(destination),
        })
    }

    async fn execute_upload(
        client: Client,
        semaphore: Arc<Semaphore>,
        request: HttpRequest,
        source: PathBuf,
        task_id: TaskId,
        progress_interval: Duration,
        progress_tx: mpsc::UnboundedSender<TaskProgress>,
    ) -> Result<TaskResponse> {
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| UploadError::internal_error("Transport closed"))?;

        let file = tokio::fs::File::open(&source).await?;
        let total_bytes = file.metadata().await?.len();

        let tracker = ProgressTracker::new(task_id, total_bytes, progress_interval, progress_tx);
        let stream = ProgressStream::new(
            ReaderStream::with_capacity(file, UPLOAD_CHUNK_CAPACITY),
            tracker,
        );

        let response = client
            .request(request.method, request.url)
            .headers(request.headers)
            .header(CONTENT_LENGTH, total_bytes)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;

        Ok(TaskResponse {
            status: response.status().as_u16(),
            body: None,
        })
    }

    fn finish_task(
        tasks: &Mutex<HashMap<TaskId, TaskHandle>>,
        completion: TaskCompletion,
        completion_tx: &mpsc::UnboundedSender<TaskCompletion>,
        shutdown: &CancellationToken,
    ) {
        Self::lock_tasks(tasks).remove(&completion.task_id);

        if shutdown.is_cancelled() {
            debug!(task_id = %completion.task_id, "Dropping completion after shutdown");
            return;
        }
        let _ = completion_tx.send(completion);
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn subscribe(&self, completions: mpsc::UnboundedSender<TaskCompletion>, shutdown: CancellationToken) {
        let mut guard = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        *guard = Some(Subscription {
            completion_tx: completions,
            shutdown,
        });
    }

    fn submit_download(&self, request: HttpRequest, tag: TaskTag, destination: PathBuf) -> Result<TaskId> {
        let (completion_tx, shutdown) = self.subscription()?;
        let (task_id, token) = self.register_task(tag, &shutdown);

        let client = self.client.clone();
        let semaphore = self.semaphore.clone();
        let tasks = self.tasks.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(UploadError::Cancelled),
                result = Self::execute_download(client, semaphore, request, destination) => result,
            };

            Self::finish_task(&tasks, TaskCompletion { task_id, tag, result }, &completion_tx, &shutdown);
        });

        Ok(task_id)
    }

    fn submit_upload(
        &self,
        request: HttpRequest,
        tag: TaskTag,
        source: PathBuf,
        progress: mpsc::UnboundedSender<TaskProgress>,
    ) -> Result<TaskId> {
        let (completion_tx, shutdown) = self.subscription()?;
        let (task_id, token) = self.register_task(tag, &shutdown);

        let client = self.client.clone();
        let semaphore = self.semaphore.clone();
        let tasks = self.tasks.clone();
        let progress_interval = self.progress_interval;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => Err(UploadError::Cancelled),
                result = Self::execute_upload(
                    client,
                    semaphore,
                    request,
                    source,
                    task_id,
                    progress_interval,
                    progress,
                ) => result,
            };

            Self::finish_task(&tasks, TaskCompletion { task_id, tag, result }, &completion_tx, &shutdown);
        });

        Ok(task_id)
    }

    fn cancel(&self, task_id: TaskId) {
        if let Some(handle) = Self::lock_tasks(&self.tasks).get(&task_id) {
            handle.cancellation_token.cancel();
        }
    }

    async fn known_tasks(&self) -> Vec<(TaskId, TaskTag)> {
        Self::lock_tasks(&self.tasks)
            .iter()
            .map(|(task_id, handle)| (*task_id, handle.tag))
            .collect()
    }
}

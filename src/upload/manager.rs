use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use crate::api::{ApiRequestBuilder, ApiResponseParser};
use crate::transport::HttpTransport;
use super::descriptor::UploadDescriptor;
use super::errors::{Result, UploadError};
use super::manager_worker::UploadManagerWorker;
use super::session::UploadSession;
use super::store::{DescriptorStore, JsonFileStore};
use super::traits::{AuthTokenSource, RequestBuilder, ResponseParser, Transport};
use super::types::{
    DescriptorId,
    ManagerCommand,
    ManagerConfig,
    ResumeReport,
    UploadEvent,
    VideoSettings,
};

/// Public handle of the upload engine. Cheap to clone; all state lives in the
/// spawned worker.
#[derive(Clone)]
pub struct UploadManager {
    command_tx: mpsc::Sender<ManagerCommand>,
    event_tx: broadcast::Sender<UploadEvent>,
}

/// Manager plus its worker task.
pub struct UploadManagerHandle {
    pub manager: UploadManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadManagerHandle {
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| UploadError::internal_error(format!("Worker panic: {}", err)))
    }
}

impl UploadManager {
    pub fn new(
        session: UploadSession,
        config: ManagerConfig,
        store: Arc<dyn DescriptorStore>,
    ) -> UploadManagerHandle {
        let (command_tx, command_rx) = mpsc::channel(100);
        // up to 256 buffered events per subscriber
        let (event_tx, _) = broadcast::channel(256);

        let worker_handle = tokio::spawn(UploadManagerWorker::run(
            session,
            config,
            store,
            command_rx,
            event_tx.clone(),
        ));

        let manager = Self {
            command_tx,
            event_tx,
        };

        UploadManagerHandle {
            manager,
            worker_handle,
        }
    }

    pub fn builder() -> UploadManagerBuilder {
        UploadManagerBuilder::new()
    }

    /// Starts a new upload. Returns once the descriptor is persisted and the
    /// CreateVideo task is with the transport; the descriptor is then in
    /// CreatingVideo. Fails without side effects if `source` is unreadable or
    /// the first request cannot be constructed.
    pub async fn start_upload(
        &self,
        source: PathBuf,
        settings: Option<VideoSettings>,
    ) -> Result<DescriptorId> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::StartUpload {
                source,
                settings,
                reply: reply_tx,
            })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)?
    }

    /// Cancels an upload: the in-flight task is cancelled at the transport,
    /// the descriptor ends Failed(Cancelled) and leaves the store. Idempotent
    /// for terminal or unknown descriptors.
    pub async fn cancel_upload(&self, id: DescriptorId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::CancelUpload { id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)?
    }

    /// Re-submits the step a failed upload stopped at, up to the configured
    /// per-step retry cap. Retries are always caller-initiated.
    pub async fn retry_upload(&self, id: DescriptorId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::RetryUpload { id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)?
    }

    /// Matches persisted descriptors against the tasks the transport still
    /// knows about, reattaching those found and marking the rest
    /// Failed(Indeterminate). Blocks on enumeration only.
    pub async fn resume_after_relaunch(&self) -> Result<ResumeReport> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::ResumeAfterRelaunch { reply: reply_tx })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)?
    }

    pub async fn get_descriptor(&self, id: DescriptorId) -> Result<Option<UploadDescriptor>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::GetDescriptor { id, reply: reply_tx })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)
    }

    pub async fn get_descriptors(&self) -> Result<Vec<UploadDescriptor>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(ManagerCommand::GetAllDescriptors { reply: reply_tx })
            .await
            .map_err(|_| UploadError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| UploadError::ManagerShutdown)
    }

    /// Subscribe to all upload events.
    ///
    /// Slow subscribers can lag and lose events; each subscriber gets its own
    /// copy of the stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_filtered<F>(&self, filter: F) -> FilteredEventReceiver<F>
    where
        F: Fn(&UploadEvent) -> bool,
    {
        FilteredEventReceiver {
            receiver: self.event_tx.subscribe(),
            filter,
        }
    }

    /// Every event concerning one descriptor.
    pub fn subscribe_descriptor(
        &self,
        id: DescriptorId,
    ) -> FilteredEventReceiver<impl Fn(&UploadEvent) -> bool + use<>> {
        self.subscribe_filtered(move |event| event.descriptor_id() == id)
    }

    /// Byte progress of one descriptor's UploadVideo step.
    pub fn subscribe_progress(
        &self,
        id: DescriptorId,
    ) -> FilteredEventReceiver<impl Fn(&UploadEvent) -> bool + use<>> {
        self.subscribe_filtered(move |event| {
            matches!(event, UploadEvent::Progress { id: event_id, .. } if *event_id == id)
        })
    }
}

/// Event receiver that skips everything its filter rejects.
pub struct FilteredEventReceiver<F> {
    receiver: broadcast::Receiver<UploadEvent>,
    filter: F,
}

impl<F> FilteredEventReceiver<F>
where
    F: Fn(&UploadEvent) -> bool,
{
    pub async fn recv(&mut self) -> Result<UploadEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if (self.filter)(&event) {
                return Ok(event);
            }
        }
    }
}

/// Wires the manager up with concrete defaults: `HttpTransport`,
/// `ApiRequestBuilder` against the configured endpoint and token source,
/// `ApiResponseParser`, and a `JsonFileStore` under the scratch directory.
/// Every collaborator can be swapped for an injected one.
pub struct UploadManagerBuilder {
    config: ManagerConfig,
    endpoint: Option<String>,
    token_source: Option<Arc<dyn AuthTokenSource>>,
    transport: Option<Arc<dyn Transport>>,
    request_builder: Option<Arc<dyn RequestBuilder>>,
    response_parser: Option<Arc<dyn ResponseParser>>,
    store: Option<Arc<dyn DescriptorStore>>,
}

impl UploadManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: ManagerConfig::default(),
            endpoint: None,
            token_source: None,
            transport: None,
            request_builder: None,
            response_parser: None,
            store: None,
        }
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn token_source(mut self, token_source: Arc<dyn AuthTokenSource>) -> Self {
        self.token_source = Some(token_source);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn request_builder(mut self, request_builder: Arc<dyn RequestBuilder>) -> Self {
        self.request_builder = Some(request_builder);
        self
    }

    pub fn response_parser(mut self, response_parser: Arc<dyn ResponseParser>) -> Self {
        self.response_parser = Some(response_parser);
        self
    }

    pub fn store(mut self, store: Arc<dyn DescriptorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<UploadManagerHandle> {
        let config = self.config;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.max_concurrent, config.progress_interval)),
        };

        let request_builder: Arc<dyn RequestBuilder> = match self.request_builder {
            Some(request_builder) => request_builder,
            None => {
                let endpoint = self.endpoint.ok_or_else(|| {
                    UploadError::ParamError("An endpoint or a request builder is required".to_string())
                })?;
                let token_source = self.token_source.ok_or(UploadError::MissingToken)?;
                Arc::new(ApiRequestBuilder::new(&endpoint, token_source)?)
            }
        };

        let response_parser: Arc<dyn ResponseParser> = match self.response_parser {
            Some(response_parser) => response_parser,
            None => Arc::new(ApiResponseParser::new()),
        };

        let store: Arc<dyn DescriptorStore> = match self.store {
            Some(store) => store,
            None => Arc::new(JsonFileStore::new(config.scratch_dir.join("uplink-descriptors.json"))),
        };

        let session = UploadSession::new(
            transport,
            request_builder,
            response_parser,
            config.scratch_dir.clone(),
        );

        Ok(UploadManager::new(session, config, store))
    }
}

impl Default for UploadManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use super::descriptor::{UploadDescriptor, UploadStep};
use super::errors::{FailureKind, Result, StepFailure, UploadError};
use super::session::UploadSession;
use super::store::DescriptorStore;
use super::tag::TaskTag;
use super::types::{
    DescriptorId,
    ManagerCommand,
    ManagerConfig,
    ResumeReport,
    TaskCompletion,
    TaskId,
    TaskProgress,
    TaskRef,
    UploadEvent,
    UploadProgress,
    VideoSettings,
};

/// In-memory association between a live task and the descriptor that issued
/// it. Rebuilt from persisted task refs on relaunch.
#[derive(Debug, Clone, Copy)]
struct TaskRecord {
    descriptor_id: DescriptorId,
    tag: TaskTag,
}

/// The actor owning all mutable upload state. Every descriptor mutation runs
/// on this loop, so a task completion and a concurrent cancel cannot race on
/// the same descriptor; the network tasks themselves run concurrently on the
/// transport.
pub struct UploadManagerWorker {
    session: UploadSession,
    config: ManagerConfig,
    store: Arc<dyn DescriptorStore>,
    descriptors: HashMap<DescriptorId, UploadDescriptor>,
    task_records: HashMap<TaskId, TaskRecord>,
    event_tx: broadcast::Sender<UploadEvent>,
    progress_tx: mpsc::UnboundedSender<TaskProgress>,
    shutdown: CancellationToken,
}

impl UploadManagerWorker {
    pub(crate) async fn run(
        session: UploadSession,
        config: ManagerConfig,
        store: Arc<dyn DescriptorStore>,
        mut command_rx: mpsc::Receiver<ManagerCommand>,
        event_tx: broadcast::Sender<UploadEvent>,
    ) {
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        session.transport().subscribe(completion_tx, shutdown.clone());

        let mut worker = Self {
            session,
            config,
            store,
            descriptors: HashMap::new(),
            task_records: HashMap::new(),
            event_tx,
            progress_tx,
            shutdown,
        };

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => worker.handle_command(command).await,
                    // all manager handles dropped
                    None => break,
                },
                Some(completion) = completion_rx.recv() => {
                    worker.handle_task_completion(completion).await;
                }
                Some(progress) = progress_rx.recv() => {
                    worker.forward_progress(progress);
                }
            }
        }

        worker.shutdown.cancel();
    }

    async fn handle_command(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::StartUpload { source, settings, reply } => {
                let result = self.start_upload(source, settings).await;
                let _ = reply.send(result);
            }
            ManagerCommand::CancelUpload { id, reply } => {
                let result = self.cancel_upload(id).await;
                let _ = reply.send(result);
            }
            ManagerCommand::RetryUpload { id, reply } => {
                let result = self.retry_upload(id).await;
                let _ = reply.send(result);
            }
            ManagerCommand::ResumeAfterRelaunch { reply } => {
                let result = self.resume_after_relaunch().await;
                let _ = reply.send(result);
            }
            ManagerCommand::GetDescriptor { id, reply } => {
                let descriptor = self.descriptors.get(&id).cloned();
                let _ = reply.send(descriptor);
            }
            ManagerCommand::GetAllDescriptors { reply } => {
                let descriptors: Vec<_> = self.descriptors.values().cloned().collect();
                let _ = reply.send(descriptors);
            }
        }
    }

    async fn start_upload(
        &mut self,
        source: PathBuf,
        settings: Option<VideoSettings>,
    ) -> Result<DescriptorId> {
        let metadata = tokio::fs::metadata(&source).await.map_err(|err| {
            UploadError::ParamError(format!("Source {} is not readable: {}", source.display(), err))
        })?;
        if !metadata.is_file() {
            return Err(UploadError::ParamError(format!(
                "Source {} is not a file",
                source.display()
            )));
        }

        let mut descriptor = UploadDescriptor::new(source, metadata.len(), settings);
        let id = descriptor.id;
        descriptor.begin();
        self.descriptors.insert(id, descriptor);

        // request construction failed before any task went out; forget the
        // descriptor entirely
        if let Err(err) = self.submit_step(id) {
            self.descriptors.remove(&id);
            return Err(err);
        }

        if let Err(err) = self.persist(id).await {
            // roll the submission back rather than leave an untracked task
            if let Some(descriptor) = self.descriptors.remove(&id) {
                if let Some(task) = descriptor.current_task {
                    self.session.transport().cancel(task.id);
                    self.task_records.remove(&task.id);
                }
            }
            return Err(err);
        }

        self.emit(UploadEvent::DescriptorAdded { id });
        self.emit(UploadEvent::StateChanged {
            id,
            from: UploadStep::Created,
            to: UploadStep::CreatingVideo,
        });

        Ok(id)
    }

    async fn cancel_upload(&mut self, id: DescriptorId) -> Result<()> {
        let Some(descriptor) = self.descriptors.get_mut(&id) else {
            // not driven by this manager; drop any persisted leftovers
            return self.store.delete(id).await;
        };
        if descriptor.is_terminal() {
            return Ok(());
        }

        let from = descriptor.step;
        let task = descriptor.current_task;
        let failure = StepFailure {
            step: from.tag(),
            kind: FailureKind::Cancelled,
            message: UploadError::Cancelled.to_string(),
        };
        descriptor.fail(failure.clone());

        if let Some(task) = task {
            self.session.transport().cancel(task.id);
            self.task_records.remove(&task.id);
        }

        self.emit(UploadEvent::StateChanged { id, from, to: UploadStep::Failed });
        self.store.delete(id).await?;
        self.emit(UploadEvent::Failed { id, failure });

        Ok(())
    }

    async fn retry_upload(&mut self, id: DescriptorId) -> Result<()> {
        if !self.descriptors.contains_key(&id) {
            match self.store.load(id).await? {
                Some(descriptor) => {
                    self.descriptors.insert(id, descriptor);
                }
                None => {
                    return Err(UploadError::ParamError(format!("Unknown descriptor {}", id)));
                }
            }
        }

        let (from, tag) = {
            let Some(descriptor) = self.descriptors.get_mut(&id) else {
                return Err(UploadError::ParamError(format!("Unknown descriptor {}", id)));
            };

            if let Some(tag) = descriptor.last_error.as_ref().and_then(|failure| failure.step) {
                if descriptor.retry_count(tag) >= self.config.max_step_retries {
                    return Err(UploadError::RetryLimit(tag));
                }
            }

            let from = descriptor.step;
            let tag = descriptor.begin_retry()?;
            (from, tag)
        };

        self.emit(UploadEvent::StateChanged { id, from, to: tag.step() });

        if let Err(err) = self.submit_step(id) {
            self.fail_with(id, StepFailure {
                step: Some(tag),
                kind: err.kind(),
                message: err.to_string(),
            })
            .await;
            return Err(err);
        }

        self.persist(id).await
    }

    /// Rebuilds the task registry from persisted descriptors. Descriptors
    /// whose task the transport no longer knows are marked
    /// Failed(Indeterminate) and surfaced, never silently dropped: the task
    /// may or may not have run to completion remotely, and only the caller
    /// can find out.
    async fn resume_after_relaunch(&mut self) -> Result<ResumeReport> {
        let persisted = self.store.load_all().await?;
        let known: HashMap<TaskId, TaskTag> = self
            .session
            .transport()
            .known_tasks()
            .await
            .into_iter()
            .collect();

        let mut report = ResumeReport::default();
        for mut descriptor in persisted {
            let id = descriptor.id;
            // already driven by this manager instance
            if self.descriptors.contains_key(&id) {
                continue;
            }
            if descriptor.is_terminal() {
                self.descriptors.insert(id, descriptor);
                continue;
            }

            match descriptor.current_task {
                Some(task) if known.get(&task.id) == Some(&task.tag) => {
                    self.task_records.insert(task.id, TaskRecord { descriptor_id: id, tag: task.tag });
                    self.descriptors.insert(id, descriptor);
                    report.reattached.push(id);
                }
                task => {
                    let from = descriptor.step;
                    let failure = StepFailure {
                        step: task.map(|task| task.tag).or_else(|| from.tag()),
                        kind: FailureKind::Indeterminate,
                        message: UploadError::Indeterminate.to_string(),
                    };
                    descriptor.fail(failure.clone());
                    self.store.save(&descriptor).await?;
                    self.descriptors.insert(id, descriptor);

                    self.emit(UploadEvent::StateChanged { id, from, to: UploadStep::Failed });
                    self.emit(UploadEvent::Failed { id, failure });
                    report.indeterminate.push(id);
                }
            }
        }

        Ok(report)
    }

    /// Submits the task for the descriptor's current step and registers it.
    /// A descriptor never has two tasks in flight.
    fn submit_step(&mut self, id: DescriptorId) -> Result<()> {
        let Some(descriptor) = self.descriptors.get(&id) else {
            return Err(UploadError::internal_error(format!("Unknown descriptor {}", id)));
        };
        if descriptor.current_task.is_some() {
            return Err(UploadError::internal_error(format!(
                "Descriptor {} already has a task in flight",
                id
            )));
        }
        let tag = descriptor.step.tag().ok_or_else(|| {
            UploadError::internal_error(format!("No task to submit in step {:?}", descriptor.step))
        })?;

        let task_id = match tag {
            TaskTag::CreateVideo => self.session.submit_create_video(id, &descriptor.source)?,
            TaskTag::UploadVideo => {
                let upload_uri = descriptor.upload_uri.as_deref().ok_or_else(|| {
                    UploadError::ParamError("Upload URI missing from descriptor".to_string())
                })?;
                self.session
                    .submit_upload_video(&descriptor.source, upload_uri, self.progress_tx.clone())?
            }
            TaskTag::ActivateVideo => {
                let activation_uri = descriptor.activation_uri.as_deref().ok_or_else(|| {
                    UploadError::ParamError("Activation URI missing from descriptor".to_string())
                })?;
                self.session.submit_activate_video(id, activation_uri)?
            }
            TaskTag::VideoSettings => {
                let video_uri = descriptor.video_uri.as_deref().ok_or_else(|| {
                    UploadError::ParamError("Video URI missing from descriptor".to_string())
                })?;
                let settings = descriptor.settings.as_ref().ok_or_else(|| {
                    UploadError::ParamError("No settings were supplied".to_string())
                })?;
                self.session.submit_video_settings(id, video_uri, settings)?
            }
        };

        if let Some(descriptor) = self.descriptors.get_mut(&id) {
            descriptor.current_task = Some(TaskRef { id: task_id, tag });
        }
        self.task_records.insert(task_id, TaskRecord { descriptor_id: id, tag });

        Ok(())
    }

    async fn handle_task_completion(&mut self, completion: TaskCompletion) {
        let Some(record) = self.task_records.remove(&completion.task_id) else {
            // cancelled, or the callback outlived the registry entry
            debug!(
                task_id = %completion.task_id,
                tag = %completion.tag,
                "Dropping completion for unregistered task"
            );
            return;
        };

        let id = record.descriptor_id;
        let outcome = match completion.result {
            Ok(response) => self.session.parse_completion(record.tag, &response),
            Err(err) => Err(err),
        };

        let advanced = {
            let Some(descriptor) = self.descriptors.get_mut(&id) else {
                return;
            };
            if descriptor.is_terminal() {
                return;
            }
            descriptor.current_task = None;

            match outcome {
                Ok(output) => {
                    let from = descriptor.step;
                    descriptor
                        .advance(record.tag, output)
                        .map(|_| (from, descriptor.step))
                }
                Err(err) => Err(err),
            }
        };

        match advanced {
            Ok((from, to)) => {
                self.emit(UploadEvent::StateChanged { id, from, to });

                if to == UploadStep::Complete {
                    self.finish_descriptor(id).await;
                } else {
                    // the completed step's outcome is durable before the next
                    // step's task goes out
                    if let Err(err) = self.persist(id).await {
                        warn!(descriptor = %id, "Failed to persist descriptor: {}", err);
                    }
                    if let Err(err) = self.submit_step(id) {
                        let step = self.descriptors.get(&id).and_then(|d| d.step.tag());
                        self.fail_with(id, StepFailure {
                            step,
                            kind: err.kind(),
                            message: err.to_string(),
                        })
                        .await;
                        return;
                    }
                    // and the new task ref right after, for relaunch matching
                    if let Err(err) = self.persist(id).await {
                        warn!(descriptor = %id, "Failed to persist descriptor: {}", err);
                    }
                }
            }
            Err(err) => {
                self.fail_with(id, StepFailure {
                    step: Some(record.tag),
                    kind: err.kind(),
                    message: err.to_string(),
                })
                .await;
            }
        }
    }

    /// The upload reached Complete: the descriptor leaves the store, the
    /// in-memory copy stays for queries.
    async fn finish_descriptor(&mut self, id: DescriptorId) {
        let video_uri = self
            .descriptors
            .get(&id)
            .and_then(|descriptor| descriptor.video_uri.clone())
            .unwrap_or_default();

        if let Err(err) = self.store.delete(id).await {
            warn!(descriptor = %id, "Failed to remove completed descriptor: {}", err);
        }

        self.emit(UploadEvent::Completed { id, video_uri });
    }

    async fn fail_with(&mut self, id: DescriptorId, failure: StepFailure) {
        let from = {
            let Some(descriptor) = self.descriptors.get_mut(&id) else {
                return;
            };
            let from = descriptor.step;
            descriptor.fail(failure.clone());
            from
        };

        self.emit(UploadEvent::StateChanged { id, from, to: UploadStep::Failed });
        if let Err(err) = self.persist(id).await {
            warn!(descriptor = %id, "Failed to persist failed descriptor: {}", err);
        }
        self.emit(UploadEvent::Failed { id, failure });
    }

    /// Progress is advisory: forwarded to subscribers, never a state change.
    fn forward_progress(&self, progress: TaskProgress) {
        if let Some(record) = self.task_records.get(&progress.task_id) {
            self.emit(UploadEvent::Progress {
                id: record.descriptor_id,
                progress: UploadProgress::from_task(progress),
            });
        }
    }

    async fn persist(&self, id: DescriptorId) -> Result<()> {
        match self.descriptors.get(&id) {
            Some(descriptor) => self.store.save(descriptor).await,
            None => Ok(()),
        }
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.event_tx.send(event);
    }
}

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use super::errors::Result;
use super::tag::TaskTag;
use super::types::{
    CreateVideoPayload,
    HttpRequest,
    TaskCompletion,
    TaskId,
    TaskProgress,
    TaskResponse,
    VideoSettings,
};

/// Executes tagged network tasks on background workers.
///
/// Task submission is synchronous; execution is not. The transport delivers a
/// `TaskCompletion` exactly once per submitted task on the subscribed channel,
/// best-effort across process relaunch. Completions arriving after the
/// subscription's shutdown token is cancelled are dropped.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registers the completion channel and its liveness token. Must be
    /// called before the first submission.
    fn subscribe(&self, completions: mpsc::UnboundedSender<TaskCompletion>, shutdown: CancellationToken);

    /// Submits a download-style task; the response body is written to
    /// `destination` before the completion is delivered.
    fn submit_download(&self, request: HttpRequest, tag: TaskTag, destination: PathBuf) -> Result<TaskId>;

    /// Submits an upload-style task streaming its body from `source`,
    /// reporting byte counts on `progress`. No response body is persisted.
    fn submit_upload(
        &self,
        request: HttpRequest,
        tag: TaskTag,
        source: PathBuf,
        progress: mpsc::UnboundedSender<TaskProgress>,
    ) -> Result<TaskId>;

    /// Cancels a live task. Unknown ids are ignored.
    fn cancel(&self, task_id: TaskId);

    /// Tasks the transport still knows about, for relaunch reconciliation.
    async fn known_tasks(&self) -> Vec<(TaskId, TaskTag)>;
}

/// Builds one well-formed request per upload step.
pub trait RequestBuilder: Send + Sync {
    fn create_video_request(&self, source: &Path) -> Result<HttpRequest>;

    fn upload_video_request(&self, source: &Path, upload_uri: &str) -> Result<HttpRequest>;

    fn activate_video_request(&self, activation_uri: &str) -> Result<HttpRequest>;

    fn video_settings_request(&self, video_uri: &str, settings: &VideoSettings) -> Result<HttpRequest>;
}

/// Interprets one raw response per upload step into its typed payload.
pub trait ResponseParser: Send + Sync {
    fn parse_create_video(&self, response: &TaskResponse) -> Result<CreateVideoPayload>;

    fn parse_upload_video(&self, response: &TaskResponse) -> Result<()>;

    fn parse_activate_video(&self, response: &TaskResponse) -> Result<()>;

    fn parse_video_settings(&self, response: &TaskResponse) -> Result<()>;
}

/// Supplies the bearer token requests are authorized with.
pub trait AuthTokenSource: Send + Sync {
    /// Fails if no token is configured.
    fn token(&self) -> Result<String>;
}

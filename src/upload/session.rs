use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use super::errors::Result;
use super::tag::TaskTag;
use super::traits::{RequestBuilder, ResponseParser, Transport};
use super::types::{DescriptorId, StepOutput, TaskId, TaskProgress, TaskResponse, VideoSettings};

/// Turns each upload step into a tagged network task: builds the request via
/// the injected `RequestBuilder`, hands it to the transport, and routes
/// completions to the `ResponseParser` operation matching the task's tag.
///
/// Download-style steps (everything but UploadVideo) land their response body
/// in the scratch directory before parsing.
#[derive(Clone)]
pub struct UploadSession {
    transport: Arc<dyn Transport>,
    request_builder: Arc<dyn RequestBuilder>,
    response_parser: Arc<dyn ResponseParser>,
    scratch_dir: PathBuf,
}

impl UploadSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        request_builder: Arc<dyn RequestBuilder>,
        response_parser: Arc<dyn ResponseParser>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            transport,
            request_builder,
            response_parser,
            scratch_dir,
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn scratch_destination(&self, id: DescriptorId, tag: TaskTag) -> PathBuf {
        self.scratch_dir.join(format!("{}-{}.json", id, tag))
    }

    pub fn submit_create_video(&self, id: DescriptorId, source: &Path) -> Result<TaskId> {
        let request = self.request_builder.create_video_request(source)?;
        let destination = self.scratch_destination(id, TaskTag::CreateVideo);

        self.transport.submit_download(request, TaskTag::CreateVideo, destination)
    }

    pub fn submit_upload_video(
        &self,
        source: &Path,
        upload_uri: &str,
        progress: mpsc::UnboundedSender<TaskProgress>,
    ) -> Result<TaskId> {
        let request = self.request_builder.upload_video_request(source, upload_uri)?;

        self.transport
            .submit_upload(request, TaskTag::UploadVideo, source.to_path_buf(), progress)
    }

    pub fn submit_activate_video(&self, id: DescriptorId, activation_uri: &str) -> Result<TaskId> {
        let request = self.request_builder.activate_video_request(activation_uri)?;
        let destination = self.scratch_destination(id, TaskTag::ActivateVideo);

        self.transport.submit_download(request, TaskTag::ActivateVideo, destination)
    }

    pub fn submit_video_settings(
        &self,
        id: DescriptorId,
        video_uri: &str,
        settings: &VideoSettings,
    ) -> Result<TaskId> {
        let request = self.request_builder.video_settings_request(video_uri, settings)?;
        let destination = self.scratch_destination(id, TaskTag::VideoSettings);

        self.transport.submit_download(request, TaskTag::VideoSettings, destination)
    }

    /// Tag dispatch for completed tasks. Exhaustive: a new step does not
    /// compile until it routes somewhere.
    pub fn parse_completion(&self, tag: TaskTag, response: &TaskResponse) -> Result<StepOutput> {
        match tag {
            TaskTag::CreateVideo => self
                .response_parser
                .parse_create_video(response)
                .map(StepOutput::Created),
            TaskTag::UploadVideo => self
                .response_parser
                .parse_upload_video(response)
                .map(|_| StepOutput::Done),
            TaskTag::ActivateVideo => self
                .response_parser
                .parse_activate_video(response)
                .map(|_| StepOutput::Done),
            TaskTag::VideoSettings => self
                .response_parser
                .parse_video_settings(response)
                .map(|_| StepOutput::Done),
        }
    }
}

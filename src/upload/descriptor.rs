use std::collections::HashMap;
use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::errors::{Result, StepFailure, UploadError};
use super::tag::TaskTag;
use super::types::{DescriptorId, StepOutput, TaskRef, VideoSettings};

/// Where a logical upload currently stands. Non-terminal states name the step
/// whose task is running (or queued); `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum UploadStep {
    Created,
    CreatingVideo,
    Uploading,
    Activating,
    ApplyingSettings,
    Complete,
    Failed,
}

impl UploadStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStep::Complete | UploadStep::Failed)
    }

    /// Tag of the task driving this step, if the step runs one.
    pub fn tag(self) -> Option<TaskTag> {
        match self {
            UploadStep::CreatingVideo => Some(TaskTag::CreateVideo),
            UploadStep::Uploading => Some(TaskTag::UploadVideo),
            UploadStep::Activating => Some(TaskTag::ActivateVideo),
            UploadStep::ApplyingSettings => Some(TaskTag::VideoSettings),
            _ => None,
        }
    }
}

impl TaskTag {
    /// The step during which a task carrying this tag runs.
    pub fn step(self) -> UploadStep {
        match self {
            TaskTag::CreateVideo => UploadStep::CreatingVideo,
            TaskTag::UploadVideo => UploadStep::Uploading,
            TaskTag::ActivateVideo => UploadStep::Activating,
            TaskTag::VideoSettings => UploadStep::ApplyingSettings,
        }
    }
}

/// Persistent state of one logical upload. Mutated only by the manager
/// worker; written back to the store after every mutation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadDescriptor {
    pub id: DescriptorId,
    pub source: PathBuf,
    pub file_size: u64,
    pub step: UploadStep,
    pub settings: Option<VideoSettings>,
    pub video_uri: Option<String>,
    pub upload_uri: Option<String>,
    pub activation_uri: Option<String>,
    /// The single in-flight task, persisted for relaunch matching.
    pub current_task: Option<TaskRef>,
    pub retries: HashMap<TaskTag, u32>,
    pub last_error: Option<StepFailure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadDescriptor {
    pub fn new(source: PathBuf, file_size: u64, settings: Option<VideoSettings>) -> Self {
        Self {
            id: DescriptorId::new(),
            source,
            file_size,
            step: UploadStep::Created,
            settings,
            video_uri: None,
            upload_uri: None,
            activation_uri: None,
            current_task: None,
            retries: HashMap::new(),
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }

    /// Checks the fixed step order, the optional settings step, the
    /// fail-from-anywhere edge and the caller-initiated retry edge.
    pub fn is_valid_transition(from: UploadStep, to: UploadStep) -> bool {
        use UploadStep::*;

        match (from, to) {
            (Created, CreatingVideo) => true,
            (CreatingVideo, Uploading) => true,
            (Uploading, Activating) => true,
            (Activating, ApplyingSettings) => true,
            (Activating, Complete) => true,
            (ApplyingSettings, Complete) => true,
            // any non-terminal step may fail
            (from, Failed) => !from.is_terminal(),
            // retry re-enters the step that failed
            (Failed, CreatingVideo | Uploading | Activating | ApplyingSettings) => true,
            _ => false,
        }
    }

    /// Created -> CreatingVideo, once the first task has been submitted.
    pub fn begin(&mut self) {
        self.step = UploadStep::CreatingVideo;
        self.started_at = Some(Utc::now());
    }

    /// Applies the success of the task carrying `tag`, recording any payload
    /// and moving to the next step per the transition table.
    pub fn advance(&mut self, tag: TaskTag, output: StepOutput) -> Result<()> {
        match (self.step, tag, output) {
            (UploadStep::CreatingVideo, TaskTag::CreateVideo, StepOutput::Created(payload)) => {
                self.video_uri = Some(payload.video_uri);
                self.upload_uri = Some(payload.upload_uri);
                self.activation_uri = Some(payload.activation_uri);
                self.step = UploadStep::Uploading;
                Ok(())
            }
            (UploadStep::Uploading, TaskTag::UploadVideo, StepOutput::Done) => {
                self.step = UploadStep::Activating;
                Ok(())
            }
            (UploadStep::Activating, TaskTag::ActivateVideo, StepOutput::Done) => {
                if self.settings.is_some() {
                    self.step = UploadStep::ApplyingSettings;
                } else {
                    self.complete();
                }
                Ok(())
            }
            (UploadStep::ApplyingSettings, TaskTag::VideoSettings, StepOutput::Done) => {
                self.complete();
                Ok(())
            }
            (step, tag, _) => Err(UploadError::internal_error(format!(
                "Completion of {} task does not apply to step {:?}",
                tag, step
            ))),
        }
    }

    fn complete(&mut self) {
        self.step = UploadStep::Complete;
        self.completed_at = Some(Utc::now());
    }

    /// Terminal failure. Identifiers accumulated by earlier steps are kept so
    /// a retry can pick up where the upload left off.
    pub fn fail(&mut self, failure: StepFailure) {
        self.step = UploadStep::Failed;
        self.current_task = None;
        self.last_error = Some(failure);
    }

    pub fn retry_count(&self, tag: TaskTag) -> u32 {
        self.retries.get(&tag).copied().unwrap_or(0)
    }

    /// Re-enters the failed step for a caller-initiated retry, bumping that
    /// step's counter. The caller enforces the retry cap.
    pub fn begin_retry(&mut self) -> Result<TaskTag> {
        if self.step != UploadStep::Failed {
            return Err(UploadError::ParamError(format!(
                "Cannot retry upload in step {:?}",
                self.step
            )));
        }

        let tag = self
            .last_error
            .as_ref()
            .and_then(|failure| failure.step)
            .ok_or_else(|| UploadError::ParamError("Failed step is unknown".to_string()))?;

        *self.retries.entry(tag).or_insert(0) += 1;
        self.last_error = None;
        self.step = tag.step();

        Ok(tag)
    }
}

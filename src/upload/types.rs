use std::path::PathBuf;
use std::time::Duration;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;
use super::descriptor::{UploadDescriptor, UploadStep};
use super::errors::{Result, StepFailure};
use super::tag::TaskTag;

/// Unique identifier of one logical upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct DescriptorId(pub Uuid);

impl DescriptorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DescriptorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the transport assigns to a submitted task. Persisted inside the
/// descriptor so a relaunched process can match live tasks back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single in-flight task of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub tag: TaskTag,
}

/// Settings applied to the video after activation. All fields optional; the
/// settings step runs iff settings were supplied when the upload started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VideoSettings {
    pub title: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<String>,
    pub password: Option<String>,
}

impl VideoSettings {
    /// Sparse patch body sent to the video URI.
    pub fn parameters(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        if let Some(title) = &self.title {
            map.insert("name".to_string(), serde_json::Value::String(title.clone()));
        }
        if let Some(description) = &self.description {
            map.insert("description".to_string(), serde_json::Value::String(description.clone()));
        }
        if let Some(privacy) = &self.privacy {
            map.insert("privacy".to_string(), serde_json::json!({ "view": privacy }));
        }
        if let Some(password) = &self.password {
            map.insert("password".to_string(), serde_json::Value::String(password.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Typed success payload of the CreateVideo step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateVideoPayload {
    /// URI of the created video record.
    pub video_uri: String,
    /// Where the file bytes go.
    pub upload_uri: String,
    /// Consumed by the ActivateVideo step.
    pub activation_uri: String,
}

/// What a successfully parsed task completion yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutput {
    Created(CreateVideoPayload),
    Done,
}

/// A request ready for submission, produced by a `RequestBuilder`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Raw outcome of an executed task. Download-style steps have their response
/// body written to `body` before parsing; upload-style steps carry none.
#[derive(Debug, Clone)]
pub struct TaskResponse {
    pub status: u16,
    pub body: Option<PathBuf>,
}

impl TaskResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivered by the transport exactly once per submitted task.
#[derive(Debug)]
pub struct TaskCompletion {
    pub task_id: TaskId,
    pub tag: TaskTag,
    pub result: Result<TaskResponse>,
}

/// Byte-count sample reported while an upload-style task streams its body.
#[derive(Debug, Clone, Copy)]
pub struct TaskProgress {
    pub task_id: TaskId,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

/// Progress of the UploadVideo step, keyed by descriptor. Advisory only.
#[derive(Debug, Clone, Copy)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    pub percentage: f64,
}

impl UploadProgress {
    pub fn from_task(progress: TaskProgress) -> Self {
        let percentage = if progress.total_bytes > 0 {
            progress.bytes_uploaded as f64 / progress.total_bytes as f64 * 100.0
        } else {
            0.0
        };

        Self {
            bytes_uploaded: progress.bytes_uploaded,
            total_bytes: progress.total_bytes,
            percentage,
        }
    }
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A new descriptor was created.
    DescriptorAdded {
        id: DescriptorId,
    },

    /// Step transition.
    StateChanged {
        id: DescriptorId,
        from: UploadStep,
        to: UploadStep,
    },

    /// UploadVideo byte progress.
    Progress {
        id: DescriptorId,
        progress: UploadProgress,
    },

    /// The upload reached Complete.
    Completed {
        id: DescriptorId,
        video_uri: String,
    },

    /// The upload reached Failed.
    Failed {
        id: DescriptorId,
        failure: StepFailure,
    },
}

impl UploadEvent {
    pub fn descriptor_id(&self) -> DescriptorId {
        match self {
            UploadEvent::DescriptorAdded { id }
            | UploadEvent::StateChanged { id, .. }
            | UploadEvent::Progress { id, .. }
            | UploadEvent::Completed { id, .. }
            | UploadEvent::Failed { id, .. } => *id,
        }
    }
}

/// Result of `resume_after_relaunch`.
#[derive(Debug, Clone, Default)]
pub struct ResumeReport {
    /// Descriptors whose persisted task is still known to the transport.
    pub reattached: Vec<DescriptorId>,
    /// Descriptors whose task outcome could not be recovered; now
    /// Failed(Indeterminate) and in need of out-of-band reconciliation.
    pub indeterminate: Vec<DescriptorId>,
}

/// Upload manager commands
pub enum ManagerCommand {
    StartUpload {
        source: PathBuf,
        settings: Option<VideoSettings>,
        reply: oneshot::Sender<Result<DescriptorId>>,
    },

    CancelUpload {
        id: DescriptorId,
        reply: oneshot::Sender<Result<()>>,
    },

    RetryUpload {
        id: DescriptorId,
        reply: oneshot::Sender<Result<()>>,
    },

    ResumeAfterRelaunch {
        reply: oneshot::Sender<Result<ResumeReport>>,
    },

    GetDescriptor {
        id: DescriptorId,
        reply: oneshot::Sender<Option<UploadDescriptor>>,
    },

    GetAllDescriptors {
        reply: oneshot::Sender<Vec<UploadDescriptor>>,
    },
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum simultaneous transfers at the transport.
    pub max_concurrent: usize,

    /// Progress sample throttle for the UploadVideo step.
    pub progress_interval: Duration,

    /// Caller-initiated retries allowed per step.
    pub max_step_retries: u32,

    /// Where download-style response bodies land before parsing.
    pub scratch_dir: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            progress_interval: Duration::from_millis(500),
            max_step_retries: 3,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<UploadEvent>();
        assert_send::<TaskCompletion>();
        assert_send::<ManagerCommand>();
    }
};

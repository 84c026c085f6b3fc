use std::str::FromStr;
use serde::{Deserialize, Serialize};
use super::errors::UploadError;

/// Label attached to every submitted network task, identifying which upload
/// step it belongs to. The string form is persisted alongside task ids, so
/// the values must stay stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TaskTag {
    CreateVideo,
    UploadVideo,
    ActivateVideo,
    VideoSettings,
}

impl TaskTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskTag::CreateVideo => "CreateVideo",
            TaskTag::UploadVideo => "UploadVideo",
            TaskTag::ActivateVideo => "ActivateVideo",
            TaskTag::VideoSettings => "VideoSettings",
        }
    }
}

impl std::fmt::Display for TaskTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskTag {
    type Err = UploadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CreateVideo" => Ok(TaskTag::CreateVideo),
            "UploadVideo" => Ok(TaskTag::UploadVideo),
            "ActivateVideo" => Ok(TaskTag::ActivateVideo),
            "VideoSettings" => Ok(TaskTag::VideoSettings),
            other => Err(UploadError::ParamError(format!("Unknown task tag: {}", other))),
        }
    }
}

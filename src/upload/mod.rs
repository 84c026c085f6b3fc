mod descriptor;
mod errors;
mod manager;
mod manager_worker;
mod session;
mod store;
mod tag;
mod traits;
mod types;

pub use descriptor::{UploadDescriptor, UploadStep};
pub use errors::{FailureKind, Result, StepFailure, UploadError};
pub use manager::{
    FilteredEventReceiver,
    UploadManager,
    UploadManagerBuilder,
    UploadManagerHandle,
};
pub use session::UploadSession;
pub use store::{DescriptorStore, JsonFileStore, MemoryStore};
pub use tag::TaskTag;
pub use traits::{AuthTokenSource, RequestBuilder, ResponseParser, Transport};
pub use types::{
    CreateVideoPayload,
    DescriptorId,
    HttpRequest,
    ManagerConfig,
    ResumeReport,
    StepOutput,
    TaskCompletion,
    TaskId,
    TaskProgress,
    TaskRef,
    TaskResponse,
    UploadEvent,
    UploadProgress,
    VideoSettings,
};

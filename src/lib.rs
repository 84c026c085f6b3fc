pub mod api;
pub mod config;
pub mod transport;
pub mod upload;

pub use api::{ApiRequestBuilder, ApiResponseParser, StaticTokenSource};
pub use transport::HttpTransport;
pub use upload::{
    AuthTokenSource,
    CreateVideoPayload,
    DescriptorId,
    DescriptorStore,
    FailureKind,
    FilteredEventReceiver,
    HttpRequest,
    JsonFileStore,
    ManagerConfig,
    MemoryStore,
    RequestBuilder,
    ResponseParser,
    Result,
    ResumeReport,
    StepFailure,
    StepOutput,
    TaskCompletion,
    TaskId,
    TaskProgress,
    TaskRef,
    TaskResponse,
    TaskTag,
    Transport,
    UploadDescriptor,
    UploadError,
    UploadEvent,
    UploadManager,
    UploadManagerBuilder,
    UploadManagerHandle,
    UploadProgress,
    UploadSession,
    UploadStep,
    VideoSettings,
};

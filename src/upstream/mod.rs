//! Direct HTTP calls to the platform's internal API, authenticated with the
//! token captured by the browser session.

use axum::http::StatusCode;

mod api;
mod executor;
mod jobs;
mod oss;
mod upload;
mod validate;

pub use api::{PlatformApi, RequestProfile};
pub use executor::RequestExecutor;
pub use jobs::{JobReference, JobStatus, PlatformClient, VideoStatus};
pub use oss::{OssBucket, StsCredentials};
pub use upload::{StagedObject, UploadPipeline, UploadedImage};
pub use validate::validate;

/// Everything that can go wrong between us and the platform
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection refused, DNS, timeout and friends
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),
    /// A non-retryable, non-2xx response
    #[error("HTTP error: {status} - {body}")]
    Http {
        /// upstream status
        status: StatusCode,
        /// upstream body, verbatim
        body: String,
    },
    /// Every attempt came back with a retryable status
    #[error("Max retries exceeded after {attempts} attempts (last status {last_status})")]
    RetriesExhausted {
        /// attempts made
        attempts: u32,
        /// status of the final attempt
        last_status: StatusCode,
    },
    /// A 2xx response carrying a non-zero `ErrCode`
    #[error("Pixverse error {code}: {message}")]
    Application {
        /// `ErrCode`, as the platform sent it
        code: String,
        /// `ErrMsg`
        message: String,
    },
    /// A 2xx response whose body isn't JSON
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
    /// A field we rely on was missing from an otherwise valid response
    #[error("{0} not found")]
    MissingField(&'static str),
    /// The job list reported a status we have no label for
    #[error("Unrecognized generation status {0}")]
    UnrecognizedStatus(i64),
    /// The requested job isn't in the recent job list
    #[error("Generation {0} not found")]
    JobNotFound(String),
    /// The object store refused part of an upload
    #[error("Object store error: {0}")]
    ObjectStore(String),
    /// A url or header for the call couldn't be built
    #[error("Failed to build request: {0}")]
    InvalidRequest(String),
    /// Writing the image to the staging file failed
    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
}

impl UpstreamError {
    /// Status relayed to our own caller
    pub fn relay_status(&self) -> StatusCode {
        match self {
            Self::Transport(_)
            | Self::Http { .. }
            | Self::Application { .. }
            | Self::InvalidBody(_)
            | Self::UnrecognizedStatus(_)
            | Self::ObjectStore(_) => StatusCode::BAD_GATEWAY,
            Self::RetriesExhausted { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingField(_) | Self::InvalidRequest(_) | Self::Staging(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err)
    }
}

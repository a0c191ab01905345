use crate::contract::ValidationError;

/// Failures raised while producing or executing rollup tasks.
///
/// Producer-side variants are isolated per pair or per task by the caller.
/// Worker-side variants propagate to the invocation and rely on queue
/// redelivery.
#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid producer request: {0}")]
    InvalidRequest(String),

    #[error("failed to assume role {role}: {message}")]
    Credentials { role: String, message: String },

    #[error("failed to list s3://{bucket}/{prefix}: {message}")]
    Listing {
        bucket: String,
        prefix: String,
        message: String,
    },

    #[error("bucket {bucket} is in {bucket_region}, expected {expected}")]
    RegionMismatch {
        bucket: String,
        bucket_region: String,
        expected: String,
    },

    #[error("failed to enqueue task: {0}")]
    Enqueue(String),

    #[error("failed to receive or acknowledge task: {0}")]
    Dequeue(String),

    #[error("invalid task payload: {0}")]
    Payload(String),

    #[error("invalid task: {0}")]
    InvalidTask(#[from] ValidationError),

    #[error("failed to download s3://{bucket}/{key}: {message}")]
    Download {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("task needs {required} bytes but the ephemeral budget is {limit} bytes")]
    SizeLimitExceeded { required: u64, limit: u64 },

    #[error("failed to stage archive locally: {0}")]
    Staging(#[from] std::io::Error),

    #[error("failed to upload s3://{bucket}/{key}: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to verify s3://{bucket}/{key}: {message}")]
    Verification {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("failed to delete s3://{bucket}/{key}: {message}")]
    Delete {
        bucket: String,
        key: String,
        message: String,
    },
}

impl RollupError {
    /// Stable short code used in structured log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Credentials { .. } => "credentials_error",
            Self::Listing { .. } => "listing_error",
            Self::RegionMismatch { .. } => "region_mismatch",
            Self::Enqueue(_) => "enqueue_error",
            Self::Dequeue(_) => "dequeue_error",
            Self::Payload(_) => "payload_error",
            Self::InvalidTask(_) => "invalid_task",
            Self::Download { .. } => "download_error",
            Self::SizeLimitExceeded { .. } => "size_limit_exceeded",
            Self::Staging(_) => "staging_error",
            Self::Upload { .. } => "upload_error",
            Self::Verification { .. } => "verification_error",
            Self::Delete { .. } => "delete_error",
        }
    }
}

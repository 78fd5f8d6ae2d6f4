//! Getting a caller's image onto the platform's object store.

use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use super::{OssBucket, PlatformApi, RequestProfile, StsCredentials, UpstreamError};
use crate::constants::{BATCH_UPLOAD_MEDIA_PATH, UPLOAD_KEY_PREFIX, UPLOAD_TOKEN_PATH};

/// An image that made it to the object store but isn't registered yet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedObject {
    /// Random id the object is stored under
    pub object_id: String,
    /// Size in bytes
    pub size: u64,
}

impl StagedObject {
    /// File name the platform knows the image by
    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.object_id)
    }

    /// Key within the bucket
    pub fn object_key(&self) -> String {
        format!("{}/{}", UPLOAD_KEY_PREFIX, self.file_name())
    }
}

/// A registered image, ready to be referenced by an image-to-video job
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    /// Remote path
    pub path: String,
    /// Remote url
    pub url: String,
}

/// Credentials → staging file → object store → registration.
#[derive(Clone, Debug)]
pub struct UploadPipeline {
    api: PlatformApi,
    bucket: OssBucket,
    staging_dir: PathBuf,
}

impl UploadPipeline {
    /// Stages files in the system temp dir
    pub fn new(api: PlatformApi, bucket: OssBucket) -> Self {
        Self {
            api,
            bucket,
            staging_dir: std::env::temp_dir(),
        }
    }

    /// Stages files in `dir` instead
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Asks the platform for fresh object store credentials
    pub async fn upload_credentials(&self) -> Result<StsCredentials, UpstreamError> {
        let body = self
            .api
            .post(UPLOAD_TOKEN_PATH, None, RequestProfile::EMPTY)
            .await?;
        body.get("Resp")
            .filter(|resp| resp.as_object().is_some_and(|resp| !resp.is_empty()))
            .and_then(|resp| StsCredentials::deserialize(resp).ok())
            .ok_or(UpstreamError::MissingField("credentials"))
    }

    /// Uploads `bytes` under a fresh id and returns what was stored.
    ///
    /// The bytes are staged in a uniquely named temporary file which is removed
    /// whether or not the upload goes through.
    #[instrument(level = "info", skip_all, fields(len = bytes.len()))]
    pub async fn upload_image(&self, bytes: &[u8]) -> Result<StagedObject, UpstreamError> {
        let credentials = self.upload_credentials().await?;
        let object_id = uuid::Uuid::new_v4().to_string();

        let staging_dir = self.staging_dir.clone();
        let owned = bytes.to_vec();
        let (file, size) = tokio::task::spawn_blocking(move || {
            let mut file = tempfile::Builder::new()
                .prefix("pixrelay-")
                .suffix(".jpg")
                .tempfile_in(staging_dir)?;
            file.write_all(&owned)?;
            file.flush()?;
            let size = file.as_file().metadata()?.len();
            Ok::<_, std::io::Error>((file, size))
        })
        .await
        .map_err(|err| UpstreamError::Staging(std::io::Error::other(err)))??;

        let staged = StagedObject { object_id, size };
        let result = self
            .bucket
            .resumable_upload(&credentials, &staged.object_key(), file.path())
            .await;
        if let Err(err) = file.close() {
            warn!("Failed to remove staged upload: {}", err);
        }
        result?;

        info!(object_id = %staged.object_id, size, "Image stored");
        Ok(staged)
    }

    /// Tells the platform about a stored object and returns its remote path and url
    pub async fn batch_register(&self, object: &StagedObject) -> Result<UploadedImage, UpstreamError> {
        let payload = json!({
            "images": [{
                "name": object.file_name(),
                "size": object.size,
                "path": object.object_key(),
            }]
        });
        let body = self
            .api
            .post(BATCH_UPLOAD_MEDIA_PATH, Some(&payload), RequestProfile::JSON)
            .await?;

        let resp = body
            .get("Resp")
            .filter(|resp| !is_empty(resp))
            .ok_or(UpstreamError::MissingField("data"))?;
        let first = resp
            .get("result")
            .and_then(Value::as_array)
            .and_then(|result| result.first())
            .ok_or(UpstreamError::MissingField("result"))?;
        UploadedImage::deserialize(first).map_err(|_| UpstreamError::MissingField("result path"))
    }

    /// [`UploadPipeline::upload_image`] then [`UploadPipeline::batch_register`]
    pub async fn upload(&self, bytes: &[u8]) -> Result<UploadedImage, UpstreamError> {
        let staged = self.upload_image(bytes).await?;
        self.batch_register(&staged).await
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

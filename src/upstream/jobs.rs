//! Submitting generation jobs and reading back their status.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use tracing::{info, instrument};

use super::{PlatformApi, RequestProfile, UploadPipeline, UploadedImage, UpstreamError};
use crate::config::GenerationSettings;
use crate::constants::{
    IMAGE_TO_VIDEO_PATH, LIP_SYNC_SPEAKER, PERSONAL_VIDEO_LIST_PATH, POLL_PAGE_LIMIT,
    TEXT_TO_VIDEO_PATH,
};

/// Platform-assigned id of a submitted job.
///
/// Compared by its text, but serialized back the way the platform sent it so
/// numeric ids stay numeric for our callers.
#[derive(Clone, Debug, Eq)]
pub struct JobReference {
    id: String,
    numeric: bool,
}

impl JobReference {
    /// Wraps an id we got from elsewhere
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            numeric: false,
        }
    }

    /// Reads an id the platform sent as either a number or a string
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) if !id.is_empty() => Some(Self::new(id.clone())),
            Value::Number(id) => Some(Self {
                id: id.to_string(),
                numeric: true,
            }),
            _ => None,
        }
    }

    /// The id as text
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl PartialEq for JobReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Hash for JobReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Serialize for JobReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.id.parse::<i64>() {
            Ok(id) if self.numeric => serializer.serialize_i64(id),
            _ => serializer.serialize_str(&self.id),
        }
    }
}

impl fmt::Display for JobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<i64> for JobReference {
    fn from(id: i64) -> Self {
        Self {
            id: id.to_string(),
            numeric: true,
        }
    }
}

/// Status codes the job list reports
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoStatus {
    /// 1
    Succeeded,
    /// 5
    Generating,
    /// 6
    Deleted,
    /// 7
    ModerationFailed,
    /// 8
    Failed,
}

impl VideoStatus {
    /// Label relayed to callers
    pub fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "Generation successful",
            Self::Generating => "Generating",
            Self::Deleted => "Deleted",
            Self::ModerationFailed => "Contents moderation failed",
            Self::Failed => "Generation failed",
        }
    }
}

impl TryFrom<i64> for VideoStatus {
    type Error = UpstreamError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Succeeded),
            5 => Ok(Self::Generating),
            6 => Ok(Self::Deleted),
            7 => Ok(Self::ModerationFailed),
            8 => Ok(Self::Failed),
            other => Err(UpstreamError::UnrecognizedStatus(other)),
        }
    }
}

/// What a poll tells the caller: either the finished video or where the job is at
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobStatus {
    /// Finished, here's the video
    Ready {
        /// playable url
        url: String,
    },
    /// Not (or never going to be) finished
    Phase {
        /// human readable label
        status: String,
    },
}

#[derive(Serialize, Debug)]
struct GenerationRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_img_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_img_url: Option<&'a str>,
    lip_sync_tts_speaker_id: &'a str,
    prompt: &'a str,
    duration: u32,
    quality: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'a str>,
    motion_mode: &'a str,
    model: &'a str,
    credit_change: u32,
}

impl<'a> GenerationRequest<'a> {
    fn text(settings: &'a GenerationSettings, prompt: &'a str) -> Self {
        Self {
            customer_img_path: None,
            customer_img_url: None,
            lip_sync_tts_speaker_id: LIP_SYNC_SPEAKER,
            prompt,
            duration: settings.duration,
            quality: &settings.quality,
            aspect_ratio: Some(&settings.aspect_ratio),
            motion_mode: &settings.motion_mode,
            model: &settings.model,
            credit_change: settings.credit_change,
        }
    }

    fn image(settings: &'a GenerationSettings, prompt: &'a str, image: &'a UploadedImage) -> Self {
        Self {
            customer_img_path: Some(&image.path),
            customer_img_url: Some(&image.url),
            aspect_ratio: None,
            ..Self::text(settings, prompt)
        }
    }
}

/// The three things callers can ask of the platform.
#[derive(Clone, Debug)]
pub struct PlatformClient {
    api: PlatformApi,
    uploads: UploadPipeline,
    generation: GenerationSettings,
}

impl PlatformClient {
    /// Bundles the api, the upload pipeline and the request constants
    pub fn new(api: PlatformApi, uploads: UploadPipeline, generation: GenerationSettings) -> Self {
        Self {
            api,
            uploads,
            generation,
        }
    }

    /// True once the browser session captured a token
    pub fn has_token(&self) -> bool {
        self.api.has_token()
    }

    /// Submits a text-to-video job
    #[instrument(level = "info", skip_all)]
    pub async fn submit_text_job(&self, prompt: &str) -> Result<JobReference, UpstreamError> {
        let request = GenerationRequest::text(&self.generation, prompt);
        let job = self.submit(TEXT_TO_VIDEO_PATH, &request).await?;
        info!(video_id = %job, "Text job submitted");
        Ok(job)
    }

    /// Uploads `image` then submits an image-to-video job for it
    #[instrument(level = "info", skip_all, fields(image_len = image.len()))]
    pub async fn submit_image_job(
        &self,
        prompt: &str,
        image: &[u8],
    ) -> Result<JobReference, UpstreamError> {
        let uploaded = self.uploads.upload(image).await?;
        let request = GenerationRequest::image(&self.generation, prompt, &uploaded);
        let job = self.submit(IMAGE_TO_VIDEO_PATH, &request).await?;
        info!(video_id = %job, "Image job submitted");
        Ok(job)
    }

    async fn submit(
        &self,
        path: &str,
        request: &GenerationRequest<'_>,
    ) -> Result<JobReference, UpstreamError> {
        let payload = serde_json::to_value(request)
            .map_err(|err| UpstreamError::InvalidRequest(err.to_string()))?;
        let body = self
            .api
            .post(path, Some(&payload), RequestProfile::SUBMISSION)
            .await?;
        body.pointer("/Resp/video_id")
            .and_then(JobReference::from_value)
            .ok_or(UpstreamError::MissingField("video_id"))
    }

    /// Looks the job up in the recent job list
    #[instrument(level = "debug", skip(self), fields(video_id = %job))]
    pub async fn poll_status(&self, job: &JobReference) -> Result<JobStatus, UpstreamError> {
        let payload = json!({
            "offset": 0,
            "limit": POLL_PAGE_LIMIT,
            "polling": true,
            "filter": {"off_peak": 0},
            "web_offset": 0,
            "app_offset": 0,
        });
        let body = self
            .api
            .post(PERSONAL_VIDEO_LIST_PATH, Some(&payload), RequestProfile::JSON)
            .await?;

        let entries = body
            .pointer("/Resp/data")
            .and_then(Value::as_array)
            .filter(|entries| !entries.is_empty())
            .ok_or(UpstreamError::MissingField("data"))?;
        let entry = entries
            .iter()
            .find(|entry| {
                entry
                    .get("video_id")
                    .and_then(JobReference::from_value)
                    .is_some_and(|id| &id == job)
            })
            .ok_or_else(|| UpstreamError::JobNotFound(job.to_string()))?;

        let code = entry
            .get("video_status")
            .and_then(Value::as_i64)
            .ok_or(UpstreamError::MissingField("video_status"))?;
        match VideoStatus::try_from(code)? {
            VideoStatus::Succeeded => entry
                .get("url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .map(|url| JobStatus::Ready {
                    url: url.to_string(),
                })
                .ok_or(UpstreamError::MissingField("url")),
            status => Ok(JobStatus::Phase {
                status: status.label().to_string(),
            }),
        }
    }
}

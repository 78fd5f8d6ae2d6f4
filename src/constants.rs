//! Shared constants for talking to the platform
//!

use std::time::Duration;

/// Default base url of the platform's internal API
pub const DEFAULT_BASE_URL: &str = "https://app-api.pixverse.ai/creative_platform";

/// Default origin of the platform's web app
pub const DEFAULT_WEB_ORIGIN: &str = "https://app.pixverse.ai";

/// Default object store endpoint for image uploads
pub const DEFAULT_OSS_ENDPOINT: &str = "oss-accelerate.aliyuncs.com";

/// Default object store bucket for image uploads
pub const DEFAULT_OSS_BUCKET: &str = "pixverse-fe-upload";

/// Default cap on an `/image2video` request body
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Header carrying the captured session token
pub const TOKEN_HEADER: &str = "token";

/// Platform marker header sent on every upstream call
pub const X_PLATFORM: &str = "x-platform";

/// Value of [`X_PLATFORM`]
pub const X_PLATFORM_WEB: &str = "Web";

/// Asks the platform to refresh the credit balance after a submission
pub const REFRESH_HEADER: &str = "refresh";

/// Accept header the web app sends
pub const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// User agent the web app is driven with
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) \
    Chrome/134.0.0.0 YaBrowser/25.4.0.0 Safari/537.36";

/// Upload credential issuance endpoint
pub const UPLOAD_TOKEN_PATH: &str = "getUploadToken";
/// Media registration endpoint
pub const BATCH_UPLOAD_MEDIA_PATH: &str = "media/batch_upload_media";
/// Text-to-video submission endpoint
pub const TEXT_TO_VIDEO_PATH: &str = "video/t2v";
/// Image-to-video submission endpoint
pub const IMAGE_TO_VIDEO_PATH: &str = "video/i2v";
/// Personal job listing endpoint
pub const PERSONAL_VIDEO_LIST_PATH: &str = "video/list/personal";

/// Page size used when polling the job list
pub const POLL_PAGE_LIMIT: u32 = 50;

/// Default generation model
pub const DEFAULT_MODEL_VERSION: &str = "v4.5";
/// Default generation quality
pub const DEFAULT_QUALITY: &str = "360p";
/// Default clip length in seconds
pub const DEFAULT_DURATION: u32 = 5;
/// Aspect ratio for text jobs
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";
/// Motion mode for all jobs
pub const DEFAULT_MOTION_MODE: &str = "normal";
/// Credits charged per submission
pub const DEFAULT_CREDIT_CHANGE: u32 = 20;
/// Lip sync speaker for all jobs
pub const LIP_SYNC_SPEAKER: &str = "Auto";

/// Key prefix in the bucket for uploaded images
pub const UPLOAD_KEY_PREFIX: &str = "upload";

/// Files at or above this size are uploaded in parts
pub const MULTIPART_THRESHOLD: u64 = 10 * 1024 * 1024;
/// Size of each uploaded part
pub const MULTIPART_PART_SIZE: u64 = 10 * 1024 * 1024;
/// Attempts per part before the upload is abandoned
pub const PART_UPLOAD_ATTEMPTS: u32 = 3;

/// Path of the login page on the web origin
pub const LOGIN_PATH: &str = "login";
/// Path of the creation page on the web origin
pub const CREATE_PATH: &str = "create/image-text";
/// Username field on the login page
pub const USERNAME_SELECTOR: &str = "#Username";
/// Password field on the login page
pub const PASSWORD_SELECTOR: &str = "#Password";
/// Submit button on the login page
pub const LOGIN_BUTTON_XPATH: &str = "//button[.//span[normalize-space(text())='Login']]";
/// Text that only appears once the login went through
pub const LOGIN_MARKER_XPATH: &str = "//*[contains(text(),'Home')]";

/// How often the login marker is looked for
pub const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(250);

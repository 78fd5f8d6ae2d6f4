//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants;

#[derive(Parser, Debug, Clone)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "PIXRELAY_DEBUG")]
    /// Enable debug logging. Env: PIXRELAY_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "8000", env = "PIXRELAY_PORT")]
    /// http listener, defaults to `8000`.
    /// Env: PIXRELAY_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "PIXRELAY_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: PIXRELAY_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = "pixrelay.sqlite", env = "PIXRELAY_DATABASE_PATH")]
    /// Path to the audit database file, eg `/data/pixrelay.sqlite`.
    /// Env: PIXRELAY_DATABASE_PATH
    pub database_path: String,

    #[clap(long, default_value = constants::DEFAULT_BASE_URL, env = "PIXRELAY_BASE_URL")]
    /// Base url of the platform's internal API.
    /// Env: PIXRELAY_BASE_URL
    pub base_url: String,
    #[clap(long, default_value = constants::DEFAULT_WEB_ORIGIN, env = "PIXRELAY_WEB_ORIGIN")]
    /// Origin of the platform's web app, used for login and request headers.
    /// Env: PIXRELAY_WEB_ORIGIN
    pub web_origin: String,

    #[clap(long, env = "PIXRELAY_EMAIL")]
    /// Login for the automated browser session. Env: PIXRELAY_EMAIL
    pub email: String,
    #[clap(long, env = "PIXRELAY_PASSWORD", hide_env_values = true)]
    /// Password for the automated browser session. Env: PIXRELAY_PASSWORD
    pub password: String,

    #[clap(long, default_value = "3", env = "PIXRELAY_MAX_RETRIES")]
    /// Attempts per upstream call before giving up. Env: PIXRELAY_MAX_RETRIES
    pub max_retries: u32,
    #[clap(
        long,
        value_delimiter = ',',
        default_value = "429,500,502,503,504",
        env = "PIXRELAY_RETRY_STATUS_CODES"
    )]
    /// Upstream statuses that are retried. Env: PIXRELAY_RETRY_STATUS_CODES
    pub retry_status_codes: Vec<u16>,
    #[clap(long, default_value = "2", env = "PIXRELAY_RETRY_DELAY_SECS")]
    /// Fixed wait between retried attempts. Env: PIXRELAY_RETRY_DELAY_SECS
    pub retry_delay_secs: u64,
    #[clap(long, default_value = "15", env = "PIXRELAY_REQUEST_TIMEOUT_SECS")]
    /// Per-attempt upstream timeout. Env: PIXRELAY_REQUEST_TIMEOUT_SECS
    pub request_timeout_secs: u64,

    #[clap(long, default_value = "30", env = "PIXRELAY_LOGIN_TIMEOUT_SECS")]
    /// How long to wait for the post-login marker. Env: PIXRELAY_LOGIN_TIMEOUT_SECS
    pub login_timeout_secs: u64,
    #[clap(long, default_value = "60", env = "PIXRELAY_NAVIGATION_TIMEOUT_SECS")]
    /// Page navigation timeout. Env: PIXRELAY_NAVIGATION_TIMEOUT_SECS
    pub navigation_timeout_secs: u64,
    #[clap(long, default_value = "20", env = "PIXRELAY_TOKEN_WAIT_SECS")]
    /// How long startup waits for the first token to show up. Env: PIXRELAY_TOKEN_WAIT_SECS
    pub token_wait_secs: u64,
    #[clap(
        long,
        default_value = "true",
        action = clap::ArgAction::Set,
        env = "PIXRELAY_HEADLESS"
    )]
    /// Run the browser headless. Env: PIXRELAY_HEADLESS
    pub headless: bool,
    #[clap(long, env = "PIXRELAY_CHROME_EXECUTABLE")]
    /// Explicit Chromium binary, otherwise one is detected. Env: PIXRELAY_CHROME_EXECUTABLE
    pub chrome_executable: Option<PathBuf>,

    #[clap(long, default_value = constants::DEFAULT_OSS_ENDPOINT, env = "PIXRELAY_OSS_ENDPOINT")]
    /// Object store endpoint host. Env: PIXRELAY_OSS_ENDPOINT
    pub oss_endpoint: String,
    #[clap(long, default_value = constants::DEFAULT_OSS_BUCKET, env = "PIXRELAY_OSS_BUCKET")]
    /// Object store bucket for uploaded images. Env: PIXRELAY_OSS_BUCKET
    pub oss_bucket: String,

    #[clap(
        long,
        default_value_t = constants::DEFAULT_MAX_UPLOAD_BYTES,
        env = "PIXRELAY_MAX_UPLOAD_BYTES"
    )]
    /// Largest accepted `/image2video` request body in bytes, defaults to 64 MiB.
    /// Env: PIXRELAY_MAX_UPLOAD_BYTES
    pub max_upload_bytes: usize,

    #[clap(long, default_value = constants::DEFAULT_MODEL_VERSION, env = "PIXRELAY_MODEL_VERSION")]
    /// Generation model version. Env: PIXRELAY_MODEL_VERSION
    pub model_version: String,
    #[clap(long, default_value = constants::DEFAULT_QUALITY, env = "PIXRELAY_QUALITY")]
    /// Generation quality. Env: PIXRELAY_QUALITY
    pub quality: String,
    #[clap(long, default_value = "5", env = "PIXRELAY_DURATION")]
    /// Generated clip length in seconds. Env: PIXRELAY_DURATION
    pub duration: u32,
}

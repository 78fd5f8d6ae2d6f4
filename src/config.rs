//! Config handling

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;
use crate::constants;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("chromiumoxide", LevelFilter::Warn)
            .with_module_level("tungstenite", LevelFilter::Warn)
            .with_module_level("sqlx", LevelFilter::Warn)
            .with_module_level("sea_orm", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Errors turning CLI options into runtime settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A url option didn't parse
    #[error("invalid url for {option}: {source}")]
    InvalidUrl {
        /// which option
        option: &'static str,
        /// parser error
        source: url::ParseError,
    },
    /// Retries must be attempted at least once
    #[error("max retries must be at least 1")]
    ZeroRetries,
}

/// How the request executor retries upstream calls
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts per call
    pub max_retries: u32,
    /// Statuses that get another attempt after [`RetryPolicy::delay`]
    pub retry_statuses: BTreeSet<u16>,
    /// Fixed wait between attempts
    pub delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_statuses: [429, 500, 502, 503, 504].into_iter().collect(),
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// True when `status` should be retried
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// What the browser session needs to log in
#[derive(Clone, Debug)]
pub struct LoginConfig {
    /// Origin of the web app, eg `https://app.pixverse.ai`
    pub web_origin: Url,
    /// Account login
    pub email: String,
    /// Account password
    pub password: String,
    /// Run without a window
    pub headless: bool,
    /// Explicit browser binary
    pub chrome_executable: Option<PathBuf>,
    /// Page navigation timeout
    pub navigation_timeout: Duration,
    /// Wait for the post-login marker
    pub login_timeout: Duration,
    /// Wait for the first token after landing on the creation page
    pub token_wait: Duration,
}

impl LoginConfig {
    /// The login page
    pub fn login_url(&self) -> Result<Url, url::ParseError> {
        self.web_origin.join(constants::LOGIN_PATH)
    }

    /// The page whose scripts issue authenticated calls
    pub fn create_url(&self) -> Result<Url, url::ParseError> {
        self.web_origin.join(constants::CREATE_PATH)
    }
}

/// Where uploaded images land
#[derive(Clone, Debug)]
pub struct ObjectStoreConfig {
    /// Endpoint host, eg `oss-accelerate.aliyuncs.com`
    pub endpoint: String,
    /// Bucket name
    pub bucket: String,
}

impl ObjectStoreConfig {
    /// Virtual-hosted base url of the bucket
    pub fn bucket_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!("https://{}.{}/", self.bucket, self.endpoint))
    }
}

/// Fixed shape of every generation request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Clip length in seconds
    pub duration: u32,
    /// Output quality, eg `360p`
    pub quality: String,
    /// Aspect ratio, only sent for text jobs
    pub aspect_ratio: String,
    /// Motion mode
    pub motion_mode: String,
    /// Model version
    pub model: String,
    /// Credits the submission costs
    pub credit_change: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            duration: constants::DEFAULT_DURATION,
            quality: constants::DEFAULT_QUALITY.to_string(),
            aspect_ratio: constants::DEFAULT_ASPECT_RATIO.to_string(),
            motion_mode: constants::DEFAULT_MOTION_MODE.to_string(),
            model: constants::DEFAULT_MODEL_VERSION.to_string(),
            credit_change: constants::DEFAULT_CREDIT_CHANGE,
        }
    }
}

/// Everything the platform client needs
#[derive(Clone, Debug)]
pub struct PlatformConfig {
    /// Base url of the internal API, always ending in `/`
    pub base_url: Url,
    /// Origin of the web app, for origin/referer headers
    pub web_origin: Url,
    /// Retry behaviour for every upstream call
    pub retry: RetryPolicy,
    /// Image upload target
    pub object_store: ObjectStoreConfig,
    /// Generation request constants
    pub generation: GenerationSettings,
}

/// Parses a url and makes sure relative joins append to it.
fn parse_base_url(option: &'static str, value: &str) -> Result<Url, ConfigError> {
    let mut value = value.trim().to_string();
    if !value.ends_with('/') {
        value.push('/');
    }
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { option, source })
}

impl CliOptions {
    /// Retry policy from the CLI
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(RetryPolicy {
            max_retries: self.max_retries,
            retry_statuses: self.retry_status_codes.iter().copied().collect(),
            delay: Duration::from_secs(self.retry_delay_secs),
            timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    /// Browser login settings from the CLI
    pub fn login_config(&self) -> Result<LoginConfig, ConfigError> {
        Ok(LoginConfig {
            web_origin: parse_base_url("web_origin", &self.web_origin)?,
            email: self.email.clone(),
            password: self.password.clone(),
            headless: self.headless,
            chrome_executable: self.chrome_executable.clone(),
            navigation_timeout: Duration::from_secs(self.navigation_timeout_secs),
            login_timeout: Duration::from_secs(self.login_timeout_secs),
            token_wait: Duration::from_secs(self.token_wait_secs),
        })
    }

    /// Platform client settings from the CLI
    pub fn platform_config(&self) -> Result<PlatformConfig, ConfigError> {
        Ok(PlatformConfig {
            base_url: parse_base_url("base_url", &self.base_url)?,
            web_origin: parse_base_url("web_origin", &self.web_origin)?,
            retry: self.retry_policy()?,
            object_store: ObjectStoreConfig {
                endpoint: self.oss_endpoint.clone(),
                bucket: self.oss_bucket.clone(),
            },
            generation: GenerationSettings {
                duration: self.duration,
                quality: self.quality.clone(),
                model: self.model_version.clone(),
                ..GenerationSettings::default()
            },
        })
    }
}

//! Headless browser session that logs into the platform once and keeps the
//! token its page scripts send.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::LoginConfig;
use crate::constants::{
    LOGIN_BUTTON_XPATH, LOGIN_MARKER_XPATH, LOGIN_POLL_INTERVAL, PASSWORD_SELECTOR,
    USERNAME_SELECTOR,
};

mod token;

pub use token::TokenSlot;

/// Failures while bringing the browser session up
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The browser couldn't be configured
    #[error("Failed to configure browser: {0}")]
    Launch(String),
    /// The devtools protocol reported an error
    #[error("Browser error: {0}")]
    Browser(#[from] CdpError),
    /// A page load took too long
    #[error("Navigation to {0} timed out")]
    NavigationTimeout(String),
    /// The post-login marker never showed up
    #[error("Login did not complete within {0:?}")]
    LoginTimeout(Duration),
    /// A login page url couldn't be built
    #[error("Invalid login url: {0}")]
    Url(#[from] url::ParseError),
    /// `start` was called twice
    #[error("Session already started")]
    AlreadyStarted,
    /// `start` was called after `stop`
    #[error("Session was stopped")]
    Stopped,
}

/// Lifecycle of the session. There is no way back from [`SessionState::Stopped`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing launched yet
    #[default]
    Unstarted,
    /// Browser launched, login in progress
    Starting,
    /// Logged in and sitting on the creation page
    Ready,
    /// Torn down
    Stopped,
}

#[derive(Default)]
struct SessionHandles {
    state: SessionState,
    browser: Option<Browser>,
    context: Option<BrowserContextId>,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    observer: Option<JoinHandle<()>>,
}

/// Owns the browser for the life of the process.
///
/// Created once at startup and shared; downstream calls only ever read the
/// token through [`SessionManager::token_slot`].
pub struct SessionManager {
    config: LoginConfig,
    token: Arc<TokenSlot>,
    handles: Mutex<SessionHandles>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("web_origin", &self.config.web_origin.as_str())
            .field("token_captured", &self.token.is_captured())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// A session that hasn't launched anything yet
    pub fn new(config: LoginConfig) -> Self {
        Self {
            config,
            token: Arc::new(TokenSlot::new()),
            handles: Mutex::new(SessionHandles::default()),
        }
    }

    /// Shared handle on the captured token
    pub fn token_slot(&self) -> Arc<TokenSlot> {
        self.token.clone()
    }

    /// The captured token, if the page has sent one yet
    pub fn token(&self) -> Option<String> {
        self.token.get().map(str::to_string)
    }

    /// Where the lifecycle is at
    pub async fn state(&self) -> SessionState {
        self.handles.lock().await.state
    }

    /// Launches the browser, logs in and lands on the creation page.
    ///
    /// On failure the handles opened so far are kept so [`SessionManager::stop`]
    /// can release them.
    #[instrument(level = "info", skip_all, fields(origin = %self.config.web_origin))]
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut handles = self.handles.lock().await;
        match handles.state {
            SessionState::Unstarted => {}
            SessionState::Stopped => return Err(SessionError::Stopped),
            SessionState::Starting | SessionState::Ready => {
                return Err(SessionError::AlreadyStarted);
            }
        }
        handles.state = SessionState::Starting;

        let mut builder = BrowserConfig::builder().request_timeout(self.config.navigation_timeout);
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(SessionError::Launch)?;

        info!("Launching browser");
        let (browser, mut handler) = Browser::launch(browser_config).await?;
        handles.handler = Some(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!("Browser handler error: {}", err);
                }
            }
        }));

        let context = browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await;
        handles.browser = Some(browser);
        let context = context?;
        handles.context = Some(context.clone());

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context)
            .build()
            .map_err(SessionError::Launch)?;
        let page = match handles.browser.as_mut() {
            Some(browser) => browser.new_page(target).await?,
            None => return Err(SessionError::Stopped),
        };

        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let slot = self.token.clone();
        handles.observer = Some(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                if slot.observe_headers(event.request.headers.inner()) {
                    info!(url = %event.request.url, "Captured session token");
                }
            }
        }));
        handles.page = Some(page.clone());

        self.login(&page).await?;

        if self.token.wait(self.config.token_wait).await {
            info!(
                len = self.token.get().map(str::len).unwrap_or_default(),
                "Session ready"
            );
        } else {
            warn!(
                "No token seen within {:?}; authenticated calls will be rejected until the page sends one",
                self.config.token_wait
            );
        }
        handles.state = SessionState::Ready;
        Ok(())
    }

    async fn login(&self, page: &Page) -> Result<(), SessionError> {
        let login_url = self.config.login_url()?;
        self.navigate(page, login_url.as_str()).await?;

        page.find_element(USERNAME_SELECTOR)
            .await?
            .click()
            .await?
            .type_str(&self.config.email)
            .await?;
        page.find_element(PASSWORD_SELECTOR)
            .await?
            .click()
            .await?
            .type_str(&self.config.password)
            .await?;
        page.find_xpath(LOGIN_BUTTON_XPATH).await?.click().await?;

        let logged_in = wait_for(self.config.login_timeout, move || async move {
            page.find_xpath(LOGIN_MARKER_XPATH).await.is_ok()
        })
        .await;
        if !logged_in {
            return Err(SessionError::LoginTimeout(self.config.login_timeout));
        }
        info!("Logged in");

        let create_url = self.config.create_url()?;
        self.navigate(page, create_url.as_str()).await
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), SessionError> {
        debug!(url, "Navigating");
        match tokio::time::timeout(self.config.navigation_timeout, page.goto(url)).await {
            Ok(result) => result.map(|_| ()).map_err(SessionError::from),
            Err(_) => Err(SessionError::NavigationTimeout(url.to_string())),
        }
    }

    /// Closes the browser. Safe to call in any state, including after a failed start.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        if let Some(observer) = handles.observer.take() {
            observer.abort();
        }
        handles.page = None;
        if let Some(context) = handles.context.take() {
            debug!(context = ?context, "Releasing browser context");
        }
        if let Some(mut browser) = handles.browser.take() {
            if let Err(err) = browser.close().await {
                warn!("Failed to close browser: {}", err);
            }
            if let Err(err) = browser.wait().await {
                warn!("Failed waiting for browser exit: {}", err);
            }
        }
        if let Some(handler) = handles.handler.take() {
            handler.abort();
        }
        if handles.state != SessionState::Stopped {
            info!("Browser session stopped");
        }
        handles.state = SessionState::Stopped;
    }
}

/// Polls `check` until it's true or `timeout` passes.
async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(LOGIN_POLL_INTERVAL).await;
    }
}

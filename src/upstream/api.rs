use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use tracing::warn;
use url::Url;

use super::{RequestExecutor, UpstreamError, validate};
use crate::constants::{
    ACCEPT_JSON, BROWSER_USER_AGENT, REFRESH_HEADER, TOKEN_HEADER, X_PLATFORM, X_PLATFORM_WEB,
};
use crate::session::TokenSlot;

/// Extra headers a call needs on top of the browser-like base set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestProfile {
    /// Sends a JSON body
    pub json_body: bool,
    /// Asks the platform to refresh the credit balance
    pub refresh_credit: bool,
}

impl RequestProfile {
    /// No body
    pub const EMPTY: Self = Self {
        json_body: false,
        refresh_credit: false,
    };
    /// JSON body
    pub const JSON: Self = Self {
        json_body: true,
        refresh_credit: false,
    };
    /// JSON body on a call that spends credits
    pub const SUBMISSION: Self = Self {
        json_body: true,
        refresh_credit: true,
    };
}

/// Authenticated access to the platform's internal endpoints.
///
/// Every call carries the captured token plus the headers the web app sends, goes
/// through the [`RequestExecutor`], and has its envelope checked by [`validate`].
#[derive(Clone, Debug)]
pub struct PlatformApi {
    executor: RequestExecutor,
    base_url: Url,
    web_origin: Url,
    token: Arc<TokenSlot>,
}

impl PlatformApi {
    /// `base_url` and `web_origin` should end in `/` so endpoints join onto them
    pub fn new(
        executor: RequestExecutor,
        base_url: Url,
        web_origin: Url,
        token: Arc<TokenSlot>,
    ) -> Self {
        Self {
            executor,
            base_url,
            web_origin,
            token,
        }
    }

    /// True once the session captured a token
    pub fn has_token(&self) -> bool {
        self.token.is_captured()
    }

    /// Full url of an endpoint relative to the base url
    pub fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url
            .join(path)
            .map_err(|err| UpstreamError::InvalidRequest(err.to_string()))
    }

    /// Headers the web app would send for this kind of call
    pub fn headers(&self, profile: RequestProfile) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, header_value(&self.web_origin.origin().ascii_serialization())?);
        headers.insert(REFERER, header_value(self.web_origin.as_str())?);
        headers.insert(X_PLATFORM, HeaderValue::from_static(X_PLATFORM_WEB));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        if profile.json_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        if profile.refresh_credit {
            headers.insert(REFRESH_HEADER, HeaderValue::from_static("credit"));
        }
        match self.token.get() {
            Some(token) => {
                let mut token = header_value(token)?;
                token.set_sensitive(true);
                headers.insert(TOKEN_HEADER, token);
            }
            None => warn!("No session token captured yet, the platform will reject this call"),
        }
        Ok(headers)
    }

    /// POSTs to `path` and returns the validated envelope
    pub async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
        profile: RequestProfile,
    ) -> Result<Value, UpstreamError> {
        let url = self.endpoint(path)?;
        let headers = self.headers(profile)?;
        let response = self
            .executor
            .execute(Method::POST, url, body, headers)
            .await?;
        validate(response)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, UpstreamError> {
    HeaderValue::from_str(value).map_err(|err| UpstreamError::InvalidRequest(err.to_string()))
}

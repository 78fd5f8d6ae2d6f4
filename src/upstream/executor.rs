//! Outbound calls with bounded retries on transient upstream statuses.

use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::UpstreamError;
use crate::config::RetryPolicy;

/// Issues upstream calls, retrying the statuses in its [`RetryPolicy`].
///
/// Stateless between calls; clone it freely, the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RequestExecutor {
    /// Builds an executor whose attempts time out after `policy.timeout`.
    ///
    /// The policy must allow at least one attempt.
    pub fn new(policy: RetryPolicy) -> Result<Self, UpstreamError> {
        if policy.max_retries == 0 {
            return Err(UpstreamError::InvalidRequest(
                "retry policy must allow at least one attempt".to_string(),
            ));
        }
        let client = reqwest::Client::builder().timeout(policy.timeout).build()?;
        Ok(Self { client, policy })
    }

    /// The pooled client, for calls that don't go through [`RequestExecutor::execute`]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Performs the call and decodes the JSON body of the first 2xx response.
    ///
    /// Retryable statuses wait [`RetryPolicy::delay`] and try again until
    /// [`RetryPolicy::max_retries`] attempts were made. Any other non-2xx status
    /// and any transport failure is returned straight away.
    #[instrument(level = "debug", skip_all, fields(%method, %url))]
    pub async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        headers: HeaderMap,
    ) -> Result<Value, UpstreamError> {
        for attempt in 1..=self.policy.max_retries {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if self.policy.is_retryable(status.as_u16()) {
                warn!(attempt, %status, "Upstream asked us to back off");
                if attempt == self.policy.max_retries {
                    return Err(UpstreamError::RetriesExhausted {
                        attempts: attempt,
                        last_status: status,
                    });
                }
                tokio::time::sleep(self.policy.delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Http { status, body });
            }

            let bytes = response.bytes().await?;
            debug!(attempt, len = bytes.len(), "Upstream call succeeded");
            return serde_json::from_slice(&bytes)
                .map_err(|err| UpstreamError::InvalidBody(err.to_string()));
        }

        // only reachable with a zero-attempt policy, which `new` refuses
        Err(UpstreamError::InvalidRequest(
            "retry policy allows no attempts".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use reqwest::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;

    use super::*;
    use crate::testing::spawn_stub;

    #[derive(Clone)]
    struct Script {
        hits: Arc<AtomicUsize>,
        statuses: Arc<Vec<u16>>,
    }

    /// Replies with `statuses[n]` on the nth hit, then 200 with a fixed body.
    async fn scripted(State(script): State<Script>) -> axum::response::Response {
        let hit = script.hits.fetch_add(1, Ordering::SeqCst);
        match script.statuses.get(hit) {
            Some(status) => {
                let status = AxumStatus::from_u16(*status).expect("valid status");
                (status, "upstream says no").into_response()
            }
            None => axum::Json(json!({"ErrCode": 0, "Resp": {"ok": true}})).into_response(),
        }
    }

    async fn stub(statuses: Vec<u16>) -> (Url, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let script = Script {
            hits: hits.clone(),
            statuses: Arc::new(statuses),
        };
        let router = Router::new()
            .route("/call", axum::routing::post(scripted))
            .with_state(script);
        let base = spawn_stub(router).await;
        let url = Url::parse(&format!("{base}/call")).expect("stub url");
        (url, hits)
    }

    fn executor() -> RequestExecutor {
        RequestExecutor::new(RetryPolicy {
            delay: Duration::from_millis(5),
            ..RetryPolicy::default()
        })
        .expect("build executor")
    }

    #[tokio::test]
    async fn recovers_within_the_retry_budget() {
        let (url, hits) = stub(vec![503, 429]).await;
        let body = executor()
            .execute(Method::POST, url, Some(&json!({"a": 1})), HeaderMap::new())
            .await
            .expect("third attempt succeeds");
        assert_eq!(body["Resp"]["ok"], json!(true));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = stub(vec![502, 502, 502, 502]).await;
        let err = executor()
            .execute(Method::POST, url, None, HeaderMap::new())
            .await
            .expect_err("all attempts fail");
        match err {
            UpstreamError::RetriesExhausted {
                attempts,
                last_status,
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_status, StatusCode::BAD_GATEWAY);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_status_is_not_retried() {
        let (url, hits) = stub(vec![403]).await;
        let err = executor()
            .execute(Method::POST, url, None, HeaderMap::new())
            .await
            .expect_err("403 is fatal");
        match err {
            UpstreamError::Http { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "upstream says no");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_immediate() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let url = Url::parse(&format!("http://{addr}/call")).expect("url");

        let err = executor()
            .execute(Method::GET, url, None, HeaderMap::new())
            .await
            .expect_err("nobody is listening");
        assert!(matches!(err, UpstreamError::Transport(_)));
        assert_eq!(err.relay_status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn zero_attempt_policy_is_refused() {
        let err = RequestExecutor::new(RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        })
        .expect_err("no attempts is not a policy");
        assert!(matches!(err, UpstreamError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn non_json_success_is_an_invalid_body() {
        let router = Router::new().route("/call", axum::routing::get(|| async { "<html>" }));
        let base = spawn_stub(router).await;
        let url = Url::parse(&format!("{base}/call")).expect("url");

        let err = executor()
            .execute(Method::GET, url, None, HeaderMap::new())
            .await
            .expect_err("html is not json");
        assert!(matches!(err, UpstreamError::InvalidBody(_)));
    }
}

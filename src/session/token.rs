use std::sync::OnceLock;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;

use crate::constants::TOKEN_HEADER;

/// Holds the bearer token seen on the page's traffic.
///
/// Written at most once; every later offer is ignored, so readers never see
/// the value change underneath them.
#[derive(Debug, Default)]
pub struct TokenSlot {
    token: OnceLock<String>,
    captured: Notify,
}

impl TokenSlot {
    /// An empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `token` if nothing was stored yet. Returns true when this call stored it.
    pub fn offer(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let stored = self.token.set(token.to_string()).is_ok();
        if stored {
            self.captured.notify_waiters();
        }
        stored
    }

    /// Looks for a `token` header in a CDP header object and offers it.
    pub fn observe_headers(&self, headers: &Value) -> bool {
        if self.is_captured() {
            return false;
        }
        let Some(headers) = headers.as_object() else {
            return false;
        };
        headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(TOKEN_HEADER))
            .and_then(|(_, value)| value.as_str())
            .is_some_and(|token| self.offer(token))
    }

    /// The captured token, if any
    pub fn get(&self) -> Option<&str> {
        self.token.get().map(String::as_str)
    }

    /// True once a token was captured
    pub fn is_captured(&self) -> bool {
        self.token.get().is_some()
    }

    /// Waits up to `timeout` for a token. Returns whether one is present.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let notified = self.captured.notified();
        if self.is_captured() {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.is_captured()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[test]
    fn first_token_wins() {
        let slot = TokenSlot::new();
        let requests = ["A", "B", "C"].map(|token| json!({"accept": "*/*", "token": token}));
        let stored: Vec<bool> = requests
            .iter()
            .map(|headers| slot.observe_headers(headers))
            .collect();

        assert_eq!(stored, vec![true, false, false]);
        assert_eq!(slot.get(), Some("A"));
    }

    #[test]
    fn requests_without_a_token_are_ignored() {
        let slot = TokenSlot::new();
        assert!(!slot.observe_headers(&json!({"authorization": "Bearer x"})));
        assert!(!slot.observe_headers(&json!({"token": ""})));
        assert!(!slot.observe_headers(&json!("not an object")));
        assert!(!slot.is_captured());

        assert!(slot.observe_headers(&json!({"Token": "upper"})));
        assert_eq!(slot.get(), Some("upper"));
    }

    #[tokio::test]
    async fn wait_wakes_on_capture() {
        let slot = Arc::new(TokenSlot::new());
        let writer = slot.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.offer("late");
        });

        assert!(slot.wait(Duration::from_secs(5)).await);
        assert_eq!(slot.get(), Some("late"));
        handle.await.expect("writer task");
    }

    #[tokio::test]
    async fn wait_times_out_without_a_token() {
        let slot = TokenSlot::new();
        assert!(!slot.wait(Duration::from_millis(10)).await);
    }
}

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use connector_core::settings::RetrySettings;
use connector_core::{ReportError, RunStatus, StatusReporter};

use crate::error::{PortError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.getport.io";

/// Fixed-count, fixed-wait retries. `attempts` counts every try, including
/// the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff: Duration::from_millis(300),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        Self {
            attempts: s.attempts.max(1),
            backoff: s.backoff(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessTokenResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Whether a response body is the affirmative `{"ok": true}`.
fn acknowledged(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .map(|v| v.get("ok") == Some(&Value::Bool(true)))
        .unwrap_or(false)
}

pub struct PortClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    token: RwLock<Option<String>>,
}

impl PortClient {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
            token: RwLock::new(None),
        })
    }

    fn set_token(&self, token: String) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Exchange client credentials for an access token, which is stored and
    /// sent as a bearer token on every later call.
    pub async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let body = self
            .send(
                Method::POST,
                "v1/auth/access_token",
                &json!({ "clientId": client_id, "clientSecret": client_secret }),
                false,
            )
            .await?;
        let resp: AccessTokenResponse = serde_json::from_str(&body)?;
        if resp.ok == Some(false) {
            return Err(PortError::Auth(body));
        }
        let token = resp
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PortError::Auth("response carried no access token".into()))?;
        self.set_token(token.clone());
        info!(base_url = %self.base_url, "authenticated with Port");
        Ok(token)
    }

    /// Set the terminal status of an action run.
    pub async fn patch_action_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let path = format!("v1/actions/runs/{run_id}");
        let body = self
            .send(Method::PATCH, &path, &json!({ "status": status }), true)
            .await?;
        let parsed: Value = serde_json::from_str(&body)?;
        if parsed.get("ok") != Some(&Value::Bool(true)) {
            return Err(PortError::NotAcknowledged {
                what: format!("run {run_id} status {status}"),
                body,
            });
        }
        debug!(run_id, %status, "action run updated");
        Ok(())
    }

    /// Send with retries and return the raw body. Transport errors are
    /// retried on every path; `/permissions` paths are also retried until
    /// the body is `{"ok": true}`. Once attempts run out the last body is
    /// returned as is.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        authenticated: bool,
    ) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let token = if authenticated {
            Some(self.token().ok_or(PortError::NotAuthenticated)?)
        } else {
            None
        };
        let retry_on_body = path.contains("/permissions");

        let mut attempt = 1;
        loop {
            let mut req = self.http.request(method.clone(), &url).json(body);
            if let Some(token) = &token {
                req = req.bearer_auth(token);
            }

            let last = attempt >= self.retry.attempts;
            match req.send().await {
                Err(e) if !last => {
                    warn!(%url, attempt, error = %e, "Port request failed, retrying");
                }
                Err(e) => return Err(e.into()),
                Ok(resp) => {
                    let text = resp.text().await?;
                    if !retry_on_body || last || acknowledged(&text) {
                        return Ok(text);
                    }
                    warn!(%url, attempt, body = %text, "Port did not acknowledge, retrying");
                }
            }
            attempt += 1;
            tokio::time::sleep(self.retry.backoff).await;
        }
    }
}

#[async_trait]
impl StatusReporter for PortClient {
    async fn report(&self, run_id: &str, status: RunStatus) -> std::result::Result<(), ReportError> {
        self.patch_action_run(run_id, status)
            .await
            .map_err(|e| ReportError::new(run_id, status, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn acknowledgement_requires_literal_true() {
        assert!(acknowledged(r#"{"ok":true}"#));
        assert!(!acknowledged(r#"{"ok":false}"#));
        assert!(!acknowledged(r#"{"ok":"true"}"#));
        assert!(!acknowledged(r#"{}"#));
        assert!(!acknowledged("<html>"));
    }

    #[test]
    fn retry_policy_from_settings_keeps_at_least_one_attempt() {
        let s = RetrySettings {
            attempts: 0,
            backoff_ms: 50,
        };
        let p = RetryPolicy::from(&s);
        assert_eq!(p.attempts, 1);
        assert_eq!(p.backoff, Duration::from_millis(50));
        assert_eq!(RetryPolicy::from(&RetrySettings::default()), RetryPolicy::default());
    }

    #[test]
    fn poisoned_token_lock_still_serves_the_token() {
        let client = PortClient::new("http://127.0.0.1:9", fast(1)).unwrap();
        let joined = std::thread::scope(|s| {
            s.spawn(|| {
                let _held = client.token.write().unwrap();
                panic!("writer died holding the token lock");
            })
            .join()
        });
        assert!(joined.is_err());
        assert!(client.token.is_poisoned());

        client.set_token("tok-2".into());
        assert_eq!(client.token().as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn permission_paths_retry_until_acknowledged() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/blueprints/bucket/permissions")
            .with_status(200)
            .with_body(r#"{"ok":false}"#)
            .expect(3)
            .create_async()
            .await;

        let client = PortClient::new(server.url(), fast(3)).unwrap();
        let body = client
            .send(
                Method::POST,
                "v1/blueprints/bucket/permissions",
                &json!({}),
                false,
            )
            .await
            .unwrap();

        assert_eq!(body, r#"{"ok":false}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn other_paths_do_not_retry_on_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/blueprints")
            .with_status(200)
            .with_body(r#"{"ok":false}"#)
            .expect(1)
            .create_async()
            .await;

        let client = PortClient::new(server.url(), fast(3)).unwrap();
        client
            .send(Method::POST, "v1/blueprints", &json!({}), false)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transport_errors_are_retried_then_surfaced() {
        // Nothing listens on the discard port.
        let client = PortClient::new("http://127.0.0.1:9", fast(2)).unwrap();
        let err = client
            .send(Method::GET, "v1/anything", &json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Http(_)));
    }
}

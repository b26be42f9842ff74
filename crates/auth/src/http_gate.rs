//! [`AuthorizationGate`] backed by the service's `POST /verify` endpoint.

use std::time::Duration;

use {
    custodian_vault::{AuthorizationGate, Subject, VaultError},
    reqwest::{Client, StatusCode},
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

/// Request body for `POST /verify`.
#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

/// Response body from `POST /verify`.
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    payload: Option<VerifyPayload>,
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    /// Subject id. The service may send it as a string or a number.
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl VerifyPayload {
    fn subject_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Verifies bearer tokens over HTTP with a bounded timeout.
///
/// A timeout or transport failure is [`VaultError::Unavailable`]; a `401`,
/// `403` or `valid: false` answer is [`VaultError::Unauthorized`].
#[derive(Debug, Clone)]
pub struct HttpAuthorizationGate {
    client: Client,
    verify_url: String,
}

impl HttpAuthorizationGate {
    pub fn new(verify_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, verify_url))
    }

    /// Use a preconfigured client. Its timeout is the caller's responsibility.
    pub fn with_client(client: Client, verify_url: impl Into<String>) -> Self {
        Self {
            client,
            verify_url: verify_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl AuthorizationGate for HttpAuthorizationGate {
    async fn verify(&self, token: &str) -> Result<Subject, VaultError> {
        debug!(url = %self.verify_url, "verifying bearer token");

        let resp = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timeout = e.is_timeout(), "token verification request failed");
                if e.is_timeout() {
                    VaultError::Unavailable("token verification timed out".into())
                } else {
                    VaultError::Unavailable(format!("token verification failed: {e}"))
                }
            })?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(VaultError::Unauthorized("token rejected".into()));
        }
        if !status.is_success() {
            return Err(VaultError::Unavailable(format!(
                "token verification returned HTTP {status}"
            )));
        }

        let body: VerifyResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                VaultError::Unavailable("token verification timed out".into())
            } else {
                VaultError::Unauthorized(format!("unparseable verification response: {e}"))
            }
        })?;

        if !body.valid {
            return Err(VaultError::Unauthorized("token rejected".into()));
        }

        let id = body
            .payload
            .as_ref()
            .and_then(VerifyPayload::subject_id)
            .ok_or_else(|| VaultError::Unauthorized("verified token has no subject".into()))?;

        Ok(Subject { id })
    }
}

use std::time::Duration;

use nexus_core::config::KlaviyoConfig;
use nexus_core::identity::AccessToken;
use nexus_core::marketing::UpstreamError;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 300;

/// Authenticated Klaviyo HTTP client. Holds no credential state: the bearer
/// token is supplied per call by the turn that owns it.
pub struct KlaviyoClient {
    http: Client,
    base_url: String,
    revision: String,
}

impl KlaviyoClient {
    pub fn new(config: &KlaviyoConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| UpstreamError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            revision: config.revision.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) async fn get_json(
        &self,
        token: &AccessToken,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, UpstreamError> {
        debug!(path, "klaviyo GET");
        let response = self
            .http
            .get(self.url(path))
            .query(params)
            .bearer_auth(token.expose())
            .header("revision", &self.revision)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|error| UpstreamError::UnexpectedShape(error.to_string()))
    }

    /// POSTs a JSON:API payload. Returns `Value::Null` for bodyless success
    /// responses (204 on relationship endpoints).
    pub(crate) async fn post_json(
        &self,
        token: &AccessToken,
        path: &str,
        payload: &Value,
    ) -> Result<Value, UpstreamError> {
        debug!(path, "klaviyo POST");
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(token.expose())
            .header("revision", &self.revision)
            .header("accept", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(map_send_error)?;

        let response = check_status(response).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response
            .json::<Value>()
            .await
            .map_err(|error| UpstreamError::UnexpectedShape(error.to_string()))
    }
}

fn map_send_error(error: reqwest::Error) -> UpstreamError {
    if error.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Transport(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(UpstreamError::Unauthorized);
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(ERROR_BODY_LIMIT).collect::<String>();
    Err(UpstreamError::Api { status: status.as_u16(), body })
}

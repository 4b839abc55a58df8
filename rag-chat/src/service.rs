//! Non-streaming endpoints of the ask service.
//!
//! - `POST /login` / `POST /logout` - token check and cookie management
//! - `GET /config` - service configuration, polled until ready
//! - `GET /ask` - one-shot answer with updated history
//!
//! Every request carries `Authorization: Bearer <token>` when a token is set;
//! the service accepts the header as an alternative to the login cookie.

use std::collections::BTreeMap;
use std::time::Duration;

use rag_common::util::mask_token;
use rag_common::{Config, Error};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::base_url;
use crate::error::{ChatError, ChatResult};
use crate::exchange::Exchange;

/// Service configuration as reported by `GET /config`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Readiness flag. Services that do not report one are ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    /// Every other key the service reports.
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl RemoteConfig {
    pub fn is_ready(&self) -> bool {
        self.ready.unwrap_or(true)
    }
}

/// Response of the non-streaming `GET /ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub rewritten_query: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    token: &'a str,
}

/// Client for the service's request/response endpoints.
pub struct ServiceClient {
    base: Url,
    token: Option<String>,
    http: reqwest::Client,
}

impl ServiceClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> ChatResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.request_timeout_secs))
            .build()?;

        Ok(Self {
            base: base_url(config.endpoint())?,
            token: config.server.token.clone(),
            http,
        })
    }

    /// Set the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> ChatResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check `token` against the service.
    pub async fn login(&self, token: &str) -> ChatResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidInput("token is empty".into()).into());
        }

        let response = self
            .http
            .post(self.url("login")?)
            .json(&LoginRequest { token })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(token = %mask_token(token), "Logged in");
                Ok(())
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let detail = error_detail(response).await;
                warn!(token = %mask_token(token), detail = %detail, "Login rejected");
                Err(Error::Auth(detail).into())
            }
            status => Err(unexpected(status, response).await),
        }
    }

    /// Clear the login cookie on the service.
    pub async fn logout(&self) -> ChatResult<()> {
        let response = self.http.post(self.url("logout")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(unexpected(status, response).await);
        }
        info!("Logged out");
        Ok(())
    }

    /// Fetch the service configuration.
    pub async fn fetch_config(&self) -> ChatResult<RemoteConfig> {
        let response = self
            .authorize(self.http.get(self.url("config")?))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Poll `fetch_config` until the service reports ready.
    ///
    /// Transport errors during polling count as "not ready yet"; an
    /// authentication failure ends polling immediately.
    pub async fn wait_until_ready(
        &self,
        interval: Duration,
        max_attempts: u32,
    ) -> ChatResult<RemoteConfig> {
        for attempt in 1..=max_attempts {
            match self.fetch_config().await {
                Ok(config) if config.is_ready() => {
                    info!(attempt = attempt, "Service ready");
                    return Ok(config);
                }
                Ok(_) => debug!(attempt = attempt, "Service not ready yet"),
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => debug!(attempt = attempt, error = %e, "Config poll failed"),
            }

            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(attempts = max_attempts, "Service did not become ready");
        Err(Error::Timeout.into())
    }

    /// Ask without streaming. The query is validated like a streaming exchange.
    pub async fn ask(&self, query: &str, history: Option<&str>) -> ChatResult<AskResponse> {
        let exchange = Exchange::open(query)?;

        let mut params = vec![("query", exchange.query())];
        if let Some(history) = history {
            params.push(("history", history));
        }

        let response = self
            .authorize(self.http.get(self.url("ask")?).query(&params))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Map non-success statuses to errors; 401 becomes an authentication error.
async fn check(response: Response) -> ChatResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Auth(error_detail(response).await).into());
    }
    Err(unexpected(status, response).await)
}

async fn unexpected(status: StatusCode, response: Response) -> ChatError {
    let detail = error_detail(response).await;
    Error::External(format!("HTTP {}: {}", status.as_u16(), detail)).into()
}

/// Best-effort error text: FastAPI `detail`, our `error` field, or the raw body.
async fn error_detail(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => json
            .get("detail")
            .or_else(|| json.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(body),
        Err(_) => body,
    }
}

//! Authenticated HTTP transport shared by every service.
//!
//! # Design
//! Request shaping (`build_request`) and response classification
//! (`parse_response`) are pure functions over the plain-data types in
//! `http`. `Transport` wraps them with the only stateful parts: the reqwest
//! client, the shared token and the retry loop.
//!
//! A 401 triggers one refresh through `TokenStore::refresh_with` and one
//! silent retry; a second 401 is returned to the caller as `Auth`. Idempotent
//! requests that hit a 5xx or never reach the server are retried according
//! to `RetryPolicy`. Rate-limited responses are surfaced, never retried here.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::{OAuthToken, TokenGrant, TokenStore};
use crate::config::PodioConfig;
use crate::error::{PodioError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Shared async HTTP transport. Safe to use from many tasks at once.
#[derive(Debug)]
pub struct Transport {
    http: reqwest::Client,
    config: PodioConfig,
    tokens: TokenStore,
}

impl Transport {
    pub fn new(config: PodioConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| PodioError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            tokens: TokenStore::new(),
        })
    }

    pub fn config(&self) -> &PodioConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Install a token obtained elsewhere, e.g. restored from storage.
    pub async fn set_token(&self, token: OAuthToken) {
        self.tokens.replace(token).await;
    }

    /// Exchange credentials for a token and make it the current one.
    pub async fn authenticate(&self, grant: TokenGrant) -> Result<OAuthToken> {
        let token = self.request_token(grant).await?;
        self.tokens.replace(token.clone()).await;
        Ok(token)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(HttpMethod::Get, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serialize_body(body)?;
        self.send(HttpMethod::Post, path, Some(body)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serialize_body(body)?;
        self.send(HttpMethod::Put, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(HttpMethod::Delete, path, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<T> {
        let (token, generation) = self.tokens.current().await;
        let token = token.ok_or_else(|| PodioError::Auth("not authenticated".to_string()))?;

        let response = self
            .execute_with_retry(method, path, body.as_deref(), &token)
            .await?;
        if response.status != 401 {
            return parse_response(&response);
        }

        tracing::warn!(method = method.as_str(), path, "access token rejected, refreshing");
        let token = self
            .tokens
            .refresh_with(generation, |refresh_token| {
                self.refresh_token(refresh_token)
            })
            .await?;

        let response = self
            .execute_with_retry(method, path, body.as_deref(), &token)
            .await?;
        parse_response(&response)
    }

    async fn execute_with_retry(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&str>,
        token: &str,
    ) -> Result<HttpResponse> {
        let request = build_request(&self.config.base_url, method, path, body, Some(token));
        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            let outcome = self.execute(&request).await;
            let transient = match &outcome {
                Ok(response) => response.status >= 500,
                Err(PodioError::Connectivity(_)) => true,
                Err(_) => false,
            };
            if !transient || !method.is_idempotent() || attempt >= retry.max_retries {
                return outcome;
            }

            let delay = retry.delay_for(attempt);
            tracing::warn!(
                method = method.as_str(),
                url = %request.url,
                attempt = attempt + 1,
                ?delay,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = into_http_response(builder.send().await?).await?;
        tracing::debug!(
            method = request.method.as_str(),
            url = %request.url,
            status = response.status,
            "podio request"
        );
        if matches!(response.status, 420 | 429) {
            tracing::warn!(url = %request.url, "rate limited by Podio");
        }
        Ok(response)
    }

    async fn refresh_token(&self, refresh_token: String) -> Result<OAuthToken> {
        self.request_token(TokenGrant::RefreshToken { refresh_token })
            .await
            .map_err(|e| match e {
                PodioError::Api { code, description, .. } => {
                    PodioError::Auth(format!("token refresh rejected ({code}): {description}"))
                }
                other => other,
            })
    }

    async fn request_token(&self, grant: TokenGrant) -> Result<OAuthToken> {
        let url = format!("{}/oauth/token", self.config.base_url.trim_end_matches('/'));
        tracing::debug!(grant_type = grant.grant_type(), "requesting access token");

        let response = self
            .http
            .post(&url)
            .form(&grant.form(&self.config))
            .send()
            .await?;
        let response = into_http_response(response).await?;

        let token: OAuthToken = parse_response(&response)?;
        if token.access_token.is_empty() {
            return Err(PodioError::Auth(
                "token endpoint returned no access token".to_string(),
            ));
        }
        Ok(token)
    }
}

async fn into_http_response(response: reqwest::Response) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(key, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (key.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.text().await?;
    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

fn serialize_body<B: Serialize + ?Sized>(body: &B) -> Result<String> {
    serde_json::to_string(body).map_err(|e| PodioError::Serialization(e.to_string()))
}

/// Build the request for `path` relative to `base_url`.
pub fn build_request(
    base_url: &str,
    method: HttpMethod,
    path: &str,
    body: Option<&str>,
    token: Option<&str>,
) -> HttpRequest {
    let mut headers = vec![("accept".to_string(), "application/json".to_string())];
    if let Some(token) = token {
        headers.push(("authorization".to_string(), format!("OAuth2 {token}")));
    }
    if body.is_some() {
        headers.push(("content-type".to_string(), "application/json".to_string()));
    }

    HttpRequest {
        method,
        url: format!("{}{}", base_url.trim_end_matches('/'), path),
        headers,
        body: body.map(str::to_string),
    }
}

/// Classify `response` and deserialize its body into `T`.
///
/// An empty success body reads as JSON `null`, so `()` and `Option<_>`
/// targets accept 204 responses.
pub fn parse_response<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    check_status(response)?;
    let body = response.body.trim();
    let body = if body.is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| PodioError::Deserialization(e.to_string()))
}

/// Map non-success statuses to the matching `PodioError` variant.
pub fn check_status(response: &HttpResponse) -> Result<()> {
    let status = response.status;
    match status {
        200..=299 => Ok(()),
        401 => {
            let (code, description) = api_error_payload(response);
            Err(PodioError::Auth(format!("{code}: {description}")))
        }
        420 | 429 => Err(PodioError::RateLimited {
            retry_after: retry_after(response),
        }),
        400..=499 => {
            let (code, description) = api_error_payload(response);
            Err(PodioError::Api {
                status,
                code,
                description,
            })
        }
        500..=599 => Err(PodioError::Server {
            status,
            body: response.body.clone(),
        }),
        _ => Err(PodioError::Api {
            status,
            code: "unexpected_status".to_string(),
            description: response.body.clone(),
        }),
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

fn api_error_payload(response: &HttpResponse) -> (String, String) {
    match serde_json::from_str::<ApiErrorBody>(&response.body) {
        Ok(payload) if !payload.error.is_empty() => (payload.error, payload.error_description),
        _ => ("unknown".to_string(), response.body.clone()),
    }
}

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

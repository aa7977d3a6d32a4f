//! Authenticated HTTP client shared by all services.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::errors::error_from_response;
use crate::config::ApiConfig;
use crate::errors::{AdminError, AdminResult};
use crate::logging::{generate_request_id, REQUEST_ID_HEADER};

/// Thin wrapper over `reqwest::Client` that adds the bearer token, a request
/// id, timing logs, and uniform error decoding.
///
/// Cloning is cheap; clones share the connection pool and the token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> AdminResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("pawnshop-admin/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AdminError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.into());
    }

    pub fn clear_token(&self) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_token(&self) -> bool {
        self.token().is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .header(REQUEST_ID_HEADER, generate_request_id());

        if let Some(token) = self.token() {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Send the request and return the response if its status is a success.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> AdminResult<Response> {
        let start = Instant::now();
        let result = builder.send().await;
        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(%method, path, elapsed_ms, error = %e, "Request failed");
                return Err(AdminError::from(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(%method, path, status = status.as_u16(), elapsed_ms, "Request completed");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = error_from_response(status, &body);
        warn!(%method, path, status = status.as_u16(), elapsed_ms, error = %err, "Request rejected");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> AdminResult<T> {
        let response = self.execute(method, path, builder).await?;
        Ok(response.json::<T>().await?)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> AdminResult<T> {
        let builder = self.request(Method::GET, path);
        self.json(Method::GET, path, builder).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> AdminResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let builder = self.request(Method::GET, path).query(query);
        self.json(Method::GET, path, builder).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> AdminResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::POST, path).json(body);
        self.json(Method::POST, path, builder).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> AdminResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::PUT, path).json(body);
        self.json(Method::PUT, path, builder).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> AdminResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(Method::PATCH, path).json(body);
        self.json(Method::PATCH, path, builder).await
    }

    /// POST without a body, ignoring any response body.
    pub async fn post_empty(&self, path: &str) -> AdminResult<()> {
        let builder = self.request(Method::POST, path);
        self.execute(Method::POST, path, builder).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> AdminResult<()> {
        let builder = self.request(Method::DELETE, path);
        self.execute(Method::DELETE, path, builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base.to_string(),
            timeout_secs: 5,
        };
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn joins_paths_without_double_slashes() {
        let api = client("http://localhost:9000/");
        assert_eq!(api.url("/api/customers"), "http://localhost:9000/api/customers");
        assert_eq!(api.url("api/users"), "http://localhost:9000/api/users");
    }

    #[test]
    fn token_is_shared_between_clones() {
        let api = client("http://localhost:9000");
        let clone = api.clone();

        api.set_token("abc");
        assert_eq!(clone.token().as_deref(), Some("abc"));

        clone.clear_token();
        assert!(!api.has_token());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port 9 (discard) on localhost is not expected to be listening.
        let api = client("http://127.0.0.1:9");
        let err = api.get::<serde_json::Value>("/api/auth/me").await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }
}

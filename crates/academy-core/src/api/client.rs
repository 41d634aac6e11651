//! API client for communicating with the Academy REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::storage::{TokenStore, TOKEN_KEY};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when neither the config nor `ACADEMY_API_URL` provides one
pub const DEFAULT_API_BASE_URL: &str = "https://api.techacademy.example.com";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Callback run after a 401 response has cleared the persisted token.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// API client for the Academy backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    token_store: Option<Arc<dyn TokenStore>>,
    on_unauthorized: Option<UnauthorizedHook>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            token_store: None,
            on_unauthorized: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token.into()),
            token_store: None,
            on_unauthorized: None,
            initial_backoff: self.initial_backoff,
        }
    }

    /// Read the bearer token from persistence on every request
    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Run `hook` whenever the backend answers 401
    pub fn on_unauthorized(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer_token(&self) -> Option<String> {
        if let Some(ref token) = self.token {
            return Some(token.clone());
        }
        let store = self.token_store.as_ref()?;
        match store.read(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read token for request");
                None
            }
        }
    }

    /// Clear the persisted token and notify the session owner
    fn handle_unauthorized(&self) {
        if let Some(ref store) = self.token_store {
            if let Err(e) = store.remove(TOKEN_KEY) {
                warn!(error = %e, "Failed to clear token after 401");
            }
        }
        if let Some(ref hook) = self.on_unauthorized {
            hook();
        }
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(&self, response: Response) -> Result<Option<Response>, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized();
            Err(ApiError::Unauthorized)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        // Empty bodies (204, bare DELETE) deserialize as JSON null
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header(header::ACCEPT, "application/json");
            if let Some(token) = self.bearer_token() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, url = %url, "Sending API request");
            let response = request.send().await?;

            match self.check_response_for_retry(response).await? {
                Some(response) => return Self::parse_json(response, &url).await,
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2; // Exponential backoff
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send::<T, ()>(Method::DELETE, path, None).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::MemoryTokenStore;

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), Duration::from_secs(5))
            .expect("Failed to build client")
            .with_initial_backoff(Duration::from_millis(1))
    }

    #[test]
    fn test_url_joining() {
        let client = ApiClient::new("https://api.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(client.url("/courses"), "https://api.example.com/courses");
        assert_eq!(client.url("courses/1"), "https://api.example.com/courses/1");
    }

    #[tokio::test]
    async fn test_get_sends_persisted_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/courses"))
            .and(header("authorization", "Bearer stored-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "c1"}])))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryTokenStore::new();
        store.write(TOKEN_KEY, "stored-token").unwrap();
        let client = client_for(&server).with_token_store(Arc::new(store));

        let courses: Value = client.get("/courses").await.expect("request failed");
        assert_eq!(courses[0]["id"], "c1");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token_and_runs_hook() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/profile"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = MemoryTokenStore::new();
        store.write(TOKEN_KEY, "expired").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = calls.clone();
        let client = client_for(&server)
            .with_token_store(Arc::new(store.clone()))
            .on_unauthorized(move || {
                hook_calls.fetch_add(1, Ordering::SeqCst);
            });

        let result: Result<Value, _> = client.get("/user/profile").await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.read(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/stats"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"completed": 3})))
            .mount(&server)
            .await;

        let stats: Value = client_for(&server).get("/user/stats").await.expect("request failed");
        assert_eq!(stats["completed"], 3);
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result: Result<Value, _> = client_for(&server).get("/user/stats").await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
    }

    #[tokio::test]
    async fn test_post_surfaces_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "Email already registered"})))
            .mount(&server)
            .await;

        let result: Result<Value, _> = client_for(&server)
            .post("/auth/register", &json!({"name": "A", "email": "a@b.co", "password": "x"}))
            .await;
        match result {
            Err(ApiError::Conflict(msg)) => assert_eq!(msg, "Email already registered"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result: Result<Value, _> = client_for(&server).get("/auth/me").await;
        assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let result: Result<(), _> = client_for(&server).delete("/user/sessions/1").await;
        assert!(result.is_ok());
    }
}

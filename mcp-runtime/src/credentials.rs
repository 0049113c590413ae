use std::sync::{Arc, Mutex};
use std::time::Duration;

use kynhood_core::events::GuestTokenResponse;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{error, info};

use crate::error::{AuthenticationError, HttpError};
use crate::http::{ApiRequest, Transport};

/// Upstream guest tokens live for one hour; expire ours five minutes early.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(55 * 60);

const TOKEN_ENDPOINT: &str = "/token";

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    expires_at: Instant,
}

/// Single process-wide slot holding at most one guest credential.
///
/// Expiry is checked lazily on read; there is no background eviction.
/// Concurrent writers are last-writer-wins.
#[derive(Debug)]
pub struct CredentialCache {
    slot: Mutex<Option<Credential>>,
    default_ttl: Duration,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_TTL)
    }
}

impl CredentialCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            default_ttl,
        }
    }

    /// Returns the token if one is stored and `now < expires_at`.
    /// An expired credential is cleared as a side effect.
    pub fn get(&self) -> Option<String> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(credential) if Instant::now() < credential.expires_at => {
                Some(credential.token.clone())
            }
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        self.set_with_ttl(token, self.default_ttl);
    }

    pub fn set_with_ttl(&self, token: impl Into<String>, ttl: Duration) {
        let credential = Credential {
            token: token.into(),
            expires_at: Instant::now() + ttl,
        };
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(credential);
    }

    pub fn clear(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn has_valid(&self) -> bool {
        self.get().is_some()
    }
}

/// Fetches guest credentials from the unauthenticated token endpoint.
///
/// Never reads the cache; deciding when a fetch is needed is the caller's job.
/// On success the token is written to the cache with its default ttl. On
/// failure the cache is left untouched.
#[derive(Debug, Clone)]
pub struct GuestTokenProvider {
    transport: Transport,
    credentials: Arc<CredentialCache>,
}

impl GuestTokenProvider {
    pub fn new(transport: Transport, credentials: Arc<CredentialCache>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub async fn fetch_fresh(&self) -> Result<String, AuthenticationError> {
        info!("Fetching guest token from upstream");
        let result = self.request_token().await;
        if let Err(err) = &result {
            error!(error = %err, "Failed to fetch guest token");
        }
        result
    }

    async fn request_token(&self) -> Result<String, AuthenticationError> {
        let request = ApiRequest::get(TOKEN_ENDPOINT).unauthenticated();
        let response = self.transport.send(&request, None).await?;
        if !response.status.is_success() {
            return Err(HttpError::status(response.status, response.body).into());
        }

        // A non-object body or non-string `token` decodes to the default.
        let parsed: GuestTokenResponse =
            serde_json::from_value(response.body).unwrap_or_default();
        let token = parsed
            .token
            .filter(|token| !token.is_empty())
            .ok_or(AuthenticationError::MissingToken)?;

        info!(
            user_id = %field_text(parsed.user_id.as_ref()),
            kind = %field_text(parsed.kind.as_ref()),
            "Guest token obtained"
        );
        self.credentials.set(token.clone());
        Ok(token)
    }
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test(start_paused = true)]
    async fn get_returns_token_until_ttl_elapses() {
        let cache = CredentialCache::default();
        cache.set_with_ttl("abc", Duration::from_secs(60));
        assert_eq!(cache.get().as_deref(), Some("abc"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get().as_deref(), Some("abc"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(), None);
        assert_eq!(cache.get(), None, "expired credential must not come back");
    }

    #[tokio::test(start_paused = true)]
    async fn set_uses_configured_default_ttl() {
        let cache = CredentialCache::new(Duration::from_secs(10));
        cache.set("abc");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.has_valid());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cache.has_valid());
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_previous_credential() {
        let cache = CredentialCache::default();
        cache.set_with_ttl("old", Duration::from_secs(5));
        cache.set_with_ttl("new", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get().as_deref(), Some("new"));
    }

    #[test]
    fn clear_empties_the_slot() {
        let cache = CredentialCache::default();
        cache.clear();
        assert_eq!(cache.get(), None);

        cache.set("abc");
        cache.clear();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn zero_ttl_is_never_served() {
        let cache = CredentialCache::default();
        cache.set_with_ttl("abc", Duration::ZERO);
        assert_eq!(cache.get(), None);
    }

    fn provider_for(server: &MockServer) -> (GuestTokenProvider, Arc<CredentialCache>) {
        let cache = Arc::new(CredentialCache::default());
        let transport = Transport::new(server.uri());
        (GuestTokenProvider::new(transport, cache.clone()), cache)
    }

    #[tokio::test]
    async fn fetch_fresh_stores_token_in_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "abc",
                "userId": "u1",
                "type": "guest",
                "message": "Guest token generated"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        let token = provider.fetch_fresh().await.unwrap();

        assert_eq!(token, "abc");
        assert_eq!(cache.get().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn fetch_fresh_always_goes_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh" })))
            .expect(2)
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        cache.set("cached");
        provider.fetch_fresh().await.unwrap();
        provider.fetch_fresh().await.unwrap();
        assert_eq!(cache.get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn unexpected_metadata_types_do_not_hide_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "abc",
                "userId": 12345,
                "type": { "name": "guest" },
                "message": ["ok"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        let token = provider.fetch_fresh().await.unwrap();

        assert_eq!(token, "abc");
        assert_eq!(cache.get().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn non_string_token_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": 42 })))
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        let err = provider.fetch_fresh().await.unwrap_err();

        assert!(matches!(err, AuthenticationError::MissingToken));
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn field_text_renders_any_json_type() {
        assert_eq!(field_text(Some(&json!("u1"))), "u1");
        assert_eq!(field_text(Some(&json!(12345))), "12345");
        assert_eq!(field_text(Some(&Value::Null)), "unknown");
        assert_eq!(field_text(None), "unknown");
    }

    #[tokio::test]
    async fn missing_token_field_fails_without_caching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "message": "no token today" })),
            )
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        let err = provider.fetch_fresh().await.unwrap_err();

        assert!(matches!(err, AuthenticationError::MissingToken));
        assert_eq!(cache.get(), None);
    }

    #[tokio::test]
    async fn upstream_failure_preserves_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let (provider, cache) = provider_for(&server);
        let err = provider.fetch_fresh().await.unwrap_err();

        match err {
            AuthenticationError::Upstream(http) => {
                assert_eq!(http.status, Some(503));
                assert_eq!(http.body, json!({ "raw": "maintenance" }));
            }
            other => panic!("expected upstream failure, got {other:?}"),
        }
        assert_eq!(cache.get(), None);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_authentication_failure() {
        let cache = Arc::new(CredentialCache::default());
        let provider = GuestTokenProvider::new(Transport::new("http://127.0.0.1:9"), cache.clone());

        let err = provider.fetch_fresh().await.unwrap_err();

        match err {
            AuthenticationError::Upstream(http) => assert_eq!(http.status, None),
            other => panic!("expected transport failure, got {other:?}"),
        }
        assert_eq!(cache.get(), None);
    }
}

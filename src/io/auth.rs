//! Token provider for the upstream OAuth endpoint
//!
//! One password-grant call per sync cycle. No caching and no retry here;
//! the scheduler decides when to try again.

use crate::domain::types::{AuthToken, Credentials};
use crate::io::http::{HttpTransport, TransportError};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

pub const TOKEN_PATH: &str = "/oauth/v1/tokens";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication rejected with status {0}")]
    Status(u16),
    #[error("authentication succeeded but no access_token was returned")]
    MissingToken,
    #[error("authentication response is not valid JSON: {0}")]
    Decode(String),
    #[error("authentication request failed: {0}")]
    Transport(#[from] TransportError),
}

impl AuthError {
    /// HTTP status of the failed call, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Status(status) => Some(*status),
            AuthError::MissingToken | AuthError::Decode(_) => Some(200),
            AuthError::Transport(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Log authentication failure (cold path)
#[cold]
fn log_auth_failed(url: &str, e: &AuthError) {
    error!(url = %url, status = ?e.status(), error = %e, "auth_failed");
}

/// `Basic` header value for the client credentials
pub fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let credentials = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", STANDARD.encode(credentials.as_bytes()))
}

pub struct TokenProvider {
    transport: Arc<dyn HttpTransport>,
}

impl TokenProvider {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Exchange client + user credentials for a bearer token
    pub async fn authenticate(&self, creds: &Credentials) -> Result<AuthToken, AuthError> {
        let url = format!("{}{}", creds.base_url(), TOKEN_PATH);
        let result = self.request_token(&url, creds).await;
        match &result {
            Ok(token) => info!(
                url = %url,
                obtained_at = %token.obtained_at().to_rfc3339(),
                "auth_token_obtained"
            ),
            Err(e) => log_auth_failed(&url, e),
        }
        result
    }

    async fn request_token(&self, url: &str, creds: &Credentials) -> Result<AuthToken, AuthError> {
        let headers = [
            ("Authorization", basic_auth_header(&creds.client_id, &creds.client_secret)),
            ("Accept", "*/*".to_string()),
            ("x-app-key", creds.app_key.clone()),
        ];
        let form = [
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
            ("grant_type", "password"),
        ];

        let response = self.transport.post_form(url, &headers, &form).await?;
        if response.status != 200 {
            return Err(AuthError::Status(response.status));
        }

        let parsed: TokenResponse =
            serde_json::from_str(&response.body).map_err(|e| AuthError::Decode(e.to_string()))?;

        match parsed.access_token {
            Some(token) if !token.is_empty() => Ok(AuthToken::new(token)),
            _ => Err(AuthError::MissingToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::http::fake::FakeTransport;
    use crate::io::http::HttpResponse;
    use std::time::Duration;

    fn credentials() -> Credentials {
        Credentials {
            host_url: "https://ohip.example.com".to_string(),
            app_key: "app-key".to_string(),
            hotel_id: "HOTEL1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
        }
    }

    fn provider(transport: &Arc<FakeTransport>) -> TokenProvider {
        TokenProvider::new(transport.clone())
    }

    #[test]
    fn test_basic_auth_header() {
        // base64("client:secret")
        assert_eq!(basic_auth_header("client", "secret"), "Basic Y2xpZW50OnNlY3JldA==");
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Ok(HttpResponse::new(200, r#"{"access_token":"T","token_type":"Bearer"}"#))
        }));

        let before = chrono::Utc::now();
        let token = provider(&transport).authenticate(&credentials()).await.unwrap();
        assert_eq!(token.value(), "T");
        assert!(token.obtained_at() >= before);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "https://ohip.example.com/oauth/v1/tokens");
        assert_eq!(req.header("Authorization"), Some("Basic Y2xpZW50OnNlY3JldA=="));
        assert_eq!(req.header("x-app-key"), Some("app-key"));
        assert!(req.form.contains(&("grant_type".to_string(), "password".to_string())));
        assert!(req.form.contains(&("username".to_string(), "user".to_string())));
        assert!(req.form.contains(&("password".to_string(), "pass".to_string())));
    }

    #[tokio::test]
    async fn test_authenticate_missing_token() {
        let transport =
            Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"expires_in":3600}"#))));

        let err = provider(&transport).authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_authenticate_empty_token() {
        let transport =
            Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, r#"{"access_token":""}"#))));

        let err = provider(&transport).authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_authenticate_non_200() {
        let transport =
            Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(401, r#"{"error":"denied"}"#))));

        let err = provider(&transport).authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Status(401)));
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_authenticate_non_json_body() {
        let transport = Arc::new(FakeTransport::new(|_| Ok(HttpResponse::new(200, "<html>"))));

        let err = provider(&transport).authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Decode(_)));
    }

    #[tokio::test]
    async fn test_authenticate_transport_failure() {
        let transport = Arc::new(FakeTransport::new(|_| {
            Err(TransportError::Timeout(Duration::from_secs(10)))
        }));

        let err = provider(&transport).authenticate(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(TransportError::Timeout(_))));
        assert_eq!(err.status(), None);
    }
}

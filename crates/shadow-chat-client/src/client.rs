//! HTTP client for the chat backend.
//!
//! Wraps the four endpoints the client talks to: the streaming chat endpoint,
//! conversation save, conversation history, and the identity probe.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use shadow_chat_core::{ConversationRequest, Message, OwnerId};

use crate::auth::UserInfo;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Error response from the backend.
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Body of a save request.
#[derive(Debug, Serialize)]
struct SaveConversationRequest<'a> {
    user: &'a str,
    title: &'a str,
    messages: &'a [Message],
}

/// Body of a history request.
#[derive(Debug, Serialize)]
struct SelectHistoryRequest<'a> {
    user: &'a str,
}

/// Client for the chat backend REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client with default timeouts and no bearer token.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:5000")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the base URL is not an HTTP(S) URL or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let url = reqwest::Url::parse(&config.base_url)
            .map_err(|e| ClientError::Config(format!("base_url '{}': {e}", config.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base_url '{}' must use http or https",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.access_token.clone(),
        })
    }

    /// Build headers for requests.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Config(format!("invalid access token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(err) => err.error,
            Err(_) => "Unknown error".to_string(),
        };
        ClientError::Api { status, message }
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Start a chat turn.
    ///
    /// Returns the response once headers arrive; the body is a stream of
    /// newline-delimited `ChatResponse` frames for the caller to consume.
    pub async fn conversation(&self, request: &ConversationRequest) -> Result<reqwest::Response> {
        let url = format!("{}/conversation", self.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        tracing::debug!(
            messages = request.messages.len(),
            status = %response.status(),
            "Chat stream opened"
        );
        Ok(response)
    }

    // =========================================================================
    // Conversation history
    // =========================================================================

    /// Store a named conversation.
    pub async fn save_conversation(
        &self,
        owner: &OwnerId,
        title: &str,
        messages: &[Message],
    ) -> Result<()> {
        let url = format!("{}/saveconversation", self.base_url);

        let request = SaveConversationRequest {
            user: owner.as_str(),
            title,
            messages,
        };

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        Ok(())
    }

    /// Fetch the raw conversation records stored for an owner.
    ///
    /// Records are returned undecoded so that one damaged record cannot fail
    /// the whole list.
    pub async fn select_conversation_history(
        &self,
        owner: &OwnerId,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/selectconversationhistory", self.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&SelectHistoryRequest {
                user: owner.as_str(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let records: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;

        Ok(records)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Query the identity provider's user-info endpoint.
    pub async fn user_info(&self) -> Result<Vec<UserInfo>> {
        let url = format!("{}/.auth/me", self.base_url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    // =========================================================================
    // Utility
    // =========================================================================

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:5000/");
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[test]
    fn from_config_rejects_non_http() {
        let config = ClientConfig {
            base_url: "ftp://files.example.com".to_string(),
            ..ClientConfig::default()
        };
        assert!(matches!(
            ApiClient::from_config(&config),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn headers_carry_token() {
        let config = ClientConfig {
            access_token: Some("abc".to_string()),
            ..ClientConfig::default()
        };
        let client = ApiClient::from_config(&config).unwrap();
        let headers = client.headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), "Bearer abc");
        assert_eq!(
            headers.get(CONTENT_TYPE).unwrap().to_str().unwrap(),
            "application/json"
        );
    }

    #[test]
    fn save_request_wire_shape() {
        let owner = OwnerId::new("seller@example.com").unwrap();
        let messages = vec![Message::user("hi")];
        let body = SaveConversationRequest {
            user: owner.as_str(),
            title: "T",
            messages: &messages,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["user"], "seller@example.com");
        assert_eq!(json["title"], "T");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}

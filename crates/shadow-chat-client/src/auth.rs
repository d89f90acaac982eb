//! Identity probe.
//!
//! The hosting platform exposes the signed-in user at `/.auth/me`. An empty
//! answer means nobody is signed in, which is expected when the backend runs
//! on the developer's machine.

use serde::Deserialize;

use crate::client::ApiClient;

/// One claim attached to a signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserClaim {
    /// Claim type.
    #[serde(default)]
    pub typ: String,
    /// Claim value.
    #[serde(default)]
    pub val: String,
}

/// A user-info record from the identity endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    /// Provider-assigned user ID, usually an email address.
    #[serde(default)]
    pub user_id: String,
    /// Identity provider name (e.g., "aad").
    #[serde(default)]
    pub provider_name: String,
    /// Additional claims.
    #[serde(default)]
    pub user_claims: Vec<UserClaim>,
}

impl UserInfo {
    /// Look up a claim value by type.
    #[must_use]
    pub fn claim(&self, typ: &str) -> Option<&str> {
        self.user_claims
            .iter()
            .find(|claim| claim.typ == typ)
            .map(|claim| claim.val.as_str())
    }
}

/// Outcome of the identity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// A user is signed in.
    Authenticated {
        /// The signed-in user's ID.
        user_id: String,
    },
    /// Nobody is signed in but the backend is local, so chat still works.
    LocalDevelopment,
    /// Nobody is signed in and the backend is remote.
    NotConfigured,
}

impl AuthState {
    /// Derive the state from the identity endpoint's answer.
    #[must_use]
    pub fn from_user_info(records: &[UserInfo], local: bool) -> Self {
        if records.is_empty() {
            return if local {
                Self::LocalDevelopment
            } else {
                Self::NotConfigured
            };
        }

        // Any record means the provider is configured, even without an ID.
        let user_id = records
            .iter()
            .map(|info| info.user_id.trim())
            .find(|id| !id.is_empty())
            .unwrap_or_default()
            .to_string();
        Self::Authenticated { user_id }
    }

    /// Chat is usable in this state.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        !matches!(self, Self::NotConfigured)
    }

    /// User ID to fall back on when no owner is configured.
    #[must_use]
    pub fn owner_hint(&self) -> Option<&str> {
        match self {
            Self::Authenticated { user_id } if !user_id.is_empty() => Some(user_id),
            _ => None,
        }
    }
}

/// Returns `true` if `base_url` points at this machine.
#[must_use]
pub fn is_local_host(base_url: &str) -> bool {
    reqwest::Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| matches!(host.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

/// Ask the backend who is signed in.
///
/// A failed probe counts as an empty answer.
pub async fn probe(api: &ApiClient) -> AuthState {
    let records = match api.user_info().await {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "Identity probe failed");
            Vec::new()
        }
    };

    let state = AuthState::from_user_info(&records, is_local_host(api.base_url()));
    tracing::debug!(state = ?state, "Identity probe finished");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(id: &str) -> UserInfo {
        UserInfo {
            user_id: id.to_string(),
            provider_name: "aad".to_string(),
            user_claims: Vec::new(),
        }
    }

    #[test]
    fn signed_in_user_is_authenticated() {
        let state = AuthState::from_user_info(&[user("seller@example.com")], false);
        assert_eq!(
            state,
            AuthState::Authenticated {
                user_id: "seller@example.com".to_string()
            }
        );
        assert_eq!(state.owner_hint(), Some("seller@example.com"));
    }

    #[test]
    fn empty_answer_depends_on_host() {
        assert_eq!(AuthState::from_user_info(&[], true), AuthState::LocalDevelopment);
        assert_eq!(AuthState::from_user_info(&[], false), AuthState::NotConfigured);
        assert!(!AuthState::NotConfigured.is_usable());
        assert!(AuthState::LocalDevelopment.owner_hint().is_none());
    }

    #[test]
    fn local_hosts() {
        assert!(is_local_host("http://localhost:5000"));
        assert!(is_local_host("http://127.0.0.1:8080/"));
        assert!(is_local_host("http://LOCALHOST"));
        assert!(!is_local_host("https://chat.example.com"));
        assert!(!is_local_host("not a url"));
    }

    #[test]
    fn user_info_tolerates_missing_fields() {
        let records: Vec<UserInfo> =
            serde_json::from_str(r#"[{"user_id": "a@b.c", "user_claims": [{"typ": "name", "val": "A"}]}]"#)
                .unwrap();
        assert_eq!(records[0].provider_name, "");
        assert_eq!(records[0].claim("name"), Some("A"));
        assert_eq!(records[0].claim("email"), None);
    }

    #[tokio::test]
    async fn probe_reads_signed_in_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"user_id": "seller@example.com", "provider_name": "aad", "user_claims": []}
            ])))
            .mount(&server)
            .await;

        let api = ApiClient::new(server.uri());
        assert_eq!(
            probe(&api).await.owner_hint(),
            Some("seller@example.com")
        );
    }

    #[tokio::test]
    async fn failed_probe_against_local_backend_is_local_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.auth/me"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        // MockServer listens on 127.0.0.1.
        let api = ApiClient::new(server.uri());
        assert_eq!(probe(&api).await, AuthState::LocalDevelopment);
    }
}

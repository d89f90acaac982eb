//! Client configuration.
//!
//! Values come from a JSON file, from command-line arguments, or from the
//! defaults below.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ClientError, Result};

/// How a streamed frame is merged into the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Each frame is a snapshot of the whole turn and replaces the previous one.
    #[default]
    Replace,
    /// Each frame's messages are appended after the previous ones.
    Append,
}

impl MergePolicy {
    /// Config/CLI name of the policy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            other => Err(format!("unknown merge policy '{other}' (expected replace or append)")),
        }
    }
}

/// Configuration for the chat client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "http://localhost:5000").
    #[serde(default = "ClientConfig::default_base_url")]
    pub base_url: String,

    /// Owner identifier used for saving and listing conversations.
    #[serde(default)]
    pub owner: Option<String>,

    /// Optional bearer token sent with every request.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Whole-request timeout in seconds, including the streamed body.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout in seconds.
    #[serde(default = "ClientConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// How streamed frames are merged into the session.
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// Remove `[docN]` citation markers from message text before saving.
    #[serde(default)]
    pub strip_citation_markers: bool,
}

impl ClientConfig {
    fn default_base_url() -> String {
        "http://localhost:5000".to_string()
    }

    const fn default_request_timeout() -> u64 {
        300
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    /// Load a configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            owner: None,
            access_token: None,
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            merge_policy: MergePolicy::default(),
            strip_citation_markers: false,
        }
    }
}

//! Typed views over the descriptor strings carried in configuration.
//!
//! Proxy endpoints are written as `"user:pass@adminURL;identifier"` and node
//! maps as `"node:target"`. Both deserialize straight from their string
//! form, so a malformed descriptor fails the TOML parse.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Identifier used when a descriptor does not carry one.
pub const DEFAULT_IDENTIFIER: &str = "default";

/// Descriptor parsing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("empty descriptor")]
    Empty,

    #[error("invalid admin URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("credentials must be 'user:pass', got '{0}'")]
    InvalidCredentials(String),

    #[error("node map entry must be 'node:target', got '{0}'")]
    InvalidNodeTarget(String),
}

/// One reverse-proxy admin API.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProxyEndpoint {
    /// Admin API base URL, without trailing slash.
    pub admin_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Disambiguates proxy groups sharing one admin URL family.
    pub identifier: String,
}

impl ProxyEndpoint {
    /// Host name of the admin URL.
    pub fn host(&self) -> Option<String> {
        url_host(&self.admin_url)
    }

    /// Full descriptor, credentials included.
    pub fn descriptor(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@{};{}", user, pass, self.admin_url, self.identifier),
            (Some(user), None) => format!("{}:@{};{}", user, self.admin_url, self.identifier),
            _ => format!("{};{}", self.admin_url, self.identifier),
        }
    }

    /// Credentials for HTTP Basic authentication, if any.
    pub fn basic_auth(&self) -> Option<(&str, Option<&str>)> {
        self.username
            .as_deref()
            .map(|user| (user, self.password.as_deref()))
    }
}

impl FromStr for ProxyEndpoint {
    type Err = DescriptorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DescriptorError::Empty);
        }

        let (location, identifier) = match raw.split_once(';') {
            Some((location, id)) if !id.trim().is_empty() => (location, id.trim().to_string()),
            Some((location, _)) => (location, DEFAULT_IDENTIFIER.to_string()),
            None => (raw, DEFAULT_IDENTIFIER.to_string()),
        };

        // Passwords may contain '@', admin URLs do not.
        let (credentials, url) = match location.rsplit_once('@') {
            Some((creds, url)) => (Some(creds), url),
            None => (None, location),
        };

        let (username, password) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, pass)) if !user.is_empty() => {
                    (Some(user.to_string()), Some(pass.to_string()))
                }
                _ => return Err(DescriptorError::InvalidCredentials(creds.to_string())),
            },
            None => (None, None),
        };

        let parsed = Url::parse(url).map_err(|e| DescriptorError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DescriptorError::InvalidUrl {
                url: url.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        Ok(Self {
            admin_url: url.trim_end_matches('/').to_string(),
            username,
            password,
            identifier,
        })
    }
}

impl TryFrom<String> for ProxyEndpoint {
    type Error = DescriptorError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ProxyEndpoint> for String {
    fn from(endpoint: ProxyEndpoint) -> Self {
        endpoint.descriptor()
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.admin_url, self.identifier)
    }
}

// Never print the password.
impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("admin_url", &self.admin_url)
            .field("username", &self.username)
            .field("identifier", &self.identifier)
            .finish()
    }
}

/// Host name of any URL, lowercased.
pub fn url_host(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.host_str().map(|h| h.to_ascii_lowercase())
}

/// One `node:target` entry of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeTarget {
    pub node: String,
    pub target: String,
}

impl FromStr for NodeTarget {
    type Err = DescriptorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().split_once(':') {
            Some((node, target)) if !node.trim().is_empty() && !target.trim().is_empty() => {
                Ok(Self {
                    node: node.trim().to_string(),
                    target: target.trim().to_string(),
                })
            }
            _ => Err(DescriptorError::InvalidNodeTarget(raw.to_string())),
        }
    }
}

impl TryFrom<String> for NodeTarget {
    type Error = DescriptorError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<NodeTarget> for String {
    fn from(entry: NodeTarget) -> Self {
        format!("{}:{}", entry.node, entry.target)
    }
}

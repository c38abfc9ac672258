//! Portrait lookup.
//!
//! Portraits live at `<base>/characters/<name>/<expression>.<ext>`. The HTTP
//! resolver probes each configured extension with `HEAD` and takes the first
//! one the server answers with success.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use crate::error::AssetError;

/// Probe timeout for a single `HEAD` request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a participant's portrait for an expression.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// URL of the portrait, or `None` if no extension matched.
    async fn resolve(&self, name: &str, expression: &str, extensions: &[String])
        -> Option<String>;
}

/// Resolver that probes an HTTP asset server.
#[derive(Debug, Clone)]
pub struct HttpAssetResolver {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAssetResolver {
    pub fn new(base_url: &str) -> Result<Self, AssetError> {
        let base_url = Url::parse(base_url).map_err(|e| AssetError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AssetError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot be a base".to_string(),
            });
        }

        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client, base_url })
    }

    /// URL of one candidate portrait file.
    pub fn portrait_url(&self, name: &str, expression: &str, extension: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["characters", name, &format!("{expression}.{extension}")]);
        }
        url
    }
}

#[async_trait]
impl AssetResolver for HttpAssetResolver {
    async fn resolve(
        &self,
        name: &str,
        expression: &str,
        extensions: &[String],
    ) -> Option<String> {
        for extension in extensions {
            let url = self.portrait_url(name, expression, extension);
            match self.client.head(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(name, url = %url, "Resolved portrait");
                    return Some(url.to_string());
                }
                Ok(response) => {
                    debug!(name, url = %url, status = %response.status(), "Portrait not found");
                }
                Err(e) => {
                    warn!(name, url = %url, error = %e, "Portrait probe failed");
                }
            }
        }
        debug!(name, expression, "No portrait for any extension");
        None
    }
}

/// Resolver backed by a fixed name to URL table.
#[derive(Debug, Clone, Default)]
pub struct StaticAssetResolver {
    portraits: HashMap<String, String>,
}

impl StaticAssetResolver {
    /// A resolver that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_portrait(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.portraits.insert(name.into(), url.into());
        self
    }
}

#[async_trait]
impl AssetResolver for StaticAssetResolver {
    async fn resolve(&self, name: &str, _expression: &str, _extensions: &[String]) -> Option<String> {
        self.portraits.get(name).cloned()
    }
}

/// Character name from a portrait URL of the form `.../characters/<name>/<file>`.
///
/// Accepts absolute URLs and bare paths. The name is percent-decoded.
pub fn character_from_image_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let mut segments = path.split('/');
    segments.by_ref().find(|s| *s == "characters")?;
    let name = segments.next()?;
    segments.next().filter(|file| !file.is_empty())?;

    let name = urlencoding::decode(name).ok()?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

//! Station descriptor and stream URL validation.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// A radio station as supplied by the host's catalog.
///
/// Only `url` is interpreted by the engine. The remaining fields are carried
/// through for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

impl Station {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_logo_url(mut self, logo_url: impl Into<String>) -> Self {
        self.logo_url = Some(logo_url.into());
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    /// Name for status lines; falls back to the URL host for unnamed stations.
    pub fn display_name(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "Unknown station".to_string())
    }

    /// Two descriptors refer to the same stream if name and URL match.
    pub fn same_stream(&self, other: &Station) -> bool {
        self.name == other.name && self.url == other.url
    }

    /// Checks the URL without touching the network.
    pub fn validate(&self) -> Result<Url> {
        validate_stream_url(&self.url)
    }
}

/// Accepts absolute `http`/`https` URLs with a non-empty host.
pub fn validate_stream_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PlaybackError::InvalidArgument(
            "stream URL is empty".to_string(),
        ));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| PlaybackError::InvalidArgument(format!("malformed stream URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PlaybackError::InvalidArgument(format!(
                "unsupported URL scheme '{}' (expected http or https)",
                other
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(PlaybackError::InvalidArgument(
            "stream URL has no host".to_string(),
        ));
    }

    Ok(url)
}

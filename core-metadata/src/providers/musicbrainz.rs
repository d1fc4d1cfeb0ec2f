//! MusicBrainz API Client
//!
//! Looks up album covers through a MusicBrainz release-group search followed
//! by a Cover Art Archive download.
//!
//! ## API Endpoints
//!
//! - **Search**: `https://musicbrainz.org/ws/2/release-group/?query={query}&fmt=json`
//! - **Cover Art**: `https://coverartarchive.org/release-group/{mbid}/front`
//!
//! ## Rate Limiting
//!
//! MusicBrainz allows one request per second for identified clients. The
//! client spaces every request (search and download) by the configured delay.
//!
//! ## User Agent Requirement
//!
//! Format: "ApplicationName/Version (ContactEmail)"

use crate::error::{MetadataError, Result};
use crate::remote::{AlbumQuery, RemoteArtworkLookup};
use async_trait::async_trait;
use bytes::Bytes;
use core_runtime::config::MetadataApiConfig;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// MusicBrainz API base URL
const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";

/// Cover Art Archive base URL
const COVERART_ARCHIVE_BASE: &str = "https://coverartarchive.org";

/// Maximum number of search results to retrieve
const MAX_SEARCH_RESULTS: u32 = 5;

/// Simple rate limiter to enforce delay between requests
struct RateLimiter {
    last_request: Option<Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(delay_ms: u64) -> Self {
        Self {
            last_request: None,
            min_delay: Duration::from_millis(delay_ms),
        }
    }

    async fn wait_if_needed(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                debug!("Rate limiting: waiting {:?}", wait_time);
                sleep(wait_time).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ReleaseGroup {
    id: String,
    #[serde(default)]
    primary_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SearchResponse {
    #[serde(default)]
    release_groups: Vec<ReleaseGroup>,
}

/// [`RemoteArtworkLookup`] backed by MusicBrainz and the Cover Art Archive.
pub struct MusicBrainzArtworkLookup {
    client: reqwest::Client,
    rate_limiter: Mutex<RateLimiter>,
}

impl MusicBrainzArtworkLookup {
    /// Build a client from the metadata API settings.
    ///
    /// # Errors
    ///
    /// Fails when no user agent is configured or the HTTP client cannot be built.
    pub fn new(config: &MetadataApiConfig) -> Result<Self> {
        let user_agent = config
            .musicbrainz_user_agent
            .as_deref()
            .filter(|ua| !ua.trim().is_empty())
            .ok_or_else(|| MetadataError::Remote("MusicBrainz user agent is required".to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| MetadataError::Remote(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rate_limiter: Mutex::new(RateLimiter::new(config.rate_limit_delay_ms)),
        })
    }

    /// Searches for a release group by artist and album name
    async fn search_release_group(&self, artist: Option<&str>, album: &str) -> Result<Option<String>> {
        // Lucene query syntax: artist:"..." AND releasegroup:"..."
        let query = match artist {
            Some(artist) => format!(
                "artist:\"{}\" AND releasegroup:\"{}\"",
                escape_query(artist),
                escape_query(album)
            ),
            None => format!("releasegroup:\"{}\"", escape_query(album)),
        };

        let url = format!(
            "{}/release-group/?query={}&fmt=json&limit={}",
            MUSICBRAINZ_API_BASE,
            urlencoding::encode(&query),
            MAX_SEARCH_RESULTS
        );
        debug!("Searching MusicBrainz: {}", url);

        self.rate_limiter.lock().await.wait_if_needed().await;

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| MetadataError::Remote(format!("MusicBrainz search failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::SERVICE_UNAVAILABLE => {
                warn!("MusicBrainz service unavailable (503)");
                return Ok(None);
            }
            status => {
                return Err(MetadataError::Remote(format!(
                    "MusicBrainz search returned {}",
                    status
                )));
            }
        }

        let search_result: SearchResponse = response
            .json()
            .await
            .map_err(|e| MetadataError::Remote(format!("Failed to parse search results: {}", e)))?;

        // Prefer "Album" type over others
        let best_match = search_result
            .release_groups
            .iter()
            .find(|rg| rg.primary_type.as_deref() == Some("Album"))
            .or_else(|| search_result.release_groups.first());

        Ok(best_match.map(|rg| rg.id.clone()))
    }

    /// Fetches the front cover for a release group
    async fn fetch_cover_art_by_mbid(&self, mbid: &str) -> Result<Option<Bytes>> {
        let url = format!("{}/release-group/{}/front", COVERART_ARCHIVE_BASE, mbid);
        debug!("Fetching cover art: {}", url);

        // Cover Art Archive shares rate limits with MusicBrainz
        self.rate_limiter.lock().await.wait_if_needed().await;

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError::Remote(format!("Cover art fetch failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| MetadataError::Remote(format!("Cover art download failed: {}", e)))?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => {
                debug!("No cover art available for MBID {}", mbid);
                Ok(None)
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                warn!("Cover Art Archive service unavailable (503)");
                Ok(None)
            }
            status => Err(MetadataError::Remote(format!(
                "Cover Art Archive returned {}",
                status
            ))),
        }
    }
}

#[async_trait]
impl RemoteArtworkLookup for MusicBrainzArtworkLookup {
    async fn fetch_album_art(&self, query: &AlbumQuery) -> Result<Option<Bytes>> {
        let Some(album) = query.album_title.as_deref().filter(|a| !a.trim().is_empty()) else {
            return Ok(None);
        };
        let artist = query.primary_artist();

        match self.search_release_group(artist, album).await? {
            Some(mbid) => {
                info!(mbid = %mbid, album = %album, "Found release group");
                self.fetch_cover_art_by_mbid(&mbid).await
            }
            None => {
                info!(album = %album, "No release group found on MusicBrainz");
                Ok(None)
            }
        }
    }
}

/// Escapes special characters in Lucene query syntax
fn escape_query(s: &str) -> String {
    const SPECIAL: &[char] = &[
        '\\', '"', '+', '-', '!', '(', ')', '{', '}', '[', ']', '^', '~', '*', '?', ':', '/', '.',
        '&', '|',
    ];

    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

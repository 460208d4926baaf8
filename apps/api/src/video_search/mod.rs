//! Video search collaborator — finds lecture candidates for a lesson.
//!
//! Trait-based so the enrichment pipeline can run against any backend.
//! `AppState` carries an `Arc<dyn VideoSearch>`; the default backend is the
//! YouTube Data API v3 search endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const MAX_RESULTS: &str = "5";

#[derive(Debug, Error)]
pub enum VideoSearchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// One candidate video returned by search, in result order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub video_id: String,
    pub title: String,
    pub channel_title: String,
}

/// Video search backends implement this to be swappable behind `AppState`.
#[async_trait]
pub trait VideoSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        context_title: &str,
        level: &str,
    ) -> Result<Vec<VideoCandidate>, VideoSearchError>;
}

// ────────────────────────────────────────────────────────────────────────────
// YouTube Data API v3 backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    title: String,
    #[serde(rename = "channelTitle")]
    channel_title: String,
}

impl SearchResponse {
    fn into_candidates(self) -> Vec<VideoCandidate> {
        self.items
            .into_iter()
            .filter_map(|item| {
                item.id.video_id.map(|video_id| VideoCandidate {
                    video_id,
                    title: item.snippet.title,
                    channel_title: item.snippet.channel_title,
                })
            })
            .collect()
    }
}

pub struct YouTubeSearchClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl YouTubeSearchClient {
    pub fn new(api_key: String) -> Self {
        Self::with_endpoint(api_key, YOUTUBE_SEARCH_URL.to_string())
    }

    pub fn with_endpoint(api_key: String, endpoint: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            endpoint,
        }
    }
}

#[async_trait]
impl VideoSearch for YouTubeSearchClient {
    async fn search(
        &self,
        query: &str,
        context_title: &str,
        level: &str,
    ) -> Result<Vec<VideoCandidate>, VideoSearchError> {
        let q = format!("{query} {context_title} {level} tutorial");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("maxResults", MAX_RESULTS),
                ("q", q.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VideoSearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        let candidates = parsed.into_candidates();
        debug!(query = %q, count = candidates.len(), "video search returned candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_maps_to_candidates() {
        let json = r#"{
            "items": [
                {
                    "id": {"kind": "youtube#video", "videoId": "abc123"},
                    "snippet": {"title": "Raft Explained", "channelTitle": "DistSys Hub"}
                },
                {
                    "id": {"kind": "youtube#channel"},
                    "snippet": {"title": "A channel, not a video", "channelTitle": "Noise"}
                }
            ]
        }"#;

        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates = parsed.into_candidates();

        // Items without a videoId (channels, playlists) are dropped.
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].video_id, "abc123");
        assert_eq!(candidates[0].channel_title, "DistSys Hub");
    }

    #[test]
    fn test_search_response_tolerates_empty_body() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.into_candidates().is_empty());
    }
}

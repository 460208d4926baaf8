use std::sync::Arc;

use sqlx::PgPool;

use crate::llm_client::LlmClient;
use crate::video_search::VideoSearch;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    /// Pluggable video-search backend. Default: YouTube Data API v3.
    pub video_search: Arc<dyn VideoSearch>,
}

//! Snapshot source
//!
//! The network collaborator that returns the authoritative snapshot. The
//! engine only depends on [`SnapshotSource`]; [`HttpSnapshotSource`] is the
//! production implementation.

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::client::config::Session;
use crate::shared::snapshot::Snapshot;

/// Snapshot fetch failure
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// 401 or 403; the session token is missing, expired or revoked
    #[error("server rejected the session token (status {0})")]
    Unauthorized(u16),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("could not decode snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetches the authoritative snapshot
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Snapshot, FetchError>>;
}

/// Snapshot source over HTTP
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSnapshotSource {
    pub fn new(session: &Session) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(session.config().request_timeout)
            .build()?;
        Ok(Self {
            client,
            url: session.config().snapshot_url(),
            token: session.get_token().map(str::to_string),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            tracing::warn!(url = %self.url, status = status.as_u16(), "snapshot request unauthorized");
            return Err(FetchError::Unauthorized(status.as_u16()));
        }
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "snapshot request failed");
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let snapshot = Snapshot::from_json(&body)?;
        tracing::debug!(
            chatrooms = snapshot.chatrooms.len(),
            friends = snapshot.friends.len(),
            "snapshot received"
        );
        Ok(snapshot)
    }
}

impl SnapshotSource for HttpSnapshotSource {
    fn fetch_snapshot(&self) -> BoxFuture<'_, Result<Snapshot, FetchError>> {
        Box::pin(self.fetch())
    }
}

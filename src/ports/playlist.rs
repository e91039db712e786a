use serde::{Deserialize, Serialize};

/// One playlist entry, in playlist order. Either field may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistTrack {
    pub artist: String,
    pub title: String,
}

impl PlaylistTrack {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            artist: artist.into(),
            title: title.into(),
        }
    }
}

impl std::fmt::Display for PlaylistTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.artist, self.title)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceFetchError {
    #[error("Authentication with {service} failed: {reason}")]
    Authentication { service: &'static str, reason: String },
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("{service} responded with {status}: {body}")]
    UnexpectedStatus {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(String),
}

/// Port wrapping a remote playlist service.
///
/// Implementations live in `services::spotify` and `services::ytmusic`.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Every track of the playlist referenced by `playlist_id`, in order.
    async fn fetch_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistTrack>, SourceFetchError>;
}

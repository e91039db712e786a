//! Extraction of playlist identifiers from user-supplied references.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static SPOTIFY_PLAYLIST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:[a-z-]+/)?playlist/([A-Za-z0-9]+)")
        .expect("spotify url pattern is valid")
});

static SPOTIFY_PLAYLIST_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:playlist:([A-Za-z0-9]+)$").expect("spotify uri pattern is valid")
});

/// Spotify playlist ID from a bare ID, an `open.spotify.com` link or a
/// `spotify:playlist:` URI.
pub fn spotify_playlist_id(reference: &str) -> String {
    let reference = reference.trim();
    SPOTIFY_PLAYLIST_URL
        .captures(reference)
        .or_else(|| SPOTIFY_PLAYLIST_URI.captures(reference))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| reference.to_string())
}

/// YouTube Music playlist ID from a bare ID or any link carrying `list=`.
pub fn ytmusic_playlist_id(reference: &str) -> String {
    let reference = reference.trim();
    Url::parse(reference)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(name, _)| name == "list")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| reference.to_string())
}

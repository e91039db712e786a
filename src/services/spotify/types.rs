use serde::Deserialize;

use crate::ports::playlist::PlaylistTrack;

/// Token endpoint response. Only user tokens carry a refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// One page of `GET /v1/playlists/{id}/tracks`
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylistTracksPage {
    #[serde(default)]
    pub items: Vec<SpotifyPlaylistItem>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylistItem {
    /// Null for tracks that were removed from the catalog
    pub track: Option<SpotifyTrack>,
}

/// Tracks and podcast episodes share this shape; episodes carry no artists.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: Option<String>,
}

impl SpotifyPlaylistTracksPage {
    /// Playlist tracks of this page. Items without a track or a name are
    /// dropped; the artist is the first credited artist.
    pub fn into_tracks(self) -> Vec<PlaylistTrack> {
        self.items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| {
                let title = track.name.filter(|name| !name.is_empty())?;
                let artist = track
                    .artists
                    .into_iter()
                    .next()
                    .and_then(|artist| artist.name)
                    .unwrap_or_default();
                Some(PlaylistTrack::new(artist, title))
            })
            .collect()
    }
}

use std::collections::HashMap;
use std::time::Duration;

use crate::ports::playlist::{PlaylistSource, PlaylistTrack, SourceFetchError};
use crate::services::spotify::auth::{SERVICE, SPOTIFY_TOKEN_URL, UserAuthorization};
use crate::services::spotify::types::{SpotifyPlaylistTracksPage, SpotifyTokenResponse};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone)]
pub struct SpotifyApiCredentials {
    client_id: String,
    client_secret: String,
}

impl SpotifyApiCredentials {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }
}

/// How the source obtains its access token.
#[derive(Debug, Clone)]
pub enum SpotifyAuth {
    /// Signed-in user; private and collaborative playlists are readable
    User(UserAuthorization),
    /// App token (client-credentials flow); only public playlists are readable
    App(SpotifyApiCredentials),
}

/// Reads playlists through the Spotify Web API.
pub struct SpotifyPlaylistSource {
    auth: SpotifyAuth,
    client: reqwest::Client,
}

impl SpotifyPlaylistSource {
    pub fn new(auth: SpotifyAuth) -> Self {
        Self {
            auth,
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self) -> Result<String, SourceFetchError> {
        match &self.auth {
            SpotifyAuth::User(user) => user.access_token(&self.client).await,
            SpotifyAuth::App(credentials) => self.request_app_token(credentials).await,
        }
    }

    /// Request an app access token
    /// https://developer.spotify.com/documentation/web-api/tutorials/client-credentials-flow
    async fn request_app_token(
        &self,
        credentials: &SpotifyApiCredentials,
    ) -> Result<String, SourceFetchError> {
        let mut params = HashMap::new();
        params.insert("grant_type", "client_credentials");

        let response = self
            .client
            .post(SPOTIFY_TOKEN_URL)
            // Serialized as x-www-form-urlencoded, as required by spotify
            .form(&params)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(SourceFetchError::FailedToSendRequest)?;

        if !response.status().is_success() {
            return Err(SourceFetchError::Authentication {
                service: SERVICE,
                reason: response
                    .text()
                    .await
                    .unwrap_or("Failed to get error text".to_string()),
            });
        }

        let token: SpotifyTokenResponse = response
            .json()
            .await
            .map_err(|error| SourceFetchError::FailedToParseResponse(error.to_string()))?;

        tracing::debug!(
            token_type = %token.token_type,
            expires_in = token.expires_in,
            "Obtained Spotify access token"
        );

        Ok(token.access_token)
    }

    async fn get_page(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<SpotifyPlaylistTracksPage, SourceFetchError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(SourceFetchError::FailedToSendRequest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceFetchError::UnexpectedStatus {
                service: SERVICE,
                status,
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|error| SourceFetchError::FailedToParseResponse(error.to_string()))
    }
}

#[async_trait::async_trait]
impl PlaylistSource for SpotifyPlaylistSource {
    async fn fetch_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistTrack>, SourceFetchError> {
        let access_token = self.access_token().await?;

        let mut all_tracks = Vec::new();
        let mut next_url = Some(format!(
            "{}/playlists/{}/tracks?limit=100&fields=items(track(name,artists(name))),next",
            SPOTIFY_API_URL, playlist_id
        ));

        while let Some(url) = next_url {
            let page = self.get_page(&url, &access_token).await?;
            next_url = page.next.clone();
            all_tracks.extend(page.into_tracks());
            tracing::debug!("Fetched {} Spotify tracks so far", all_tracks.len());
        }

        Ok(all_tracks)
    }
}

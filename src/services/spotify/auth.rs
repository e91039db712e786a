//! Spotify user authorization: authorization code flow with PKCE, a local
//! redirect listener and an on-disk token cache.
//!
//! https://developer.spotify.com/documentation/web-api/tutorials/code-pkce-flow

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::ports::playlist::SourceFetchError;
use crate::services::spotify::types::SpotifyTokenResponse;

pub const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";

pub const SPOTIFY_SCOPES: [&str; 2] = ["playlist-read-private", "playlist-read-collaborative"];

pub(super) const SERVICE: &str = "Spotify";

/// How long to wait for the browser to come back to the redirect URI
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Tokens are refreshed this long before they actually expire
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Which Spotify token a run uses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SpotifyAuthMode {
    /// Sign in as the user; reads private and collaborative playlists
    #[default]
    User,
    /// App token from the client-credentials grant; public playlists only
    App,
}

impl std::fmt::Display for SpotifyAuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpotifyAuthMode::User => write!(f, "user"),
            SpotifyAuthMode::App => write!(f, "app"),
        }
    }
}

fn authentication_error(reason: impl Into<String>) -> SourceFetchError {
    SourceFetchError::Authentication {
        service: SERVICE,
        reason: reason.into(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

// =============================================================================
// PKCE
// =============================================================================

/// Random string over the PKCE unreserved alphabet
fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Generate PKCE code verifier (43-128 characters)
fn generate_code_verifier() -> String {
    generate_random_string(128)
}

/// Generate PKCE code challenge from verifier using S256 method
fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// A pending authorization: the URL the user opens plus the secrets needed
/// to finish the exchange.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub code_verifier: String,
}

pub fn authorization_request(
    client_id: &str,
    redirect_uri: &Url,
) -> Result<AuthorizationRequest, SourceFetchError> {
    let code_verifier = generate_code_verifier();
    let state = generate_random_string(16);
    let scope = SPOTIFY_SCOPES.join(" ");

    let mut url = Url::parse(SPOTIFY_AUTH_URL)
        .map_err(|e| authentication_error(format!("bad authorize url: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", redirect_uri.as_str())
        .append_pair("state", &state)
        .append_pair("scope", &scope)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", &generate_code_challenge(&code_verifier));

    Ok(AuthorizationRequest {
        url,
        state,
        code_verifier,
    })
}

// =============================================================================
// Redirect listener
// =============================================================================

/// What the browser brought back on the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// A request for some other path, e.g. `/favicon.ico`
    Unrelated,
    Code(String),
}

/// Inspect the request line of a redirect, e.g.
/// `GET /callback?code=...&state=... HTTP/1.1`.
pub fn parse_callback(
    request_line: &str,
    redirect_uri: &Url,
    expected_state: &str,
) -> Result<CallbackOutcome, SourceFetchError> {
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(CallbackOutcome::Unrelated);
    };
    let Ok(url) = redirect_uri.join(target) else {
        return Ok(CallbackOutcome::Unrelated);
    };
    if url.path() != redirect_uri.path() {
        return Ok(CallbackOutcome::Unrelated);
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if let Some(error) = params.get("error") {
        return Err(authentication_error(format!(
            "authorization was refused: {}",
            error
        )));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(authentication_error("state mismatch in authorization redirect"));
    }
    params
        .get("code")
        .filter(|code| !code.is_empty())
        .map(|code| CallbackOutcome::Code(code.clone()))
        .ok_or_else(|| authentication_error("authorization redirect carried no code"))
}

const CALLBACK_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n<html><body>Spotify access granted, you can close this window.</body></html>";
const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n";

/// Serve redirect requests on `listener` until one carries an authorization
/// code for `expected_state`.
pub async fn wait_for_callback(
    listener: TcpListener,
    redirect_uri: &Url,
    expected_state: &str,
) -> Result<String, SourceFetchError> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| authentication_error(format!("redirect listener failed: {}", e)))?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut request_line = String::new();
        if let Err(e) = reader.read_line(&mut request_line).await {
            tracing::debug!("Dropping unreadable redirect request from {}: {}", peer, e);
            continue;
        }
        // Drain the headers so closing the socket does not reset the connection
        let mut header = String::new();
        loop {
            header.clear();
            let read = reader.read_line(&mut header).await;
            if !matches!(read, Ok(n) if n > 0) || header.trim_end().is_empty() {
                break;
            }
        }

        let outcome = parse_callback(request_line.trim_end(), redirect_uri, expected_state);
        let page = match outcome {
            Ok(CallbackOutcome::Unrelated) => NOT_FOUND,
            _ => CALLBACK_PAGE,
        };
        if let Err(e) = write_half.write_all(page.as_bytes()).await {
            tracing::debug!("Failed to answer redirect request: {}", e);
        }

        match outcome? {
            CallbackOutcome::Code(code) => return Ok(code),
            CallbackOutcome::Unrelated => continue,
        }
    }
}

async fn listen_on(redirect_uri: &Url) -> Result<TcpListener, SourceFetchError> {
    let host = redirect_uri.host_str().unwrap_or("127.0.0.1");
    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    TcpListener::bind((host, port)).await.map_err(|e| {
        authentication_error(format!("could not listen on {}:{}: {}", host, port, e))
    })
}

// =============================================================================
// Token endpoint
// =============================================================================

async fn request_token(
    client: &reqwest::Client,
    params: &HashMap<&str, &str>,
) -> Result<SpotifyTokenResponse, SourceFetchError> {
    let response = client
        .post(SPOTIFY_TOKEN_URL)
        // Serialized as x-www-form-urlencoded, as required by spotify
        .form(params)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(SourceFetchError::FailedToSendRequest)?;

    if !response.status().is_success() {
        return Err(authentication_error(
            response
                .text()
                .await
                .unwrap_or("Failed to get error text".to_string()),
        ));
    }

    response
        .json()
        .await
        .map_err(|error| SourceFetchError::FailedToParseResponse(error.to_string()))
}

// =============================================================================
// Token cache
// =============================================================================

/// A user token as stored between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds
    pub expires_at: u64,
}

impl CachedToken {
    /// Spotify may omit the refresh token on refresh; the previous one then
    /// stays valid.
    pub fn from_response(
        response: SpotifyTokenResponse,
        now: u64,
        previous_refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh_token),
            expires_at: now + response.expires_in,
        }
    }

    pub fn is_fresh(&self, now: u64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<cache dir>/playlist-to-folder/spotify_token.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("playlist-to-folder").join("spotify_token.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<CachedToken> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Failures only cost a new sign-in next run, so they are logged.
    pub fn store(&self, token: &CachedToken) {
        let result = self
            .path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| {
                let json = serde_json::to_string_pretty(token).map_err(std::io::Error::other)?;
                std::fs::write(&self.path, json)
            });
        if let Err(e) = result {
            tracing::warn!("Failed to cache Spotify token at {}: {}", self.path.display(), e);
        }
    }
}

// =============================================================================
// User authorization
// =============================================================================

/// Obtains a user access token: cached, refreshed, or through an interactive
/// sign-in in the browser.
#[derive(Debug, Clone)]
pub struct UserAuthorization {
    client_id: String,
    redirect_uri: Url,
    cache: TokenCache,
}

impl UserAuthorization {
    pub fn new(client_id: String, redirect_uri: Url, cache: TokenCache) -> Self {
        Self {
            client_id,
            redirect_uri,
            cache,
        }
    }

    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String, SourceFetchError> {
        if let Some(cached) = self.cache.load() {
            if cached.is_fresh(unix_now()) {
                tracing::debug!("Using cached Spotify token");
                return Ok(cached.access_token);
            }
            if let Some(refresh_token) = cached.refresh_token {
                match self.refresh(client, refresh_token).await {
                    Ok(token) => return Ok(token.access_token),
                    Err(e) => tracing::warn!("Refreshing the Spotify token failed: {}", e),
                }
            }
        }

        self.sign_in(client).await.map(|token| token.access_token)
    }

    async fn refresh(
        &self,
        client: &reqwest::Client,
        refresh_token: String,
    ) -> Result<CachedToken, SourceFetchError> {
        let params = HashMap::from([
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.client_id.as_str()),
        ]);
        let response = request_token(client, &params).await?;
        let token = CachedToken::from_response(response, unix_now(), Some(refresh_token));
        self.cache.store(&token);
        Ok(token)
    }

    async fn sign_in(&self, client: &reqwest::Client) -> Result<CachedToken, SourceFetchError> {
        let listener = listen_on(&self.redirect_uri).await?;
        let request = authorization_request(&self.client_id, &self.redirect_uri)?;

        println!("[*] Open this URL in a browser to let playlist-to-folder read your Spotify playlists:");
        println!("    {}", request.url);

        let code = tokio::time::timeout(
            CALLBACK_TIMEOUT,
            wait_for_callback(listener, &self.redirect_uri, &request.state),
        )
        .await
        .map_err(|_| authentication_error("timed out waiting for the authorization redirect"))??;

        let params = HashMap::from([
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", request.code_verifier.as_str()),
        ]);
        let response = request_token(client, &params).await?;
        let token = CachedToken::from_response(response, unix_now(), None);
        self.cache.store(&token);
        tracing::info!(cache = %self.cache.path().display(), "Signed in to Spotify");
        Ok(token)
    }
}

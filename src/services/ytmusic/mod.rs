//! YouTube Music playlist source.
//!
//! There is no public API, so this talks to the same `youtubei` endpoint the
//! web client uses, authenticated with request headers exported from a
//! logged-in browser session.

mod parse;

use std::collections::HashSet;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};

use crate::config::ConfigurationError;
use crate::ports::playlist::{PlaylistSource, PlaylistTrack, SourceFetchError};
use parse::{Continuation, PlaylistPage, parse_playlist_page};

const YTM_BROWSE_URL: &str = "https://music.youtube.com/youtubei/v1/browse";
const YTM_ORIGIN: &str = "https://music.youtube.com";
const YTM_CLIENT_VERSION: &str = "1.20240101.01.00";
const SERVICE: &str = "YouTube Music";

/// Headers that must not be replayed from the browser export.
const DROPPED_HEADERS: &[&str] = &["accept-encoding", "content-length", "host", "content-type"];

/// Load exported browser headers, either a JSON object of name → value or
/// raw `Name: value` lines as copied from the browser's network tab.
pub fn load_headers(path: &Path) -> Result<HeaderMap, ConfigurationError> {
    if !path.is_file() {
        return Err(ConfigurationError::HeadersNotFound(path.to_path_buf()));
    }
    let invalid = |reason: String| ConfigurationError::InvalidHeaders {
        path: path.to_path_buf(),
        reason,
    };

    let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let pairs = header_pairs(&contents).map_err(invalid)?;

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let lowered = name.to_lowercase();
        if lowered.starts_with(':') || DROPPED_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        let name = HeaderName::from_bytes(lowered.as_bytes())
            .map_err(|e| invalid(format!("bad header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| invalid(format!("bad value for {}: {}", name, e)))?;
        headers.insert(name, value);
    }

    if !headers.contains_key(reqwest::header::COOKIE) {
        return Err(invalid("no cookie header found".to_string()));
    }

    headers
        .entry(HeaderName::from_static("x-origin"))
        .or_insert(HeaderValue::from_static(YTM_ORIGIN));
    headers
        .entry(reqwest::header::ORIGIN)
        .or_insert(HeaderValue::from_static(YTM_ORIGIN));

    Ok(headers)
}

fn header_pairs(contents: &str) -> Result<Vec<(String, String)>, String> {
    if contents.trim_start().starts_with('{') {
        let object: serde_json::Map<String, Value> =
            serde_json::from_str(contents).map_err(|e| e.to_string())?;
        return object
            .into_iter()
            .map(|(name, value)| match value {
                Value::String(value) => Ok((name, value)),
                other => Err(format!("value of {} is not a string: {}", name, other)),
            })
            .collect();
    }

    Ok(contents
        .lines()
        .map(str::trim)
        // Pseudo headers such as :authority
        .filter(|line| !line.starts_with(':'))
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty() && !name.contains(' '))
                .then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect())
}

/// Value of the cookie that signs requests. `__Secure-3PAPISID` is the one
/// the web client uses; older exports only carry `SAPISID`.
fn sapisid_from_cookie(cookie: &str) -> Option<String> {
    let pairs: Vec<(&str, &str)> = cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .collect();
    ["__Secure-3PAPISID", "SAPISID"].iter().find_map(|wanted| {
        pairs
            .iter()
            .find(|(name, value)| name == wanted && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

/// `Authorization` value for a request sent at `timestamp` (unix seconds).
pub fn sapisid_hash(sapisid: &str, origin: &str, timestamp: u64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {} {}", timestamp, sapisid, origin));
    format!("SAPISIDHASH {}_{:x}", timestamp, hasher.finalize())
}

pub struct YtMusicPlaylistSource {
    client: reqwest::Client,
    headers: HeaderMap,
    sapisid: Option<String>,
}

impl YtMusicPlaylistSource {
    pub fn new(headers: HeaderMap) -> Self {
        let sapisid = headers
            .get(reqwest::header::COOKIE)
            .and_then(|cookie| cookie.to_str().ok())
            .and_then(sapisid_from_cookie);
        if sapisid.is_none() {
            tracing::warn!(
                "No SAPISID cookie in the exported headers; the exported Authorization header is sent as is"
            );
        }
        Self {
            client: reqwest::Client::new(),
            headers,
            sapisid,
        }
    }

    /// Exported headers with a freshly signed `Authorization` header.
    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        let Some(sapisid) = &self.sapisid else {
            return headers;
        };
        let origin = headers
            .get(reqwest::header::ORIGIN)
            .and_then(|origin| origin.to_str().ok())
            .unwrap_or(YTM_ORIGIN)
            .to_string();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        match HeaderValue::from_str(&sapisid_hash(sapisid, &origin, timestamp)) {
            Ok(value) => {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            Err(e) => tracing::warn!("Could not build the Authorization header: {}", e),
        }
        headers
    }

    pub fn from_headers_file(path: &Path) -> Result<Self, ConfigurationError> {
        Ok(Self::new(load_headers(path)?))
    }

    async fn browse(
        &self,
        body: Value,
        query: &[(&str, &str)],
    ) -> Result<Value, SourceFetchError> {
        let response = self
            .client
            .post(YTM_BROWSE_URL)
            .headers(self.request_headers())
            .query(&[("prettyPrint", "false")])
            .query(query)
            .json(&body)
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(SourceFetchError::FailedToSendRequest)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceFetchError::Authentication {
                service: SERVICE,
                reason: format!("{} (re-export the browser headers)", status),
            });
        }
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

    async fn browse_continuation(&self, next: Continuation) -> Result<Value, SourceFetchError> {
        match &next {
            Continuation::Command(token) => {
                self.browse(
                    json!({ "context": client_context(), "continuation": token }),
                    &[],
                )
                .await
            }
            Continuation::Legacy(token) => {
                self.browse(
                    json!({ "context": client_context() }),
                    &[
                        ("ctoken", token.as_str()),
                        ("continuation", token.as_str()),
                        ("type", "next"),
                    ],
                )
                .await
            }
        }
    }
}

/// Collect the tracks of `first` and of every page reached through its
/// continuation tokens. Stops when a page has no token, has no playlist
/// items, or hands back a token that was already followed.
async fn follow_continuations<F, Fut>(
    first: PlaylistPage,
    mut fetch: F,
) -> Result<Vec<PlaylistTrack>, SourceFetchError>
where
    F: FnMut(Continuation) -> Fut,
    Fut: Future<Output = Result<Value, SourceFetchError>>,
{
    let mut all_tracks = first.tracks;
    let mut continuation = first.continuation;
    let mut seen = HashSet::new();

    while let Some(next) = continuation.take() {
        if !seen.insert(next.token().to_string()) {
            tracing::warn!("Continuation token repeated; stopping pagination");
            break;
        }

        let response = fetch(next).await?;
        let Some(page) = parse_playlist_page(&response) else {
            tracing::warn!("Continuation response had no playlist items; stopping");
            break;
        };
        all_tracks.extend(page.tracks);
        continuation = page.continuation;
        tracing::debug!("Fetched {} YouTube Music tracks so far", all_tracks.len());
    }

    Ok(all_tracks)
}

fn client_context() -> Value {
    json!({
        "client": {
            "clientName": "WEB_REMIX",
            "clientVersion": YTM_CLIENT_VERSION,
            "hl": "en",
        },
        "user": {},
    })
}

/// Browse id of a playlist page: the playlist id prefixed with `VL`.
fn browse_id(playlist_id: &str) -> String {
    if playlist_id.starts_with("VL") {
        playlist_id.to_string()
    } else {
        format!("VL{}", playlist_id)
    }
}

#[async_trait::async_trait]
impl PlaylistSource for YtMusicPlaylistSource {
    async fn fetch_tracks(&self, playlist_id: &str) -> Result<Vec<PlaylistTrack>, SourceFetchError> {
        let first = self
            .browse(
                json!({ "context": client_context(), "browseId": browse_id(playlist_id) }),
                &[],
            )
            .await?;
        let page = parse_playlist_page(&first).ok_or_else(|| {
            SourceFetchError::FailedToParseResponse(format!(
                "no playlist contents found for {}",
                playlist_id
            ))
        })?;

        follow_continuations(page, |next| self.browse_continuation(next)).await
    }
}

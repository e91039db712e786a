mod config;
mod library;
mod logging;
mod matching;
mod normalize;
mod placement;
mod playlist_ref;
mod ports;
mod reconcile;
mod services;

use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::{Config, ConfigurationError, expand_path},
    library::{AlbumFilter, tags::FileTagReader, walk::WalkDirSource},
    logging::{init_tracing, shutdown_tracing},
    matching::{DEFAULT_MIN_SCORE, scorer::ScorerKind},
    placement::PlacementMode,
    ports::playlist::PlaylistSource,
    reconcile::ReconcileOptions,
    services::{
        spotify::{
            auth::{DEFAULT_REDIRECT_URI, SpotifyAuthMode, TokenCache, UserAuthorization},
            client::{SpotifyApiCredentials, SpotifyAuth, SpotifyPlaylistSource},
        },
        ytmusic::YtMusicPlaylistSource,
    },
};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Spotify,
    Ytmusic,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Spotify => write!(f, "spotify"),
            SourceKind::Ytmusic => write!(f, "ytmusic"),
        }
    }
}

/// Collect the local files of a Spotify or YouTube Music playlist into a folder.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Where the playlist lives
    #[arg(long, value_enum)]
    source: SourceKind,

    /// Playlist URL, URI or ID
    #[arg(long)]
    playlist: String,

    /// Path to your local music library folder
    #[arg(long)]
    library: PathBuf,

    /// Destination folder for matched tracks
    #[arg(long)]
    out: PathBuf,

    /// Copy or move matched files (default: copy)
    #[arg(long, value_enum)]
    mode: Option<PlacementMode>,

    /// Only consider files whose album tag or folder matches this name
    #[arg(long)]
    album: Option<String>,

    /// Minimum fuzzy score to accept a match (default: 92)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    min_score: Option<u8>,

    /// Fuzzy similarity backend (default: token-set)
    #[arg(long, value_enum)]
    scorer: Option<ScorerKind>,

    /// Browser headers exported from music.youtube.com (required for ytmusic)
    #[arg(long)]
    headers: Option<PathBuf>,

    /// The config file to use
    #[arg(short, long, env = "PLAYLIST_TO_FOLDER_CONFIG")]
    config: Option<PathBuf>,

    /// Spotify app client ID
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    spotify_client_id: Option<String>,

    /// Spotify app client secret (only needed with `--spotify-auth app`)
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    spotify_client_secret: Option<String>,

    /// Sign in as a user (private playlists) or use an app token (default: user)
    #[arg(long, value_enum, env = "SPOTIFY_AUTH")]
    spotify_auth: Option<SpotifyAuthMode>,

    /// Redirect URI registered for the Spotify app (default: http://127.0.0.1:8888/callback)
    #[arg(long, env = "SPOTIFY_REDIRECT_URI")]
    spotify_redirect_uri: Option<String>,

    /// Write a JSON report of the run to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log filter, e.g. `info` or `playlist_to_folder=debug`
    #[arg(long, default_value = "warn", env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP gRPC endpoint to export traces to
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,
}

/// Everything a run needs, validated before any work starts.
struct RunSettings {
    library: PathBuf,
    album_filter: Option<AlbumFilter>,
    source: Box<dyn PlaylistSource>,
    playlist_id: String,
    options: ReconcileOptions,
    report: Option<PathBuf>,
}

fn absolute(path: &Path) -> PathBuf {
    let expanded = expand_path(&path.to_string_lossy());
    std::path::absolute(&expanded).unwrap_or(expanded)
}

fn build_source(args: &Args, config: &Config) -> Result<Box<dyn PlaylistSource>, ConfigurationError> {
    match args.source {
        SourceKind::Spotify => Ok(Box::new(SpotifyPlaylistSource::new(spotify_auth(
            args, config,
        )?))),
        SourceKind::Ytmusic => {
            let headers = args
                .headers
                .as_deref()
                .map(absolute)
                .or_else(|| config.ytmusic_headers_path())
                .ok_or(ConfigurationError::MissingHeadersFlag)?;
            Ok(Box::new(YtMusicPlaylistSource::from_headers_file(&headers)?))
        }
    }
}

/// The user sign-in listens on the redirect URI, so it must be a plain
/// `http` URL with a host.
fn parse_redirect_uri(uri: &str) -> Result<Url, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidRedirectUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(uri).map_err(|e| invalid(&e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid("only http redirect URIs can be served locally"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(url)
}

fn spotify_auth(args: &Args, config: &Config) -> Result<SpotifyAuth, ConfigurationError> {
    let from_file = config.spotify.clone().unwrap_or_default();
    let client_id = args
        .spotify_client_id
        .clone()
        .or(from_file.client_id)
        .filter(|id| !id.is_empty())
        .ok_or(ConfigurationError::MissingSpotifyClientId)?;

    match args.spotify_auth.or(from_file.auth).unwrap_or_default() {
        SpotifyAuthMode::User => {
            let redirect_uri = parse_redirect_uri(
                args.spotify_redirect_uri
                    .as_deref()
                    .or(from_file.redirect_uri.as_deref())
                    .unwrap_or(DEFAULT_REDIRECT_URI),
            )?;
            let cache_path = TokenCache::default_path()
                .unwrap_or_else(|| PathBuf::from(".spotify_token.json"));
            Ok(SpotifyAuth::User(UserAuthorization::new(
                client_id,
                redirect_uri,
                TokenCache::new(cache_path),
            )))
        }
        SpotifyAuthMode::App => {
            let client_secret = args
                .spotify_client_secret
                .clone()
                .or(from_file.client_secret)
                .filter(|secret| !secret.is_empty())
                .ok_or(ConfigurationError::MissingSpotifyClientSecret)?;
            Ok(SpotifyAuth::App(SpotifyApiCredentials::new(
                client_id,
                client_secret,
            )))
        }
    }
}

fn resolve_settings(args: &Args, config: &Config) -> Result<RunSettings, ConfigurationError> {
    let library = absolute(&args.library);
    if !library.is_dir() {
        return Err(ConfigurationError::LibraryNotFound(library));
    }

    let source = build_source(args, config)?;
    let playlist_id = match args.source {
        SourceKind::Spotify => playlist_ref::spotify_playlist_id(&args.playlist),
        SourceKind::Ytmusic => playlist_ref::ytmusic_playlist_id(&args.playlist),
    };

    let options = ReconcileOptions {
        out_dir: absolute(&args.out),
        mode: args.mode.or(config.mode).unwrap_or_default(),
        min_score: args.min_score.or(config.min_score).unwrap_or(DEFAULT_MIN_SCORE),
        scorer: args.scorer.or(config.scorer).unwrap_or_default(),
    };

    Ok(RunSettings {
        library,
        album_filter: args.album.as_deref().and_then(AlbumFilter::new),
        source,
        playlist_id,
        options,
        report: args.report.as_deref().map(absolute),
    })
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(&absolute(path))?,
        None => Config::load()?,
    };
    let settings = resolve_settings(&args, &config)?;

    log::debug!(
        "Reconciling {} playlist {} against {}",
        args.source,
        settings.playlist_id,
        settings.library.display()
    );

    println!("[*] Source: {}", args.source);
    let report = reconcile::run(
        &WalkDirSource::new(&settings.library),
        &FileTagReader,
        settings.album_filter.as_ref(),
        settings.source.as_ref(),
        &settings.playlist_id,
        &settings.options,
    )
    .await
    .wrap_err_with(|| format!("Failed to reconcile {} playlist", args.source))?;

    report.print_summary();
    if let Some(path) = &settings.report {
        report.write_json(path)?;
        println!("Report written: {}", path.display());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(
        env!("CARGO_PKG_NAME"),
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    let result = run(args).await;
    shutdown_tracing(tracer_provider);

    if let Err(report) = &result
        && let Some(error) = report.downcast_ref::<ConfigurationError>()
    {
        eprintln!("[ERR] {}", error);
        std::process::exit(2);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpotifyConfig;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "playlist-to-folder",
            "--source",
            "ytmusic",
            "--playlist",
            "https://music.youtube.com/playlist?list=PLabc",
            "--library",
            "/music",
            "--out",
            "/out",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_min_score_range_is_enforced() {
        assert_eq!(parse(&["--min-score", "100"]).min_score, Some(100));
        let argv = [
            "playlist-to-folder",
            "--source",
            "spotify",
            "--playlist",
            "x",
            "--library",
            "/music",
            "--out",
            "/out",
            "--min-score",
            "101",
        ];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_missing_library_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = parse(&[]);
        args.library = dir.path().join("absent");

        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::LibraryNotFound(_))
        ));
    }

    #[test]
    fn test_ytmusic_requires_headers() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = parse(&[]);
        args.library = dir.path().to_path_buf();

        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::MissingHeadersFlag)
        ));

        args.headers = Some(dir.path().join("headers.json"));
        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::HeadersNotFound(_))
        ));
    }

    #[test]
    fn test_settings_merge_cli_over_config_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let headers = dir.path().join("headers.json");
        std::fs::write(&headers, r#"{"Cookie": "SAPISID=abc"}"#).unwrap();
        let mut args = parse(&["--mode", "move"]);
        args.library = dir.path().to_path_buf();
        args.headers = Some(headers);
        let config = Config {
            min_score: Some(80),
            mode: Some(PlacementMode::Copy),
            ..Default::default()
        };

        let settings = resolve_settings(&args, &config).unwrap();

        assert_eq!(settings.playlist_id, "PLabc");
        assert_eq!(settings.options.mode, PlacementMode::Move);
        assert_eq!(settings.options.min_score, 80);
        assert_eq!(settings.options.scorer, ScorerKind::TokenSet);
        assert!(settings.options.out_dir.is_absolute());
    }

    fn spotify_args(library: &Path) -> Args {
        let mut args = parse(&[]);
        args.source = SourceKind::Spotify;
        args.library = library.to_path_buf();
        args.spotify_client_id = None;
        args.spotify_client_secret = None;
        args.spotify_auth = None;
        args.spotify_redirect_uri = None;
        args
    }

    #[test]
    fn test_spotify_requires_client_id() {
        let dir = tempfile::tempdir().unwrap();
        let args = spotify_args(dir.path());

        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::MissingSpotifyClientId)
        ));
    }

    #[test]
    fn test_spotify_user_sign_in_is_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = spotify_args(dir.path());
        args.spotify_client_id = Some("id".into());

        assert!(matches!(
            spotify_auth(&args, &Config::default()),
            Ok(SpotifyAuth::User(_))
        ));
        assert!(resolve_settings(&args, &Config::default()).is_ok());
    }

    #[test]
    fn test_spotify_app_token_needs_secret() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = spotify_args(dir.path());
        args.spotify_client_id = Some("id".into());
        args.spotify_auth = Some(SpotifyAuthMode::App);

        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::MissingSpotifyClientSecret)
        ));

        args.spotify_client_secret = Some("secret".into());
        assert!(matches!(
            spotify_auth(&args, &Config::default()),
            Ok(SpotifyAuth::App(_))
        ));
    }

    #[test]
    fn test_spotify_settings_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let args = spotify_args(dir.path());
        let config = Config {
            spotify: Some(SpotifyConfig {
                client_id: Some("id".into()),
                client_secret: Some("secret".into()),
                auth: Some(SpotifyAuthMode::App),
                redirect_uri: None,
            }),
            ..Default::default()
        };

        assert!(matches!(
            spotify_auth(&args, &config),
            Ok(SpotifyAuth::App(_))
        ));
    }

    #[test]
    fn test_spotify_redirect_uri_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = spotify_args(dir.path());
        args.spotify_client_id = Some("id".into());

        args.spotify_redirect_uri = Some("https://example.com/callback".into());
        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::InvalidRedirectUri { .. })
        ));

        args.spotify_redirect_uri = Some("not a url".into());
        assert!(matches!(
            resolve_settings(&args, &Config::default()),
            Err(ConfigurationError::InvalidRedirectUri { .. })
        ));

        assert_eq!(
            parse_redirect_uri("http://localhost:9000/cb").unwrap().port(),
            Some(9000)
        );
    }
}

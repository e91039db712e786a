//! Drives one reconciliation run: index the library, fetch the playlist,
//! resolve every track and place the matched files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use tracing::instrument;

use crate::library::tags::TagReader;
use crate::library::walk::FileSource;
use crate::library::{AlbumFilter, LocalIndex, build_index};
use crate::matching::scorer::ScorerKind;
use crate::matching::{MatchResult, Matcher};
use crate::normalize::make_key;
use crate::placement::{PlacementError, PlacementMode, place};
use crate::ports::playlist::{PlaylistSource, PlaylistTrack, SourceFetchError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to fetch playlist: {0}")]
    SourceFetch(#[from] SourceFetchError),
    #[error("Failed to place matched file: {0}")]
    Placement(#[from] PlacementError),
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub out_dir: PathBuf,
    pub mode: PlacementMode,
    pub min_score: u8,
    pub scorer: ScorerKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub destination: PathBuf,
    pub matched: usize,
    /// Subset of `matched` that needed the fuzzy fallback
    pub fuzzy_matched: usize,
    pub missing: usize,
    /// Tracks whose artist and title both normalize to nothing
    pub skipped: usize,
    pub files_written: Vec<PathBuf>,
    pub missing_tracks: Vec<PlaylistTrack>,
    pub skipped_tracks: Vec<PlaylistTrack>,
}

impl ReconcileReport {
    pub fn print_summary(&self) {
        println!("\n=== Done ===");
        println!("Matched tracks: {}", self.matched);
        println!("Missing tracks: {}", self.missing);
        println!("Skipped tracks: {}", self.skipped);
        println!("Files written:  {}", self.files_written.len());
        println!("Output folder:  {}", self.destination.display());
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).wrap_err("Failed to serialize report")?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
        Ok(())
    }
}

/// Full run: build the index once, fetch the playlist, then reconcile.
#[instrument(skip_all, fields(playlist_id = %playlist_id))]
pub async fn run(
    files: &impl FileSource,
    tag_reader: &impl TagReader,
    album_filter: Option<&AlbumFilter>,
    source: &dyn PlaylistSource,
    playlist_id: &str,
    options: &ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
    println!("[*] Indexing local library (reading tags)...");
    let index = build_index(files, tag_reader, album_filter);
    println!(
        "[*] Indexed {} files, {} unique keys",
        index.file_count(),
        index.len()
    );
    if index.is_empty() {
        tracing::warn!("No taggable audio files found in the library; every track will be missing");
        println!("[!] The library index is empty");
    }

    println!("[*] Fetching playlist tracks...");
    let tracks = source.fetch_tracks(playlist_id).await?;
    println!("[*] Playlist contains {} tracks", tracks.len());

    Ok(reconcile_tracks(&index, &tracks, options)?)
}

/// Resolve each track in playlist order and place every file of each match.
pub fn reconcile_tracks(
    index: &LocalIndex,
    tracks: &[PlaylistTrack],
    options: &ReconcileOptions,
) -> Result<ReconcileReport, PlacementError> {
    let scorer = options.scorer.scorer();
    let matcher = Matcher::new(index, scorer.as_ref(), options.min_score);
    let mut moved_sources: HashSet<&Path> = HashSet::new();
    let mut report = ReconcileReport {
        destination: options.out_dir.clone(),
        ..Default::default()
    };

    tracing::debug!(scorer = %options.scorer, min_score = options.min_score, mode = %options.mode, "Resolving tracks");

    for track in tracks {
        let query_key = make_key(&track.artist, &track.title);
        if query_key.is_empty() {
            println!("[SKIP] {} (nothing to match on)", track);
            report.skipped += 1;
            report.skipped_tracks.push(track.clone());
            continue;
        }

        let MatchResult::Matched {
            entries,
            key,
            exact,
            score,
        } = matcher.resolve(&query_key)
        else {
            println!("[MISS] {}", track);
            report.missing += 1;
            report.missing_tracks.push(track.clone());
            continue;
        };

        for entry in entries {
            if options.mode == PlacementMode::Move && !moved_sources.insert(entry.path.as_path()) {
                tracing::debug!("{} was already moved this run", entry.path.display());
                continue;
            }
            let destination = place(&entry.path, &options.out_dir, options.mode)?;
            report.files_written.push(destination);
        }

        report.matched += 1;
        if exact {
            println!("[OK]   {}  -> {} file(s)", track, entries.len());
        } else {
            report.fuzzy_matched += 1;
            println!(
                "[OK]   {}  -> {} file(s) (fuzzy {:.1}: {})",
                track,
                entries.len(),
                score,
                key
            );
        }
    }

    tracing::info!(
        matched = report.matched,
        fuzzy = report.fuzzy_matched,
        missing = report.missing,
        skipped = report.skipped,
        files = report.files_written.len(),
        "Reconciliation finished"
    );

    Ok(report)
}

//! Local library index keyed by normalized (artist, title) identity.

pub mod tags;
pub mod walk;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::normalize::{make_key, normalize_text};
use tags::TagReader;
use walk::FileSource;

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "m4a", "aac", "ogg", "opus", "wav", "alac", "aiff",
];

/// Lowercased extension of `path` if it is a recognized audio extension.
pub fn audio_extension(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    AUDIO_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// One audio file discovered under the library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub path: PathBuf,
    pub extension: String,
    /// Tag title, or the file stem when the tag is empty
    pub title: String,
    /// Tag artist, or the album artist when the tag is empty
    pub artist: String,
    pub album: String,
}

/// Restricts an index build to a single album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumFilter {
    normalized: String,
}

impl AlbumFilter {
    /// Returns `None` when the album name normalizes to nothing, in which
    /// case no filtering applies.
    pub fn new(album: &str) -> Option<Self> {
        let normalized = normalize_text(album);
        (!normalized.is_empty()).then_some(Self { normalized })
    }

    pub fn as_str(&self) -> &str {
        &self.normalized
    }

    /// An entry passes when its album tag normalizes to the filter, or when
    /// the filter text appears inside its normalized parent directory path.
    pub fn accepts(&self, album_tag: &str, parent: &Path) -> bool {
        if !album_tag.is_empty() && normalize_text(album_tag) == self.normalized {
            return true;
        }
        normalize_text(&parent.to_string_lossy()).contains(&self.normalized)
    }
}

/// Multi-map from normalized key to the library entries that share it.
///
/// Entries under one key keep discovery order and are never deduplicated:
/// two rips of the same track both stay reachable. Keys are remembered in
/// first-seen order, which is the iteration order used for fuzzy search.
#[derive(Debug, Clone, Default)]
pub struct LocalIndex {
    entries: HashMap<String, Vec<LibraryEntry>>,
    keys: Vec<String>,
}

impl LocalIndex {
    fn insert(&mut self, key: String, entry: LibraryEntry) {
        match self.entries.get_mut(&key) {
            Some(list) => list.push(entry),
            None => {
                self.keys.push(key.clone());
                self.entries.insert(key, vec![entry]);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[LibraryEntry]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn get_key_value(&self, key: &str) -> Option<(&str, &[LibraryEntry])> {
        self.entries
            .get_key_value(key)
            .map(|(key, entries)| (key.as_str(), entries.as_slice()))
    }

    /// All keys in first-seen order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of unique keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Total number of files across all keys.
    pub fn file_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, LibraryEntry)> for LocalIndex {
    fn from_iter<I: IntoIterator<Item = (String, LibraryEntry)>>(iter: I) -> Self {
        let mut index = LocalIndex::default();
        for (key, entry) in iter {
            index.insert(key, entry);
        }
        index
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build a [`LocalIndex`] from every audio file `files` yields.
///
/// Tag read failures are treated as empty tags. Files that are filtered out
/// by `album_filter`, or whose key is empty, never reach the index.
#[instrument(skip_all, fields(album_filter = album_filter.map(AlbumFilter::as_str)))]
pub fn build_index(
    files: &impl FileSource,
    tag_reader: &impl TagReader,
    album_filter: Option<&AlbumFilter>,
) -> LocalIndex {
    let mut index = LocalIndex::default();
    let mut filtered_out = 0usize;
    let mut unkeyable = 0usize;

    for path in files.files() {
        let Some(extension) = audio_extension(&path) else {
            continue;
        };

        let tags = tag_reader.read_tags(&path);
        let title = if tags.title.is_empty() {
            file_stem(&path)
        } else {
            tags.title
        };
        let artist = if tags.artist.is_empty() {
            tags.album_artist
        } else {
            tags.artist
        };

        if let Some(filter) = album_filter {
            let parent = path.parent().unwrap_or_else(|| Path::new(""));
            if !filter.accepts(&tags.album, parent) {
                filtered_out += 1;
                continue;
            }
        }

        let key = make_key(&artist, &title);
        if key.is_empty() {
            tracing::debug!("Dropping unkeyable file {}", path.display());
            unkeyable += 1;
            continue;
        }

        index.insert(
            key,
            LibraryEntry {
                path,
                extension,
                title,
                artist,
                album: tags.album,
            },
        );
    }

    tracing::info!(
        files = index.file_count(),
        keys = index.len(),
        filtered_out,
        unkeyable,
        "Library index built"
    );

    index
}

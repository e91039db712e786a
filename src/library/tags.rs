use std::path::Path;

use audiotags::Tag;
use lofty::file::TaggedFileExt;
use lofty::tag::ItemKey;

/// The embedded tags the index cares about. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
}

/// Reads embedded metadata from an audio file.
///
/// Implementations never fail: unreadable or unsupported files yield
/// [`TrackTags::default`].
#[cfg_attr(test, mockall::automock)]
pub trait TagReader {
    fn read_tags(&self, path: &Path) -> TrackTags;
}

/// Extensions `audiotags` can parse (ID3, FLAC/Vorbis comments, MP4 atoms).
const AUDIOTAGS_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a"];

/// [`TagReader`] for every recognized audio format.
///
/// MP3, FLAC and M4A go through `audiotags` first. Everything else (Ogg
/// Vorbis, Opus, AAC, WAV, AIFF, ALAC) and any file `audiotags` rejects is
/// read with `lofty`, which detects the container from the file contents.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTagReader;

impl TagReader for FileTagReader {
    fn read_tags(&self, path: &Path) -> TrackTags {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if AUDIOTAGS_EXTENSIONS.contains(&extension.as_str()) {
            match read_with_audiotags(path) {
                Ok(tags) => return tags,
                Err(e) => {
                    tracing::debug!("audiotags could not read {}: {}", path.display(), e)
                }
            }
        }

        read_with_lofty(path).unwrap_or_else(|e| {
            tracing::debug!("Unable to read tags from {}: {}", path.display(), e);
            TrackTags::default()
        })
    }
}

fn read_with_audiotags(path: &Path) -> audiotags::Result<TrackTags> {
    let tag = Tag::new().read_from_path(path)?;
    let owned = |value: Option<&str>| value.map(str::to_string).unwrap_or_default();

    Ok(TrackTags {
        title: owned(tag.title()),
        artist: owned(tag.artist()),
        album_artist: owned(tag.album_artist()),
        album: owned(tag.album_title()),
    })
}

fn read_with_lofty(path: &Path) -> Result<TrackTags, lofty::error::LoftyError> {
    let mut file = std::fs::File::open(path)?;
    let tagged_file = lofty::read_from(&mut file)?;
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return Ok(TrackTags::default());
    };
    let text = |key: ItemKey| tag.get_string(key).map(str::to_string).unwrap_or_default();

    Ok(TrackTags {
        title: text(ItemKey::TrackTitle),
        artist: text(ItemKey::TrackArtist),
        album_artist: text(ItemKey::AlbumArtist),
        album: text(ItemKey::AlbumTitle),
    })
}

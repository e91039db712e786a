use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlacementMode {
    #[default]
    Copy,
    Move,
}

impl std::fmt::Display for PlacementMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementMode::Copy => write!(f, "copy"),
            PlacementMode::Move => write!(f, "move"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("File system error during {operation} on {path}: {error_message}")]
    FileSystemError {
        operation: String,
        path: String,
        error_message: String,
    },
}

fn fs_error(operation: &str, path: impl AsRef<Path>, error: std::io::Error) -> PlacementError {
    PlacementError::FileSystemError {
        operation: operation.to_string(),
        path: path.as_ref().display().to_string(),
        error_message: error.to_string(),
    }
}

/// First free destination for `src` inside `dest_dir`: the plain file name,
/// then `"{stem} (1).{ext}"`, `"{stem} (2).{ext}"`, ...
pub fn free_destination(src: &Path, dest_dir: &Path) -> PathBuf {
    let file_name = src.file_name().unwrap_or(src.as_os_str());
    let plain = dest_dir.join(file_name);
    if !plain.exists() {
        return plain;
    }

    let stem = src
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = src
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dest_dir.join(format!("{} ({}){}", stem, n, extension)))
        .find(|candidate| !candidate.exists())
        .unwrap_or(plain)
}

/// Copy or move `src` into `dest_dir`, creating the directory if needed.
/// Never overwrites: a name collision gets a numeric suffix. Returns the
/// final destination path.
pub fn place(src: &Path, dest_dir: &Path, mode: PlacementMode) -> Result<PathBuf, PlacementError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| fs_error("create directory", dest_dir, e))?;

    let destination = free_destination(src, dest_dir);
    let pair = format!("{} -> {}", src.display(), destination.display());

    match mode {
        PlacementMode::Copy => {
            log::debug!("Copying {}", pair);
            copy_preserving_mtime(src, &destination).map_err(|e| fs_error("copy file", &pair, e))?;
        }
        PlacementMode::Move => {
            log::debug!("Moving {}", pair);
            // Rename is only possible within one filesystem
            if std::fs::rename(src, &destination).is_err() {
                log::debug!("Rename failed, copying file across filesystems");
                copy_preserving_mtime(src, &destination)
                    .map_err(|e| fs_error("copy file", &pair, e))?;
                std::fs::remove_file(src).map_err(|e| fs_error("remove file", src, e))?;
            }
        }
    }

    Ok(destination)
}

fn copy_preserving_mtime(src: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::copy(src, destination)?;

    let modified = std::fs::metadata(src).and_then(|metadata| metadata.modified());
    let applied = modified.and_then(|modified| {
        File::options()
            .write(true)
            .open(destination)
            .and_then(|file| file.set_modified(modified))
    });
    if let Err(e) = applied {
        log::debug!(
            "Could not carry modification time over to {}: {}",
            destination.display(),
            e
        );
    }

    Ok(())
}

use std::path::PathBuf;

use walkdir::WalkDir;

/// Produces the candidate file paths for an index build.
pub trait FileSource {
    fn files(&self) -> impl Iterator<Item = PathBuf> + '_;
}

/// Recursive walk of a directory tree. Symlinks are not followed and
/// unreadable directories are skipped with a warning.
#[derive(Debug, Clone)]
pub struct WalkDirSource {
    root: PathBuf,
}

impl WalkDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl FileSource for WalkDirSource {
    fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable library entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
    }
}

/// A fixed list of paths, yielded in order.
#[derive(Debug, Clone, Default)]
pub struct StaticFileSource {
    paths: Vec<PathBuf>,
}

impl StaticFileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

impl FileSource for StaticFileSource {
    fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.paths.iter().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_walkdir_source_yields_nested_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("Artist").join("Album");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("root.mp3"), b"").unwrap();
        std::fs::write(nested.join("01.flac"), b"").unwrap();
        std::fs::write(nested.join("cover.jpg"), b"").unwrap();

        let files: HashSet<PathBuf> = WalkDirSource::new(dir.path()).files().collect();

        assert_eq!(files.len(), 3);
        assert!(files.contains(&dir.path().join("root.mp3")));
        assert!(files.contains(&nested.join("01.flac")));
        assert!(!files.contains(&nested));
    }

    #[test]
    fn test_static_source_preserves_order() {
        let source = StaticFileSource::new(vec!["b.mp3".into(), "a.mp3".into()]);
        let files: Vec<PathBuf> = source.files().collect();
        assert_eq!(files, vec![PathBuf::from("b.mp3"), PathBuf::from("a.mp3")]);
    }
}

//! Poster image discovery
//!
//! Resolves the CLI input path to a list of poster images: either a single
//! image file (with extension validation) or all images directly inside a
//! directory, sorted by path.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Supported poster image extensions (lowercase)
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// Poster scan errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// File exists but has an unsupported extension
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Poster image scanner
pub struct FileScanner;

impl FileScanner {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a file or directory path to a sorted list of poster images.
    ///
    /// A single file must carry a supported extension; a directory yields
    /// every supported image directly inside it (no recursion into
    /// subdirectories). An empty directory is not an error.
    pub fn scan(&self, path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !path.exists() {
            return Err(ScanError::PathNotFound(path.to_path_buf()));
        }

        if path.is_file() {
            if Self::is_image_path(path) {
                return Ok(vec![path.to_path_buf()]);
            }
            return Err(ScanError::UnsupportedFormat(path.to_path_buf()));
        }

        let mut images: Vec<PathBuf> = WalkDir::new(path)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path().to_path_buf())
            .filter(|path| Self::is_image_path(path))
            .collect();

        images.sort();

        tracing::debug!(
            path = %path.display(),
            count = images.len(),
            "Poster scan complete"
        );

        Ok(images)
    }

    /// Check the file extension against the supported set, case-insensitive
    fn is_image_path(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_missing_path_rejected() {
        let scanner = FileScanner::new();
        let result = scanner.scan(Path::new("/nonexistent/poster.jpg"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poster.txt");
        File::create(&path).unwrap();

        let scanner = FileScanner::new();
        let result = scanner.scan(&path);
        assert!(matches!(result, Err(ScanError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_single_image_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poster.JPG");
        File::create(&path).unwrap();

        let scanner = FileScanner::new();
        let images = scanner.scan(&path).unwrap();
        assert_eq!(images, vec![path]);
    }

    #[test]
    fn test_directory_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpeg", "notes.txt", "c.tiff"] {
            File::create(dir.path().join(name)).unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested/d.jpg")).unwrap();

        let scanner = FileScanner::new();
        let images = scanner.scan(dir.path()).unwrap();

        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        // nested/d.jpg excluded, notes.txt filtered, rest sorted
        assert_eq!(names, vec!["a.jpeg", "b.png", "c.tiff"]);
    }

    #[test]
    fn test_empty_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FileScanner::new();
        assert!(scanner.scan(dir.path()).unwrap().is_empty());
    }
}

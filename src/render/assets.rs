//! Local asset resolution for uploaded images and attachments.

use std::path::PathBuf;

/// Reads uploaded files referenced by step content.
///
/// Upload URLs carry the stored filename as their last path segment;
/// the file itself lives directly under the upload root.
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Whether a URL points at a locally uploaded file.
    pub fn is_local_reference(url: &str) -> bool {
        url.contains("/uploads/")
    }

    /// The filename component of an upload URL.
    pub fn filename_of(url: &str) -> &str {
        url.rsplit('/').next().unwrap_or(url)
    }

    /// Read an uploaded file by name. Returns None when the file is missing
    /// or unreadable.
    pub async fn read(&self, filename: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.root.join(filename)).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_reference_detection() {
        assert!(AssetStore::is_local_reference(
            "http://localhost:8080/uploads/logo.png"
        ));
        assert!(AssetStore::is_local_reference("/uploads/logo.png"));
        assert!(!AssetStore::is_local_reference(
            "https://cdn.example.com/logo.png"
        ));
    }

    #[test]
    fn filename_of_takes_last_segment() {
        assert_eq!(
            AssetStore::filename_of("http://localhost:8080/uploads/logo.png"),
            "logo.png"
        );
        assert_eq!(AssetStore::filename_of("logo.png"), "logo.png");
    }

    #[tokio::test]
    async fn read_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("logo.png"), b"png bytes").unwrap();
        let assets = AssetStore::new(dir.path());

        assert_eq!(assets.read("logo.png").await.unwrap(), b"png bytes");
        assert!(assets.read("missing.png").await.is_none());
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

// Extensions accepted for product images, matched case-insensitively.
static ALLOWED_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(jpe?g|png|gif|webp)$").expect("allowed extension pattern is valid")
});

/// Filesystem store for product images.
///
/// Files are renamed to `<uuid>.<ext>` on save so uploaded names never
/// reach the filesystem, and are served back under `/media/products/`.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    public_base: Url,
}

impl ImageStore {
    pub fn new(root: PathBuf, mut public_base: Url) -> Self {
        if !public_base.path().ends_with('/') {
            let path = format!("{}/", public_base.path());
            public_base.set_path(&path);
        }
        Self { root, public_base }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.public_base_url)
            .map_err(|e| anyhow::anyhow!("invalid public_base_url: {}", e))?;
        Ok(Self::new(PathBuf::from(&config.media_dir), base))
    }

    /// Directory the store writes into, for mounting the static file route.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Saves image bytes under a fresh name, returning the stored file name.
    /// The extension is taken from the uploaded file name and must be on the
    /// allow-list.
    pub async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String, ServiceError> {
        let extension = Path::new(original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                ServiceError::ValidationError("Image file name has no extension".to_string())
            })?;

        if !ALLOWED_EXTENSION.is_match(&extension) {
            return Err(ServiceError::ValidationError(format!(
                "Unsupported image type: {}",
                extension
            )));
        }

        let stored_name = format!("{}.{}", Uuid::new_v4().simple(), extension);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ServiceError::InternalError(format!("Failed to create media dir: {}", e)))?;
        tokio::fs::write(self.root.join(&stored_name), bytes)
            .await
            .map_err(|e| ServiceError::InternalError(format!("Failed to store image: {}", e)))?;

        Ok(stored_name)
    }

    /// Best-effort removal of a stored image. Missing files and IO errors
    /// are logged, never surfaced; the database row is the source of truth.
    pub async fn delete(&self, stored_name: &str) {
        // Stored names are generated by save(); anything with path
        // separators did not come from us.
        if stored_name.contains('/') || stored_name.contains('\\') || stored_name.contains("..") {
            warn!("Refusing to delete suspicious image name: {}", stored_name);
            return;
        }

        match tokio::fs::remove_file(self.root.join(stored_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete image {}: {}", stored_name, e),
        }
    }

    /// Public URL a stored image is served from.
    pub fn url_for(&self, stored_name: &str) -> String {
        self.public_base
            .join(&format!("media/products/{}", stored_name))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}media/products/{}", self.public_base, stored_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ImageStore {
        ImageStore::new(
            dir.path().to_path_buf(),
            Url::parse("http://localhost:8080").unwrap(),
        )
    }

    #[tokio::test]
    async fn save_renames_and_keeps_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let stored = store.save("photo.JPG", b"fake image bytes").await.unwrap();

        assert!(stored.ends_with(".jpg"));
        assert_ne!(stored, "photo.JPG");
        assert!(dir.path().join(&stored).exists());
    }

    #[tokio::test]
    async fn save_rejects_disallowed_extension() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let result = store.save("payload.svg", b"<svg/>").await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let result = store.save("noextension", b"bytes").await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let stored = store.save("photo.png", b"bytes").await.unwrap();
        store.delete(&stored).await;
        assert!(!dir.path().join(&stored).exists());

        // Second delete of the same name must not error.
        store.delete(&stored).await;
    }

    #[tokio::test]
    async fn delete_ignores_traversal_names() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let outside = dir.path().join("outside.txt");
        tokio::fs::write(&outside, b"keep me").await.unwrap();

        store.delete("../outside.txt").await;
        assert!(outside.exists());
    }

    #[test]
    fn url_for_joins_base_and_name() {
        let store = ImageStore::new(
            PathBuf::from("media/products"),
            Url::parse("http://shop.example.com").unwrap(),
        );
        assert_eq!(
            store.url_for("abc123.png"),
            "http://shop.example.com/media/products/abc123.png"
        );
    }

    #[test]
    fn url_for_handles_trailing_slash_base() {
        let store = ImageStore::new(
            PathBuf::from("media/products"),
            Url::parse("http://shop.example.com/").unwrap(),
        );
        assert_eq!(
            store.url_for("abc123.png"),
            "http://shop.example.com/media/products/abc123.png"
        );
    }
}

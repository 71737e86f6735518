use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::config::MediaConfig;
use crate::constants::media::IMAGES_DIR;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,

    #[error("The submitted file is empty.")]
    Empty,

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Stores uploaded user images below `<media root>/images` under random
/// names. Stored paths are relative to the media root.
#[derive(Clone)]
pub struct ImageStore {
    root: PathBuf,
    allowed_extensions: Vec<String>,
}

impl ImageStore {
    #[must_use]
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            root: PathBuf::from(&config.root),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Picks the file extension from the client filename, falling back to
    /// the declared content type.
    fn extension_for(&self, filename: Option<&str>, content_type: Option<&str>) -> Option<String> {
        let from_name = filename
            .and_then(|name| Path::new(name).extension())
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        if let Some(ext) = from_name {
            return self.allowed_extensions.contains(&ext).then_some(ext);
        }

        content_type
            .and_then(mime_guess::get_mime_extensions_str)?
            .iter()
            .find(|e| self.allowed_extensions.iter().any(|a| a == *e))
            .map(|e| (*e).to_string())
    }

    pub async fn save(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
        content_type: Option<&str>,
    ) -> Result<String, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if content_type.is_some_and(|ct| !ct.starts_with("image/")) {
            return Err(ImageError::NotAnImage);
        }
        let extension = self
            .extension_for(filename, content_type)
            .ok_or(ImageError::NotAnImage)?;

        let images_dir = self.root.join(IMAGES_DIR);
        if !images_dir.exists() {
            fs::create_dir_all(&images_dir)
                .await
                .with_context(|| format!("Failed to create {}", images_dir.display()))?;
        }

        let name = format!("{}.{extension}", uuid::Uuid::new_v4().simple());
        let file_path = images_dir.join(&name);

        fs::write(&file_path, bytes)
            .await
            .with_context(|| format!("Failed to write image to {}", file_path.display()))?;

        info!(path = %file_path.display(), size = bytes.len(), "Stored user image");
        Ok(format!("{IMAGES_DIR}/{name}"))
    }

    /// Removes a stored file. Missing files and paths escaping the media
    /// root are logged and ignored.
    pub async fn remove(&self, relative: &str) {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            warn!(path = %relative.display(), "Refusing to remove path outside media root");
            return;
        }

        let path = self.root.join(relative);
        if let Err(e) = fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove image file");
        }
    }
}

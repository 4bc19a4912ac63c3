use std::path::{Path, PathBuf};

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Prefix of every stored image reference; also the route images are served under.
pub const PUBLIC_PREFIX: &str = "uploads";

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Post images on local disk, one flat file per upload.
pub struct ImageStore {
    dir: PathBuf,
    max_bytes: usize,
}

/// An image part that passed the type filter and has not been written yet.
#[derive(Debug)]
pub struct ImageUpload {
    pub extension: &'static str,
    pub bytes: Bytes,
}

/// Multipart body of post create/update.
#[derive(Debug, Default)]
pub struct PostForm {
    pub title: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageUpload>,
}

impl ImageStore {
    pub async fn new(dir: PathBuf, max_bytes: usize) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Write the image and return its stored reference, `uploads/<file>`.
    pub async fn save(&self, image: &ImageUpload) -> Result<String> {
        let file_name = format!(
            "image-{}-{}.{}",
            chrono::Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            image.extension
        );
        let path = self.dir.join(&file_name);

        if let Err(e) = write_file(&path, &image.bytes).await {
            discard_partial(&path).await;
            return Err(e);
        }

        debug!("Stored image {} ({} bytes)", file_name, image.bytes.len());
        Ok(format!("{PUBLIC_PREFIX}/{file_name}"))
    }

    /// Remove a previously stored image. Missing files and references that
    /// do not point into this store are ignored.
    pub async fn delete(&self, stored: &str) -> Result<()> {
        let Some(path) = self.resolve(stored) else {
            warn!("Refusing to delete image outside the store: {}", stored);
            return Ok(());
        };
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted image {}", stored);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", stored);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, stored: &str) -> Option<PathBuf> {
        let name = stored.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        let valid = !name.is_empty()
            && Path::new(name).file_name().is_some_and(|f| f == name)
            && name != ".."
            && name != ".";
        valid.then(|| self.dir.join(name))
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Remove whatever a failed write left behind.
async fn discard_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => warn!("Removed partially written image {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial image {}: {}", path.display(), e),
    }
}

/// Maps an accepted image content type to the extension it is stored under.
/// Only jpg, jpeg and png subtypes pass; parameters and case are ignored.
pub fn image_extension(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let (_, subtype) = essence.split_once('/')?;
    match subtype {
        "jpg" => Some("jpg"),
        "jpeg" => Some("jpeg"),
        "png" => Some("png"),
        _ => None,
    }
}

/// Read the post form. Rejects unknown fields and non-image files; an empty
/// file part counts as no image. Nothing is written to disk here.
pub async fn read_post_form(
    multipart: &mut Multipart,
    max_image_bytes: usize,
) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => form.title = Some(field.text().await.map_err(malformed)?),
            "content" => form.content = Some(field.text().await.map_err(malformed)?),
            "image" => {
                let extension = field.content_type().and_then(image_extension);
                let bytes = field.bytes().await.map_err(malformed)?;
                if bytes.is_empty() {
                    continue;
                }
                let extension = extension
                    .ok_or_else(|| ApiError::validation("Only image files are allowed!"))?;
                if bytes.len() > max_image_bytes {
                    return Err(ApiError::validation(format!(
                        "image exceeds the {max_image_bytes} byte limit"
                    )));
                }
                form.image = Some(ImageUpload { extension, bytes });
            }
            other => {
                return Err(ApiError::validation(format!("unexpected field '{other}'")));
            }
        }
    }

    Ok(form)
}

fn malformed(e: MultipartError) -> ApiError {
    ApiError::validation(format!("malformed multipart body: {}", e.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scratch_store() -> ImageStore {
        let dir = std::env::temp_dir().join(format!("quill_uploads_test_{}", Uuid::new_v4()));
        ImageStore::new(dir, DEFAULT_MAX_IMAGE_BYTES).await.unwrap()
    }

    #[test]
    fn test_image_extension_filter() {
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("image/jpeg"), Some("jpeg"));
        assert_eq!(image_extension("image/jpg"), Some("jpg"));
        assert_eq!(image_extension("IMAGE/PNG; charset=binary"), Some("png"));
        assert_eq!(image_extension("image/gif"), None);
        assert_eq!(image_extension("image/svg+xml"), None);
        assert_eq!(image_extension("application/pdf"), None);
        assert_eq!(image_extension("png"), None);
    }

    #[tokio::test]
    async fn test_save_then_delete() {
        let store = scratch_store().await;
        let upload = ImageUpload {
            extension: "png",
            bytes: Bytes::from_static(b"\x89PNG fake"),
        };

        let stored = store.save(&upload).await.unwrap();
        assert!(stored.starts_with("uploads/image-"));
        assert!(stored.ends_with(".png"));

        let path = store.resolve(&stored).unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"\x89PNG fake");

        store.delete(&stored).await.unwrap();
        assert!(!path.exists());
        // second delete is a no-op
        store.delete(&stored).await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_write_is_discarded() {
        let store = scratch_store().await;
        let path = store.dir().join("image-1-partial.png");
        fs::write(&path, b"\x89PN").await.unwrap();

        discard_partial(&path).await;
        assert!(!path.exists());
        // nothing left to remove
        discard_partial(&path).await;
    }

    #[tokio::test]
    async fn test_failed_save_leaves_nothing_behind() {
        let store = scratch_store().await;
        fs::remove_dir(store.dir()).await.unwrap();
        let upload = ImageUpload {
            extension: "png",
            bytes: Bytes::from_static(b"\x89PNG fake"),
        };

        assert!(store.save(&upload).await.is_err());
        assert!(!store.dir().exists());
    }

    #[tokio::test]
    async fn test_resolve_rejects_foreign_paths() {
        let store = scratch_store().await;
        assert!(store.resolve("uploads/../secret.db").is_none());
        assert!(store.resolve("uploads/a/b.png").is_none());
        assert!(store.resolve("/etc/passwd").is_none());
        assert!(store.resolve("uploads/").is_none());
        assert!(store.resolve("uploads/image-1.png").is_some());
    }
}

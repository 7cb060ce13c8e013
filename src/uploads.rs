//! Media upload storage.
//!
//! Accepted files are written under the configured upload directory,
//! sorted into one subdirectory per media kind, and served back at
//! `/uploads/...`:
//!
//! ```text
//! uploads/
//! ├── images/   image-1718000000000-123456789.png
//! ├── videos/   video-1718000000000-987654321.mp4
//! ├── audio/    audio-1718000000000-555555555.mp3
//! └── text/     file-1718000000000-111111111.txt
//! ```
//!
//! Only the MIME types in [`ALLOWED_MIME_TYPES`] are stored. Uploads are
//! streamed to disk through an [`UploadWriter`], which enforces the size
//! limit as chunks arrive and deletes the partial file if the upload does
//! not complete.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// MIME types accepted by the upload endpoint.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/mov",
    "video/avi",
    "video/wmv",
    "video/flv",
    "video/mkv",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/mp3",
    "audio/x-wav",
    "text/plain",
];

/// Media kind of an upload, used to pick its subdirectory and file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Text,
    Other,
}

impl MediaKind {
    /// Infer the kind from the MIME type, falling back to the file
    /// extension when the MIME type is generic.
    pub fn infer(mime: &str, file_name: &str) -> MediaKind {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            return MediaKind::Image;
        }
        if mime.starts_with("video/") {
            return MediaKind::Video;
        }
        if mime.starts_with("audio/") {
            return MediaKind::Audio;
        }
        if mime.starts_with("text/") {
            return MediaKind::Text;
        }
        match extension(file_name).as_deref() {
            Some(".jpg" | ".jpeg" | ".png" | ".gif" | ".webp") => MediaKind::Image,
            Some(".mp4" | ".webm" | ".mov" | ".ogv") => MediaKind::Video,
            Some(".mp3" | ".wav" | ".ogg" | ".m4a") => MediaKind::Audio,
            Some(".txt") => MediaKind::Text,
            _ => MediaKind::Other,
        }
    }

    /// Subdirectory under the upload root, empty for [`MediaKind::Other`].
    pub fn subdir(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Video => "videos",
            MediaKind::Audio => "audio",
            MediaKind::Text => "text",
            MediaKind::Other => "",
        }
    }

    /// Kind name reported to the client as `fileType`.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Text => "text",
            MediaKind::Other => "other",
        }
    }

    /// Prefix of stored file names.
    pub fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Text | MediaKind::Other => "file",
        }
    }
}

/// Lower-cased extension of `file_name` including the dot, if it has a
/// plain alphanumeric one.
fn extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// Metadata returned to the client after a successful upload.
///
/// `file_name` is the name the client sent; `stored_name` is the name on disk.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub message: String,
    pub file_name: String,
    pub stored_name: String,
    pub file_type: String,
    pub size: u64,
    pub web_path: String,
}

/// Why an upload was refused.
#[derive(Debug)]
pub enum UploadError {
    InvalidType(String),
    TooLarge { max_bytes: u64 },
    Io(std::io::Error),
}

impl UploadError {
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::InvalidType(_) => "INVALID_FILE_TYPE",
            UploadError::TooLarge { .. } => "FILE_SIZE_EXCEEDED",
            UploadError::Io(_) => "UPLOAD_FAILED",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            UploadError::InvalidType(_) => 400,
            UploadError::TooLarge { .. } => 413,
            UploadError::Io(_) => 500,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::InvalidType(mime) => write!(
                f,
                "Invalid file type: {}. Only audio, video, image, and text files are allowed.",
                mime
            ),
            UploadError::TooLarge { max_bytes } => {
                write!(f, "File size exceeds the {} limit", human_size(*max_bytes))
            }
            UploadError::Io(e) => write!(f, "File upload failed: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

/// `1073741824` -> `1GB`, `5242880` -> `5MB`, otherwise bytes.
pub fn human_size(bytes: u64) -> String {
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * MB;
    if bytes >= GB && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Create the upload root and its per-kind subdirectories.
pub fn ensure_dirs(root: &Path) -> Result<()> {
    for kind in [
        MediaKind::Image,
        MediaKind::Video,
        MediaKind::Audio,
        MediaKind::Text,
    ] {
        std::fs::create_dir_all(root.join(kind.subdir()))?;
    }
    Ok(())
}

/// Generate a unique stored name: `<prefix>-<millis>-<random><ext>`.
fn stored_name(kind: MediaKind, original_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = Uuid::new_v4().as_u128() % 1_000_000_000;
    format!(
        "{}-{}-{}{}",
        kind.prefix(),
        millis,
        random,
        extension(original_name).unwrap_or_default()
    )
}

/// An accepted upload being written to disk.
///
/// The file is removed when the writer is dropped unless
/// [`finish`](Self::finish) succeeded.
pub struct UploadWriter {
    file: Option<tokio::fs::File>,
    path: PathBuf,
    kind: MediaKind,
    original_name: String,
    stored_name: String,
    max_bytes: u64,
    written: u64,
    kept: bool,
}

/// Validate the MIME type and create the destination file under `root`.
pub async fn begin_upload(
    root: &Path,
    max_bytes: u64,
    original_name: &str,
    mime: &str,
) -> Result<UploadWriter, UploadError> {
    let mime = mime.to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(UploadError::InvalidType(mime));
    }

    let kind = MediaKind::infer(&mime, original_name);
    let dir = root.join(kind.subdir());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(UploadError::Io)?;

    let stored_name = stored_name(kind, original_name);
    let path = dir.join(&stored_name);
    let file = tokio::fs::File::create(&path)
        .await
        .map_err(UploadError::Io)?;

    Ok(UploadWriter {
        file: Some(file),
        path,
        kind,
        original_name: original_name.to_string(),
        stored_name,
        max_bytes,
        written: 0,
        kept: false,
    })
}

impl UploadWriter {
    /// Append `chunk`, refusing it if the upload would exceed the limit.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        let total = self.written + chunk.len() as u64;
        if total > self.max_bytes {
            return Err(UploadError::TooLarge {
                max_bytes: self.max_bytes,
            });
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| UploadError::Io(io::Error::other("upload already closed")))?;
        file.write_all(chunk).await.map_err(UploadError::Io)?;
        self.written = total;
        Ok(())
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the file and keep it.
    pub async fn finish(mut self) -> Result<StoredUpload, UploadError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(UploadError::Io)?;
        }
        self.kept = true;

        let web_path = match self.kind.subdir() {
            "" => format!("/uploads/{}", self.stored_name),
            subdir => format!("/uploads/{}/{}", subdir, self.stored_name),
        };
        log::info!("stored upload {} ({} bytes)", web_path, self.written);

        Ok(StoredUpload {
            message: "File uploaded successfully".to_string(),
            file_name: self.original_name.clone(),
            stored_name: self.stored_name.clone(),
            file_type: self.kind.as_str().to_string(),
            size: self.written,
            web_path,
        })
    }
}

impl Drop for UploadWriter {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        drop(self.file.take());
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("discarded partial upload {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "failed to remove partial upload {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_upload(
        root: &Path,
        max_bytes: u64,
        original_name: &str,
        mime: &str,
        bytes: &[u8],
    ) -> Result<StoredUpload, UploadError> {
        let mut writer = begin_upload(root, max_bytes, original_name, mime).await?;
        writer.write_chunk(bytes).await?;
        writer.finish().await
    }

    #[test]
    fn test_infer_kind() {
        assert_eq!(MediaKind::infer("image/png", "a.png"), MediaKind::Image);
        assert_eq!(MediaKind::infer("video/quicktime", "a.mov"), MediaKind::Video);
        assert_eq!(MediaKind::infer("audio/mpeg", "a.mp3"), MediaKind::Audio);
        assert_eq!(MediaKind::infer("text/plain", "a.txt"), MediaKind::Text);
        assert_eq!(
            MediaKind::infer("application/octet-stream", "clip.MP4"),
            MediaKind::Video
        );
        assert_eq!(
            MediaKind::infer("application/octet-stream", "blob"),
            MediaKind::Other
        );
    }

    #[test]
    fn test_extension_is_sanitized() {
        assert_eq!(extension("photo.JPG").as_deref(), Some(".jpg"));
        assert_eq!(extension("no_ext"), None);
        assert_eq!(extension("weird.p/ng"), None);
    }

    #[tokio::test]
    async fn test_store_upload_writes_file() {
        let tmp = TempDir::new().unwrap();
        let stored = store_upload(tmp.path(), 1024, "cat.png", "image/png", b"\x89PNG")
            .await
            .unwrap();

        assert_eq!(stored.file_name, "cat.png");
        assert!(stored.stored_name.starts_with("image-"));
        assert!(stored.stored_name.ends_with(".png"));
        assert_eq!(stored.size, 4);
        assert_eq!(stored.file_type, "image");
        assert_eq!(
            stored.web_path,
            format!("/uploads/images/{}", stored.stored_name)
        );
        let on_disk = std::fs::read(tmp.path().join("images").join(&stored.stored_name)).unwrap();
        assert_eq!(on_disk, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_text_upload_uses_file_prefix() {
        let tmp = TempDir::new().unwrap();
        let stored = store_upload(tmp.path(), 1024, "claim.txt", "text/plain", b"hello")
            .await
            .unwrap();
        assert!(stored.stored_name.starts_with("file-"));
        assert_eq!(stored.file_type, "text");
        assert!(stored.web_path.starts_with("/uploads/text/"));
    }

    #[tokio::test]
    async fn test_rejects_type_and_size() {
        let tmp = TempDir::new().unwrap();
        let err = store_upload(tmp.path(), 1024, "a.exe", "application/x-msdownload", b"MZ")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_FILE_TYPE");
        assert_eq!(err.status(), 400);

        let err = store_upload(tmp.path(), 2, "a.png", "image/png", b"abcd")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FILE_SIZE_EXCEEDED");
        assert_eq!(err.status(), 413);
        assert_eq!(std::fs::read_dir(tmp.path().join("images")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_chunked_upload_over_limit_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let mut writer = begin_upload(tmp.path(), 10, "clip.mp4", "video/mp4")
            .await
            .unwrap();
        writer.write_chunk(b"0123").await.unwrap();
        writer.write_chunk(b"4567").await.unwrap();
        assert_eq!(writer.written(), 8);

        let err = writer.write_chunk(b"89ab").await.unwrap_err();
        assert_eq!(err.code(), "FILE_SIZE_EXCEEDED");
        drop(writer);

        assert_eq!(std::fs::read_dir(tmp.path().join("videos")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_upload_is_removed() {
        let tmp = TempDir::new().unwrap();
        let mut writer = begin_upload(tmp.path(), 1024, "voice.wav", "audio/wav")
            .await
            .unwrap();
        writer.write_chunk(b"RIFF").await.unwrap();
        assert_eq!(std::fs::read_dir(tmp.path().join("audio")).unwrap().count(), 1);

        drop(writer);
        assert_eq!(std::fs::read_dir(tmp.path().join("audio")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_chunked_upload_is_kept_after_finish() {
        let tmp = TempDir::new().unwrap();
        let mut writer = begin_upload(tmp.path(), 1024, "claim.txt", "text/plain")
            .await
            .unwrap();
        writer.write_chunk(b"hello ").await.unwrap();
        writer.write_chunk(b"world").await.unwrap();
        let stored = writer.finish().await.unwrap();

        assert_eq!(stored.size, 11);
        let on_disk =
            std::fs::read_to_string(tmp.path().join("text").join(&stored.stored_name)).unwrap();
        assert_eq!(on_disk, "hello world");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(1024 * 1024 * 1024), "1GB");
        assert_eq!(human_size(5 * 1024 * 1024), "5MB");
        assert_eq!(human_size(100), "100 bytes");
    }

    #[test]
    fn test_ensure_dirs() {
        let tmp = TempDir::new().unwrap();
        ensure_dirs(tmp.path()).unwrap();
        for sub in ["images", "videos", "audio", "text"] {
            assert!(tmp.path().join(sub).is_dir());
        }
    }
}

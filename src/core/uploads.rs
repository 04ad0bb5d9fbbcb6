//! Staging of uploaded selfies on local disk.
//!
//! A staged file lives for exactly one request: handlers call
//! [`StagedUpload::remove`] when they are done, and dropping the guard
//! deletes the file on every other exit path. The periodic sweep in
//! `orchestrator::cron` only catches files orphaned by a dying process.

use crate::utils::constants::{ALLOWED_CONTENT_TYPES, ALLOWED_EXTENSIONS};
use crate::utils::hash::ChecksumWriter;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const FILE_FIELD: &str = "file";
const SNIFF_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no file provided in field 'file'")]
    MissingFile,

    #[error("unsupported file type: {0}. Allowed types: JPEG, PNG, WEBP")]
    UnsupportedType(String),

    #[error("uploaded file is empty")]
    EmptyFile,

    #[error("file exceeds the {max_bytes} byte limit")]
    TooLarge { max_bytes: usize },

    #[error("request body too large")]
    RequestTooLarge,

    #[error("file is not a readable image: {0}")]
    InvalidImage(String),

    #[error("malformed multipart body: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::RequestTooLarge
        } else {
            UploadError::Malformed(err.body_text())
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadInfo {
    pub file_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub checksum: String,
}

#[derive(Debug)]
pub struct StagedUpload {
    pub info: UploadInfo,
    path: PathBuf,
    removed: bool,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the staged file. A file already swept away counts as removed.
    pub async fn remove(mut self) -> std::io::Result<()> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("removed staged upload {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("dropped staged upload {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                "failed to remove staged upload {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// A staged file plus the text fields that came with it.
#[derive(Debug)]
pub struct StagedForm {
    pub upload: StagedUpload,
    pub fields: HashMap<String, String>,
}

pub async fn stage_form(
    multipart: &mut Multipart,
    limits: &UploadLimits,
) -> Result<StagedForm, UploadError> {
    let mut upload = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILE_FIELD && upload.is_none() {
            upload = Some(stage_field(field, limits).await?);
        } else if field.file_name().is_none() {
            let value = field.text().await?;
            fields.insert(name, value);
        }
    }

    let upload = upload.ok_or(UploadError::MissingFile)?;
    Ok(StagedForm { upload, fields })
}

async fn stage_field(
    mut field: axum::extract::multipart::Field<'_>,
    limits: &UploadLimits,
) -> Result<StagedUpload, UploadError> {
    let filename = field
        .file_name()
        .and_then(|n| Path::new(n).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let declared_type = field.content_type().map(|c| c.to_ascii_lowercase());
    let extension = validate_declared_type(&filename, declared_type.as_deref())?;

    tokio::fs::create_dir_all(&limits.dir).await?;
    let file_id = Uuid::new_v4();
    let path = limits.dir.join(format!("{}.{}", file_id, extension));

    // guard first, so every early return below deletes the partial file
    let mut staged = StagedUpload {
        info: UploadInfo {
            file_id,
            filename,
            content_type: declared_type.unwrap_or_default(),
            size_bytes: 0,
            width: 0,
            height: 0,
            checksum: String::new(),
        },
        path,
        removed: false,
    };

    let mut file = tokio::fs::File::create(&staged.path).await?;
    let mut checksum = ChecksumWriter::new();
    let mut head = Vec::with_capacity(SNIFF_LEN);
    let mut total = 0usize;

    while let Some(chunk) = field.chunk().await? {
        total += chunk.len();
        if total > limits.max_bytes {
            return Err(UploadError::TooLarge {
                max_bytes: limits.max_bytes,
            });
        }
        if head.len() < SNIFF_LEN {
            let take = (SNIFF_LEN - head.len()).min(chunk.len());
            head.extend_from_slice(&chunk[..take]);
        }
        checksum.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    if total == 0 {
        return Err(UploadError::EmptyFile);
    }

    let format = sniff_format(&head)?;
    let (width, height) = read_dimensions(&staged.path).await?;

    staged.info.content_type = format.to_mime_type().to_string();
    staged.info.size_bytes = total as u64;
    staged.info.width = width;
    staged.info.height = height;
    staged.info.checksum = checksum.finalize();

    debug!(
        "staged {} ({} bytes, {}x{}) at {}",
        staged.info.filename,
        total,
        width,
        height,
        staged.path.display()
    );
    Ok(staged)
}

/// Checks the client's claimed type and extension; returns the extension to
/// store under.
fn validate_declared_type(
    filename: &str,
    content_type: Option<&str>,
) -> Result<&'static str, UploadError> {
    let extension = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());

    if let Some(content_type) = content_type {
        if content_type != "application/octet-stream"
            && !ALLOWED_CONTENT_TYPES.contains(&content_type)
        {
            return Err(UploadError::UnsupportedType(content_type.to_string()));
        }
    }

    match extension.as_deref() {
        Some(ext) => ALLOWED_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == ext)
            .copied()
            .ok_or_else(|| UploadError::UnsupportedType(format!(".{}", ext))),
        // no extension: the declared type has to say what this is
        None => match content_type {
            Some("image/jpeg") => Ok("jpg"),
            Some("image/png") => Ok("png"),
            Some("image/webp") => Ok("webp"),
            _ => Err(UploadError::UnsupportedType(
                content_type.unwrap_or("unknown").to_string(),
            )),
        },
    }
}

fn sniff_format(head: &[u8]) -> Result<ImageFormat, UploadError> {
    match image::guess_format(head) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP)) => Ok(format),
        Ok(other) => Err(UploadError::UnsupportedType(format!("{:?}", other))),
        Err(_) => Err(UploadError::InvalidImage(
            "unrecognized image signature".to_string(),
        )),
    }
}

pub async fn read_dimensions(path: &Path) -> Result<(u32, u32), UploadError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))?
        .map_err(|e| UploadError::InvalidImage(e.to_string()))
}

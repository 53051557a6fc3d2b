//! # Subject Module
//!
//! Admission input for one image: the raw bytes plus the attributes the caller
//! knows about the file, and the typed rejection returned when admission fails.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAttributes {
    pub file_name: String,
    pub mime_type: String,
    pub file_size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A file offered to the controller for analysis.
#[derive(Debug, Clone)]
pub struct Submission {
    pub bytes: Vec<u8>,
    pub attributes: SubjectAttributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    UnsupportedType,
    TooLarge,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::UnsupportedType => "unsupported_type",
            RejectReason::TooLarge => "too_large",
        }
    }
}

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("invalid input ({}): {detail}", reason.code())]
    InvalidInput { reason: RejectReason, detail: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller has been shut down")]
    ShutDown,
}

impl AdmissionError {
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            AdmissionError::InvalidInput { reason, .. } => Some(*reason),
            AdmissionError::Io(_) | AdmissionError::ShutDown => None,
        }
    }
}

impl Submission {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, mime_type: impl Into<String>) -> Self {
        let file_size_bytes = bytes.len() as u64;
        Self {
            bytes,
            attributes: SubjectAttributes {
                file_name: file_name.into(),
                mime_type: mime_type.into(),
                file_size_bytes,
                last_modified: None,
            },
        }
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.attributes.last_modified = Some(last_modified);
        self
    }

    /// Read a file from disk, guessing the mime type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, AdmissionError> {
        let metadata = std::fs::metadata(path)?;
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(Self {
            attributes: SubjectAttributes {
                mime_type: guess_mime_type(path).to_string(),
                file_size_bytes: metadata.len().max(bytes.len() as u64),
                file_name,
                last_modified,
            },
            bytes,
        })
    }

    /// Check admission constraints without taking ownership.
    pub fn validate(&self, max_size: u64) -> Result<(), AdmissionError> {
        let mime = self.attributes.mime_type.trim().to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(AdmissionError::InvalidInput {
                reason: RejectReason::UnsupportedType,
                detail: format!("mime type {:?} is not an image", self.attributes.mime_type),
            });
        }
        let size = self.attributes.file_size_bytes.max(self.bytes.len() as u64);
        if size > max_size {
            return Err(AdmissionError::InvalidInput {
                reason: RejectReason::TooLarge,
                detail: format!("{size} bytes exceeds limit of {max_size} bytes"),
            });
        }
        Ok(())
    }
}

pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Subject bytes after Loading, with digests computed once.
#[derive(Debug)]
pub struct LoadedSubject {
    pub bytes: Arc<[u8]>,
    pub attributes: SubjectAttributes,
    pub sha256: String,
    pub md5: String,
}

impl LoadedSubject {
    pub fn load(submission: Submission) -> Self {
        Self::new(Arc::from(submission.bytes), submission.attributes)
    }

    pub fn new(bytes: Arc<[u8]>, attributes: SubjectAttributes) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = hex::encode(hasher.finalize());
        let md5 = format!("{:x}", md5::compute(&bytes));
        Self {
            bytes,
            attributes,
            sha256,
            md5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_image_mime() {
        let sub = Submission::new(b"hello".to_vec(), "notes.txt", "text/plain");
        let err = sub.validate(1024).expect_err("rejected");
        assert_eq!(err.reason(), Some(RejectReason::UnsupportedType));
    }

    #[test]
    fn rejects_declared_size_over_limit() {
        let mut sub = Submission::new(vec![0u8; 16], "big.png", "image/png");
        sub.attributes.file_size_bytes = 60 * 1024 * 1024;
        let err = sub.validate(50 * 1024 * 1024).expect_err("rejected");
        assert_eq!(err.reason(), Some(RejectReason::TooLarge));
        assert!(err.to_string().contains("too_large"));
    }

    #[test]
    fn accepts_image_within_limit() {
        let sub = Submission::new(vec![0u8; 16], "ok.jpg", "IMAGE/JPEG");
        assert!(sub.validate(1024).is_ok());
    }

    #[test]
    fn guesses_mime_from_extension() {
        assert_eq!(guess_mime_type(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(guess_mime_type(Path::new("scan.webp")), "image/webp");
        assert_eq!(guess_mime_type(Path::new("notes")), "application/octet-stream");
    }

    #[test]
    fn from_path_reads_bytes_and_attributes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");
        std::fs::write(&path, [1u8, 2, 3]).expect("write");
        let sub = Submission::from_path(&path).expect("submission");
        assert_eq!(sub.attributes.file_name, "shot.png");
        assert_eq!(sub.attributes.mime_type, "image/png");
        assert_eq!(sub.attributes.file_size_bytes, 3);
        assert!(sub.attributes.last_modified.is_some());
    }

    #[test]
    fn load_computes_digests() {
        let loaded = LoadedSubject::load(Submission::new(b"abc".to_vec(), "a.jpg", "image/jpeg"));
        assert_eq!(
            loaded.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(loaded.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(&*loaded.bytes, b"abc");
    }
}

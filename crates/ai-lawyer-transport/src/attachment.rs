//! Attachment validation and inline encoding.

use std::path::{Path, PathBuf};

use ai_lawyer_core::{AttachmentInfo, ChatConfig};
use bytes::Bytes;
use thiserror::Error;

use crate::protocol::Part;

const BYTES_PER_MB: usize = 1024 * 1024;

/// Attachment error.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Непідтримуваний тип файлу: {0}. Будь ласка, виберіть зображення (JPEG, PNG, WEBP, HEIC, HEIF).")]
    UnsupportedType(String),
    #[error("Файл завеликий. Максимальний розмір: {max_mb}MB.")]
    TooLarge { size: usize, max_mb: usize },
    #[error("{0}")]
    Read(#[from] std::io::Error),
}

/// Where the attachment bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentPayload {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// A file read when the turn is sent.
    File(PathBuf),
}

/// A file the user attached to a turn.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub payload: AttachmentPayload,
}

impl Attachment {
    /// Attachment from in-memory bytes.
    #[must_use]
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            payload: AttachmentPayload::Bytes(data.into()),
        }
    }

    /// Attachment read from disk at send time; named after the file.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            mime_type: mime_type.into(),
            payload: AttachmentPayload::File(path),
        }
    }

    /// Guess an image MIME type from a file extension.
    #[must_use]
    pub fn mime_type_for(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "webp" => Some("image/webp"),
            "heic" => Some("image/heic"),
            "heif" => Some("image/heif"),
            _ => None,
        }
    }

    /// Descriptor kept in the message log.
    #[must_use]
    pub fn info(&self) -> AttachmentInfo {
        AttachmentInfo {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }

    /// Validate against the config and encode as an inline-data part.
    ///
    /// # Errors
    /// Returns error if the type is unsupported, the payload is too large,
    /// or the file cannot be read.
    pub async fn encode(&self, config: &ChatConfig) -> Result<Part, AttachmentError> {
        if !config.supports_mime_type(&self.mime_type) {
            return Err(AttachmentError::UnsupportedType(self.mime_type.clone()));
        }

        let data = match &self.payload {
            AttachmentPayload::Bytes(bytes) => {
                check_size(bytes.len(), config)?;
                bytes.clone()
            }
            AttachmentPayload::File(path) => {
                let len = tokio::fs::metadata(path).await?.len();
                check_size(usize::try_from(len).unwrap_or(usize::MAX), config)?;
                Bytes::from(tokio::fs::read(path).await?)
            }
        };

        tracing::debug!(
            name = %self.name,
            mime_type = %self.mime_type,
            bytes = data.len(),
            "Encoded attachment"
        );
        Ok(Part::inline(&data, self.mime_type.clone()))
    }
}

fn check_size(size: usize, config: &ChatConfig) -> Result<(), AttachmentError> {
    if size > config.max_attachment_bytes {
        return Err(AttachmentError::TooLarge {
            size,
            max_mb: config.max_attachment_bytes / BYTES_PER_MB,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[tokio::test]
    async fn test_encode_bytes() {
        let att = Attachment::from_bytes("scan.png", "image/png", vec![1u8, 2, 3]);
        let part = assert_ok!(att.encode(&ChatConfig::default()).await);
        let Part::InlineData { inline_data } = part else {
            panic!("Wrong part type");
        };
        assert_eq!(inline_data.mime_type, "image/png");
        assert_eq!(inline_data.decode().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rejects_unsupported_type() {
        let att = Attachment::from_bytes("doc.pdf", "application/pdf", vec![0u8; 8]);
        let err = assert_err!(att.encode(&ChatConfig::default()).await);
        assert!(matches!(err, AttachmentError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized() {
        let config = ChatConfig::default();
        let att = Attachment::from_bytes(
            "big.jpg",
            "image/jpeg",
            vec![0u8; config.max_attachment_bytes + 1],
        );
        let err = assert_err!(att.encode(&config).await);
        assert!(matches!(err, AttachmentError::TooLarge { max_mb: 4, .. }));
    }

    #[tokio::test]
    async fn test_encode_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.webp");
        std::fs::write(&path, b"RIFF").unwrap();

        let att = Attachment::from_path(&path, "image/webp");
        assert_eq!(att.name, "photo.webp");
        assert_ok!(att.encode(&ChatConfig::default()).await);

        let missing = Attachment::from_path(dir.path().join("gone.webp"), "image/webp");
        let err = assert_err!(missing.encode(&ChatConfig::default()).await);
        assert!(matches!(err, AttachmentError::Read(_)));
    }

    #[test]
    fn test_mime_type_guess() {
        assert_eq!(Attachment::mime_type_for(Path::new("a.JPG")), Some("image/jpeg"));
        assert_eq!(Attachment::mime_type_for(Path::new("a.txt")), None);
    }
}

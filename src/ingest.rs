//! Turning an input file into plain text.
//!
//! Real deployments plug in converters for PDF, Office or images behind the
//! [`DocumentConverter`] trait. The crate ships [`PlainTextConverter`] for
//! text-like files (`.txt`, `.md`, …) in the encodings such uploads usually
//! arrive in.

use crate::error::OutlineError;
use async_trait::async_trait;
use encoding_rs::{Encoding, GBK, UTF_8};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Text extracted from a file, and the encoding it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedDocument {
    pub text: String,
    pub encoding: String,
}

/// Converts a file on disk into text.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, OutlineError>;

    /// Short identifier stored in cache metadata.
    fn name(&self) -> &str;
}

/// Decodes text files: UTF-8 and UTF-16 with BOM, plain UTF-8, otherwise GBK.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextConverter;

#[async_trait]
impl DocumentConverter for PlainTextConverter {
    async fn convert(&self, path: &Path) -> Result<ConvertedDocument, OutlineError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                OutlineError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                OutlineError::InputRead {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let (text, encoding) = decode_text(&bytes);
        debug!("Decoded {} as {} ({} bytes)", path.display(), encoding, bytes.len());
        Ok(ConvertedDocument {
            text,
            encoding: encoding.to_string(),
        })
    }

    fn name(&self) -> &str {
        "plain_text"
    }
}

/// Decode `bytes`, returning the text and the name of the encoding used.
///
/// A BOM wins; then strict UTF-8; then GBK, which covers legacy Chinese
/// documents and never fails (invalid sequences become U+FFFD).
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text.into_owned(), encoding.name());
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), UTF_8.name());
    }
    let (text, _, _) = GBK.decode(bytes);
    (text.into_owned(), GBK.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn decodes_plain_utf8() {
        assert_eq!(decode_text("项目概述".as_bytes()), ("项目概述".to_string(), "UTF-8"));
    }

    #[test]
    fn decodes_utf16le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Hi 你好".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&bytes), ("Hi 你好".to_string(), "UTF-16LE"));
    }

    #[test]
    fn strips_utf8_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'o', b'k'];
        assert_eq!(decode_text(&bytes), ("ok".to_string(), "UTF-8"));
    }

    #[test]
    fn falls_back_to_gbk() {
        let (encoded, _, _) = GBK.encode("中文文档");
        let (text, name) = decode_text(&encoded);
        assert_eq!(text, "中文文档");
        assert_eq!(name, "GBK");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = PlainTextConverter
            .convert(&dir.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, OutlineError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn converts_file_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        tokio::fs::write(&path, "# Notes\n\nBody").await.unwrap();
        let doc = PlainTextConverter.convert(&path).await.unwrap();
        assert_eq!(doc.text, "# Notes\n\nBody");
        assert_eq!(doc.encoding, "UTF-8");
    }
}

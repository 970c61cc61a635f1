//! Document Extractor: resolves a resume reference to plain text.
//!
//! Extractors may signal a soft failure by returning text tagged with
//! `Error:` or `Warning:` instead of an `Err`; callers check with
//! [`is_unusable`].

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

pub const EMPTY_PDF_WARNING: &str =
    "Warning: No text extracted (file might be empty or image-based).";

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, reference: &str) -> Result<String>;

    fn backend_name(&self) -> &'static str;
}

/// True when extracted text is empty or carries an error/warning tag anywhere.
pub fn is_unusable(text: &str) -> bool {
    text.trim().is_empty() || text.contains("Error:") || text.contains("Warning:")
}

/// Decodes raw file bytes by extension. PDFs go through `pdf-extract` on the
/// blocking pool; anything else must be UTF-8 text.
async fn decode(reference: &str, bytes: Bytes) -> Result<String> {
    let is_pdf = Path::new(reference)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if !is_pdf {
        return std::str::from_utf8(&bytes)
            .map(str::to_owned)
            .with_context(|| format!("Resume '{reference}' is not valid UTF-8 text"));
    }

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .context("PDF extraction task panicked")?
        .with_context(|| format!("Could not extract text from PDF '{reference}'"))?;

    if text.trim().is_empty() {
        warn!("No text extracted from {reference}; file might be empty or image-based");
        return Ok(EMPTY_PDF_WARNING.to_string());
    }

    debug!("Extracted {} chars from {reference}", text.len());
    Ok(text)
}

// ────────────────────────────────────────────────────────────────────────────
// Local filesystem
// ────────────────────────────────────────────────────────────────────────────

/// Reads resumes from `<root>/<reference>`.
pub struct LocalExtractor {
    root: PathBuf,
}

impl LocalExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if reference.trim().is_empty() || escapes {
            bail!("Invalid resume reference '{reference}'");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentExtractor for LocalExtractor {
    async fn extract(&self, reference: &str) -> Result<String> {
        let path = self.resolve(reference)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Resume file not found at {}", path.display()))?;
        decode(reference, Bytes::from(bytes)).await
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// S3 / MinIO
// ────────────────────────────────────────────────────────────────────────────

/// Reads resumes from `s3://<bucket>/<reference>`.
pub struct S3Extractor {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Extractor {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl DocumentExtractor for S3Extractor {
    async fn extract(&self, reference: &str) -> Result<String> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(reference)
            .send()
            .await
            .with_context(|| format!("Failed to fetch s3://{}/{}", self.bucket, reference))?;

        let bytes = object
            .body
            .collect()
            .await
            .with_context(|| format!("Failed to read s3://{}/{}", self.bucket, reference))?
            .into_bytes();

        decode(reference, bytes).await
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

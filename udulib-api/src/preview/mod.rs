//! Document preview generation
//!
//! Picks a strategy by file category, then produces a JPEG:
//! - image: shrink-to-fit and re-encode (or the stored bytes for `original`)
//! - pdf: render pages in-process with PDFium
//! - office: convert to PDF with a headless office suite, then as pdf
//! - text: decode and draw onto a white canvas

pub mod convert;
pub mod pdf;
pub mod raster;
pub mod text;

use crate::storage::file_extension;
use image::RgbImage;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use udulib_common::config::PreviewConfig;

use raster::{encode_jpeg, fit_within, flatten_onto_white, stitch_pages, DEFAULT_STITCH_WIDTH};
use text::TextLimits;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Preview is not supported for this file type: {0}")]
    Unsupported(String),

    #[error("Could not generate preview: {0}")]
    Conversion(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Preview IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Preview task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PreviewError {
    fn from(err: tokio::task::JoinError) -> Self {
        PreviewError::Task(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Image,
    Pdf,
    Office,
    Text,
    Unsupported,
}

impl FileCategory {
    pub fn from_filename(filename: &str) -> Self {
        match file_extension(filename).as_str() {
            ".jpg" | ".jpeg" | ".png" | ".gif" | ".bmp" | ".webp" => FileCategory::Image,
            ".pdf" => FileCategory::Pdf,
            ".doc" | ".docx" | ".xls" | ".xlsx" | ".ppt" | ".pptx" => FileCategory::Office,
            ".txt" | ".md" | ".csv" => FileCategory::Text,
            _ => FileCategory::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Pdf => "pdf",
            FileCategory::Office => "office",
            FileCategory::Text => "text",
            FileCategory::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        *self != FileCategory::Unsupported
    }
}

/// Requested preview size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewSize {
    Small,
    #[default]
    Medium,
    Large,
    Original,
    Full,
}

impl PreviewSize {
    /// Unknown names behave as `medium`
    pub fn parse(name: Option<&str>) -> Self {
        match name.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("small") => PreviewSize::Small,
            Some("large") => PreviewSize::Large,
            Some("original") => PreviewSize::Original,
            Some("full") => PreviewSize::Full,
            _ => PreviewSize::Medium,
        }
    }

    /// Bounding box, `None` for no resizing
    pub fn target(&self) -> Option<(u32, u32)> {
        match self {
            PreviewSize::Small => Some((300, 300)),
            PreviewSize::Medium => Some((800, 600)),
            PreviewSize::Large | PreviewSize::Full => Some((1200, 900)),
            PreviewSize::Original => None,
        }
    }

    pub fn max_pages(&self) -> u32 {
        match self {
            PreviewSize::Small => 1,
            PreviewSize::Medium => 3,
            PreviewSize::Large => 5,
            PreviewSize::Original => 10,
            PreviewSize::Full => 50,
        }
    }

    pub fn is_full(&self) -> bool {
        *self == PreviewSize::Full
    }
}

/// Rendered preview bytes
#[derive(Debug, Clone)]
pub struct Preview {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl Preview {
    fn jpeg(data: Vec<u8>) -> Self {
        Self {
            data,
            content_type: "image/jpeg".to_string(),
        }
    }
}

pub struct PreviewService {
    config: PreviewConfig,
}

impl PreviewService {
    pub fn new(config: PreviewConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.conversion_timeout_secs)
    }

    /// Render a preview of a stored file
    ///
    /// `filename` is the stored object name; its extension selects the
    /// strategy. `content_type` is returned as-is when the original image
    /// bytes are served.
    pub async fn render(
        &self,
        data: Vec<u8>,
        content_type: &str,
        filename: &str,
        size: PreviewSize,
    ) -> Result<Preview, PreviewError> {
        let category = FileCategory::from_filename(filename);
        debug!("Rendering {:?} preview of {} ({})", size, filename, category.as_str());

        match category {
            FileCategory::Image => self.render_image(data, content_type.to_string(), size).await,
            FileCategory::Pdf | FileCategory::Office => self.render_paged(data, filename, category, size).await,
            FileCategory::Text => self.render_text(data, size).await,
            FileCategory::Unsupported => Err(PreviewError::Unsupported(filename.to_string())),
        }
    }

    async fn render_image(&self, data: Vec<u8>, content_type: String, size: PreviewSize) -> Result<Preview, PreviewError> {
        let Some((width, height)) = size.target() else {
            return Ok(Preview { data, content_type });
        };

        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&data);
            match decoded {
                Ok(img) => {
                    let fitted = fit_within(flatten_onto_white(&img), width, height);
                    Ok(Preview::jpeg(encode_jpeg(&fitted)?))
                }
                Err(e) => {
                    warn!("Image could not be decoded ({}); serving stored bytes", e);
                    Ok(Preview { data, content_type })
                }
            }
        })
        .await?
    }

    async fn render_paged(
        &self,
        data: Vec<u8>,
        filename: &str,
        category: FileCategory,
        size: PreviewSize,
    ) -> Result<Preview, PreviewError> {
        let pdf_bytes = if category == FileCategory::Office {
            let workdir = tempfile::tempdir()?;
            let input = workdir.path().join(format!("input{}", file_extension(filename)));
            tokio::fs::write(&input, &data).await?;
            let out_dir = workdir.path().join("converted");
            tokio::fs::create_dir_all(&out_dir).await?;
            let converted =
                convert::office_to_pdf(&self.config.office_converter, &input, &out_dir, self.timeout()).await?;
            tokio::fs::read(&converted).await?
        } else {
            data
        };

        let pages = pdf::render_pages(&self.config.pdfium_library_dir, pdf_bytes, size.max_pages()).await?;

        let jpeg = tokio::task::spawn_blocking(move || compose_pages(pages, size)).await??;
        Ok(Preview::jpeg(jpeg))
    }

    async fn render_text(&self, data: Vec<u8>, size: PreviewSize) -> Result<Preview, PreviewError> {
        let jpeg = tokio::task::spawn_blocking(move || {
            let limits = if size.is_full() { TextLimits::FULL } else { TextLimits::PREVIEW };
            let content = text::truncate(&text::decode_text(&data), limits);
            let (width, height) = size.target().unwrap_or((800, 600));
            encode_jpeg(&text::render_text(&content, width, height, size.is_full()))
        })
        .await??;
        Ok(Preview::jpeg(jpeg))
    }

    /// Whether previews can be produced for a stored object name
    pub fn is_supported(filename: &str) -> bool {
        FileCategory::from_filename(filename).is_supported()
    }

    /// Category name reported by the is-supported endpoint
    pub fn category_name(filename: &str) -> &'static str {
        FileCategory::from_filename(filename).as_str()
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }
}

/// Stitch for full previews of several pages, else fit the first page
fn compose_pages(mut pages: Vec<RgbImage>, size: PreviewSize) -> Result<Vec<u8>, PreviewError> {
    let image = if size.is_full() && pages.len() > 1 {
        let width = size.target().map(|(w, _)| w).unwrap_or(DEFAULT_STITCH_WIDTH);
        stitch_pages(&pages, width)
    } else {
        let first = pages.swap_remove(0);
        match size.target() {
            Some((w, h)) => fit_within(first, w, h),
            None => first,
        }
    };
    Ok(encode_jpeg(&image)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 128, 255, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn service() -> PreviewService {
        PreviewService::new(PreviewConfig::default())
    }

    #[test]
    fn test_categories() {
        assert_eq!(FileCategory::from_filename("a.WEBP"), FileCategory::Image);
        assert_eq!(FileCategory::from_filename("a.pdf"), FileCategory::Pdf);
        assert_eq!(FileCategory::from_filename("a.xlsx"), FileCategory::Office);
        assert_eq!(FileCategory::from_filename("README.md"), FileCategory::Text);
        assert_eq!(FileCategory::from_filename("a.zip"), FileCategory::Unsupported);
        assert_eq!(FileCategory::from_filename("noext"), FileCategory::Unsupported);
    }

    #[test]
    fn test_size_table() {
        assert_eq!(PreviewSize::parse(Some("small")).target(), Some((300, 300)));
        assert_eq!(PreviewSize::parse(Some("LARGE")).max_pages(), 5);
        assert_eq!(PreviewSize::parse(Some("original")).target(), None);
        assert_eq!(PreviewSize::parse(Some("full")).max_pages(), 50);
        assert_eq!(PreviewSize::parse(Some("huge")), PreviewSize::Medium);
        assert_eq!(PreviewSize::parse(None), PreviewSize::Medium);
    }

    #[tokio::test]
    async fn test_image_preview_is_resized_jpeg() {
        let preview = service()
            .render(png_bytes(1000, 500), "image/png", "x.png", PreviewSize::Small)
            .await
            .unwrap();
        assert_eq!(preview.content_type, "image/jpeg");
        let decoded = image::load_from_memory(&preview.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 150));
    }

    #[tokio::test]
    async fn test_original_image_returns_stored_bytes() {
        let bytes = png_bytes(10, 10);
        let preview = service()
            .render(bytes.clone(), "image/png", "x.png", PreviewSize::Original)
            .await
            .unwrap();
        assert_eq!(preview.data, bytes);
        assert_eq!(preview.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_undecodable_image_falls_back_to_stored_bytes() {
        let preview = service()
            .render(b"garbage".to_vec(), "image/jpeg", "x.jpg", PreviewSize::Medium)
            .await
            .unwrap();
        assert_eq!(preview.data, b"garbage");
        assert_eq!(preview.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_text_preview_dimensions() {
        let preview = service()
            .render(b"hello\nworld".to_vec(), "text/plain", "n.txt", PreviewSize::Medium)
            .await
            .unwrap();
        let decoded = image::load_from_memory(&preview.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let err = service()
            .render(vec![1, 2, 3], "application/zip", "a.zip", PreviewSize::Medium)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_office_without_converter_fails_cleanly() {
        let config = PreviewConfig {
            office_converter: "udulib-missing-office".to_string(),
            conversion_timeout_secs: 5,
            ..PreviewConfig::default()
        };
        let err = PreviewService::new(config)
            .render(b"doc".to_vec(), "application/msword", "a.doc", PreviewSize::Small)
            .await
            .unwrap_err();
        assert!(matches!(err, PreviewError::Conversion(_)));
    }
}

//! PDF page rendering through PDFium
//!
//! PDFium is bound once per process and driven from a single dedicated
//! thread; render requests are queued to it and answered over a oneshot
//! channel, so async callers never block a runtime worker.

use super::raster::flatten_onto_white;
use super::PreviewError;
use image::RgbImage;
use pdfium_render::prelude::*;
use std::sync::mpsc;
use std::sync::OnceLock;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Pages are rendered at twice their point size (144 dpi)
pub const RENDER_SCALE: f32 = 2.0;

struct RenderJob {
    data: Vec<u8>,
    max_pages: usize,
    reply: oneshot::Sender<Result<Vec<RgbImage>, PreviewError>>,
}

static RENDERER: OnceLock<Option<mpsc::Sender<RenderJob>>> = OnceLock::new();

/// Bind libpdfium from `library_dir`, else `./lib/`, `./` and the system path
fn bind_pdfium(library_dir: &str) -> Result<Pdfium, String> {
    let mut dirs = vec!["./lib/", "./"];
    if !library_dir.is_empty() {
        dirs.insert(0, library_dir);
    }
    for dir in dirs {
        if let Ok(bindings) = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            return Ok(Pdfium::new(bindings));
        }
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| format!("PDFium library could not be loaded: {:?}", e))
}

fn render_document(pdfium: &Pdfium, data: &[u8], max_pages: usize) -> Result<Vec<RgbImage>, PreviewError> {
    let document = pdfium
        .load_pdf_from_byte_slice(data, None)
        .map_err(|e| PreviewError::Conversion(format!("PDF could not be opened: {:?}", e)))?;

    let config = PdfRenderConfig::new().scale_page_by_factor(RENDER_SCALE);
    let mut pages = Vec::new();
    for (index, page) in document.pages().iter().take(max_pages).enumerate() {
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| PreviewError::Conversion(format!("page {} could not be rendered: {:?}", index + 1, e)))?;
        pages.push(flatten_onto_white(&bitmap.as_image()));
    }

    if pages.is_empty() {
        return Err(PreviewError::Conversion("PDF has no renderable pages".to_string()));
    }
    debug!("Rendered {} PDF page(s)", pages.len());
    Ok(pages)
}

fn run_renderer(library_dir: String, jobs: mpsc::Receiver<RenderJob>) {
    let pdfium = match bind_pdfium(&library_dir) {
        Ok(pdfium) => {
            info!("PDFium bound for preview rendering");
            Ok(pdfium)
        }
        Err(msg) => {
            error!("{}", msg);
            Err(msg)
        }
    };

    for job in jobs {
        let result = match &pdfium {
            Ok(pdfium) => render_document(pdfium, &job.data, job.max_pages),
            Err(msg) => Err(PreviewError::Conversion(msg.clone())),
        };
        // The requester may have gone away; nothing to do then
        let _ = job.reply.send(result);
    }
}

fn spawn_renderer(library_dir: &str) -> Option<mpsc::Sender<RenderJob>> {
    let (sender, jobs) = mpsc::channel();
    let dir = library_dir.to_string();
    match std::thread::Builder::new()
        .name("pdfium-render".to_string())
        .spawn(move || run_renderer(dir, jobs))
    {
        Ok(_) => Some(sender),
        Err(e) => {
            error!("PDF renderer thread could not be started: {}", e);
            None
        }
    }
}

/// Render the first `max_pages` pages of a PDF, flattened onto white
pub async fn render_pages(library_dir: &str, data: Vec<u8>, max_pages: u32) -> Result<Vec<RgbImage>, PreviewError> {
    let (reply, response) = oneshot::channel();
    let job = RenderJob {
        data,
        max_pages: max_pages as usize,
        reply,
    };
    RENDERER
        .get_or_init(|| spawn_renderer(library_dir))
        .as_ref()
        .ok_or_else(|| PreviewError::Task("PDF renderer is not running".to_string()))?
        .send(job)
        .map_err(|_| PreviewError::Task("PDF renderer has stopped".to_string()))?;
    response
        .await
        .map_err(|_| PreviewError::Task("PDF renderer dropped the request".to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One blank US Letter page, with a correct xref table
    fn letter_pdf() -> Vec<u8> {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ];
        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!("trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", objects.len() + 1, xref).as_bytes(),
        );
        pdf
    }

    #[tokio::test]
    async fn test_page_is_rendered_at_double_scale() {
        match render_pages("", letter_pdf(), 50).await {
            Ok(pages) => {
                assert_eq!(pages.len(), 1);
                assert_eq!((pages[0].width(), pages[0].height()), (1224, 1584));
                assert_eq!(pages[0].get_pixel(10, 10).0, [255, 255, 255]);
            }
            // Hosts without libpdfium report it as a conversion failure
            Err(PreviewError::Conversion(msg)) if msg.contains("could not be loaded") => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_bytes_that_are_not_a_pdf_are_a_conversion_error() {
        let err = render_pages("", b"plain text, not a PDF".to_vec(), 1).await.unwrap_err();
        assert!(matches!(err, PreviewError::Conversion(_)));
    }
}

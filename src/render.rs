use std::io::Cursor;
use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::DocumentError;
use crate::logging::PDF_PARSING;

/// A rasterised statement page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based position in the document.
    pub page_index: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn new(page_index: usize, image: DynamicImage) -> Self {
        Self { page_index, image }
    }

    /// JPEG `data:` URL suitable for an image content part.
    pub fn to_data_url(&self) -> Result<String, DocumentError> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(self.image.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
        Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(buf)))
    }
}

/// Rasterises PDF pages for the vision path. A seam so the pipeline can run
/// without a native rendering library.
pub trait PageRenderer: Send + Sync {
    /// Renders pages in order, stopping after `limit` pages when given.
    fn render(&self, pdf: &[u8], limit: Option<usize>) -> Result<Vec<PageImage>, DocumentError>;

    fn render_front_page(&self, pdf: &[u8]) -> Result<PageImage, DocumentError> {
        self.render(pdf, Some(1))?
            .into_iter()
            .next()
            .ok_or(DocumentError::NoPages)
    }
}

/// Renders with a pdfium shared library, looked up next to the binary (or in
/// `library_dir`) before falling back to the system library. The library is
/// bound once and shared by every render.
pub struct PdfiumRenderer {
    pdfium: Pdfium,
    pub target_width: u32,
}

impl PdfiumRenderer {
    pub fn new(library_dir: Option<&Path>, target_width: u32) -> Result<Self, DocumentError> {
        let dir = library_dir.unwrap_or_else(|| Path::new("./"));
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| DocumentError::Render(format!("failed to bind pdfium: {e}")))?;
        debug!(target: PDF_PARSING, dir = %dir.display(), "bound pdfium");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
            target_width,
        })
    }
}

impl fmt::Debug for PdfiumRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfiumRenderer")
            .field("target_width", &self.target_width)
            .finish_non_exhaustive()
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(&self, pdf: &[u8], limit: Option<usize>) -> Result<Vec<PageImage>, DocumentError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| DocumentError::Render(e.to_string()))?;
        let config = PdfRenderConfig::new().set_target_width(self.target_width as i32);

        let mut images = Vec::new();
        for (page_index, page) in document.pages().iter().enumerate() {
            if limit.is_some_and(|limit| page_index >= limit) {
                break;
            }
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| DocumentError::Render(format!("page {}: {e}", page_index + 1)))?;
            let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
                DocumentError::Render(format!("page {}: bitmap size mismatch", page_index + 1))
            })?;
            debug!(target: PDF_PARSING, page = page_index + 1, width, height, "rendered page");
            images.push(PageImage::new(page_index, DynamicImage::ImageRgba8(rgba)));
        }

        if images.is_empty() {
            return Err(DocumentError::NoPages);
        }
        Ok(images)
    }
}

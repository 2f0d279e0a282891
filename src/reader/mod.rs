//! Document reading
//!
//! Turns a PDF binary into page-ordered text and chart images. Parsing is
//! CPU-bound, so the production reader runs it on the blocking pool.

mod charts;
mod images;

pub use charts::{
    chart_regions, label_embedded_images, match_title, ChartRegion, ChartRenderer, TitleHit,
    CHART_TITLES,
};
pub use images::extract_page_images;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

/// A chart image taken from a document page
#[derive(Debug, Clone, Serialize)]
pub struct PageImage {
    /// 1-based page number
    pub page: u32,
    /// Position of the image among the images of its page
    pub index: usize,
    pub width: i64,
    pub height: i64,
    pub mime_type: String,
    /// Chart title printed above the image, when located
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

/// Trait for document readers
#[async_trait]
pub trait DocumentReader: Send + Sync {
    /// Text of the first page. Fails with `NoPages` or `NoText`.
    async fn read_first_page(&self, bytes: &[u8]) -> Result<String>;

    /// Non-empty page texts in page order. Fails with `NoPages`.
    async fn read_all_chunks(&self, bytes: &[u8]) -> Result<Vec<String>>;

    /// Chart images in page order, labelled with their titles when located
    async fn read_images(&self, bytes: &[u8]) -> Result<Vec<PageImage>>;
}

/// PDF reader backed by pdf-extract (text), pdfium (chart rendering) and
/// lopdf (embedded images when pdfium is unavailable)
#[derive(Debug, Default, Clone)]
pub struct PdfDocumentReader;

impl PdfDocumentReader {
    pub fn new() -> Self {
        Self
    }

    async fn pages(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let owned = bytes.to_vec();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&owned)
                .map_err(|e| Error::Pdf(e.to_string()))
        })
        .await??;

        debug!("Extracted text from {} pages", pages.len());
        Ok(pages)
    }
}

#[async_trait]
impl DocumentReader for PdfDocumentReader {
    async fn read_first_page(&self, bytes: &[u8]) -> Result<String> {
        let pages = self.pages(bytes).await?;
        first_page_text(pages)
    }

    async fn read_all_chunks(&self, bytes: &[u8]) -> Result<Vec<String>> {
        let pages = self.pages(bytes).await?;
        page_chunks(pages)
    }

    async fn read_images(&self, bytes: &[u8]) -> Result<Vec<PageImage>> {
        let owned = bytes.to_vec();
        let rendered = tokio::task::spawn_blocking(move || match ChartRenderer::load() {
            Ok(renderer) => renderer.render(&owned, &CHART_TITLES).map(Some),
            Err(e) => {
                warn!("{}; falling back to embedded images", e);
                Ok(None)
            }
        })
        .await??;
        if let Some(images) = rendered {
            return Ok(images);
        }

        let pages = self.pages(bytes).await?;
        let owned = bytes.to_vec();
        let images = tokio::task::spawn_blocking(move || extract_page_images(&owned)).await??;
        Ok(label_embedded_images(images, &pages, &CHART_TITLES))
    }
}

fn first_page_text(pages: Vec<String>) -> Result<String> {
    let first = pages.into_iter().next().ok_or(Error::NoPages)?;
    let text = first.trim();
    if text.is_empty() {
        return Err(Error::NoText);
    }
    Ok(text.to_string())
}

fn page_chunks(pages: Vec<String>) -> Result<Vec<String>> {
    if pages.is_empty() {
        return Err(Error::NoPages);
    }

    Ok(pages
        .into_iter()
        .map(|page| page.trim().to_string())
        .filter(|page| !page.is_empty())
        .collect())
}

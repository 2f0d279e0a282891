//! Chart location and rendering.
//!
//! Mysteel weekly reports draw their charts as vector graphics below fixed
//! titles. A chart is the band of its page from the title down to the next
//! title on the same page, or to the page bottom. pdfium finds the titles
//! and renders each band to PNG.

use super::PageImage;
use crate::error::{Error, Result};
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use pdfium_render::prelude::*;
use std::collections::HashSet;
use std::io::Cursor;
use tracing::debug;

/// Chart titles printed in Mysteel weekly reports
pub const CHART_TITLES: [&str; 6] = [
    "Capacity utilization BF & EAF (%)",
    "Domestic Iron Ore Mines Operation",
    "Weekly Imported Iron Ore Volume (10,000t)",
    "Ports & Steel Mills Inventories (10,000t)",
    "Blast Furnace Iron Ore Burden Ratio (%)",
    "Coke Inventory & Capacity Utilization",
];

const PNG_MIME: &str = "image/png";

const RENDER_DPI: f32 = 200.0;

const POINTS_PER_INCH: f32 = 72.0;

/// Largest rendered page side in pixels
const MAX_DIMENSION_PX: f32 = 4096.0;

/// Space above a title kept inside its band
const TITLE_MARGIN_PT: f32 = 10.0;

/// A chart title found on a page
#[derive(Debug, Clone, PartialEq)]
pub struct TitleHit {
    pub title: String,
    /// 1-based page number
    pub page: u32,
    /// Distance from the page top to the top of the title, in points
    pub top: f32,
}

/// Vertical band of a page holding one chart, in points from the page top
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRegion {
    pub title: String,
    pub page: u32,
    pub top: f32,
    pub bottom: f32,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The known title contained in `text`, ignoring whitespace differences
pub fn match_title(text: &str, titles: &[&str]) -> Option<String> {
    let text = collapse_whitespace(text);
    titles
        .iter()
        .find(|title| text.contains(collapse_whitespace(title).as_str()))
        .map(|title| title.to_string())
}

/// Known titles printed in `text`, in reading order
pub fn titles_in_order(text: &str, titles: &[&str]) -> Vec<String> {
    let text = collapse_whitespace(text);
    let mut found: Vec<(usize, &str)> = titles
        .iter()
        .filter_map(|title| {
            text.find(collapse_whitespace(title).as_str())
                .map(|pos| (pos, *title))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, title)| title.to_string()).collect()
}

/// Turn title positions into chart bands.
///
/// Only the topmost hit of a title on a page counts. `page_heights[n - 1]`
/// is the height of page `n` in points.
pub fn chart_regions(mut hits: Vec<TitleHit>, page_heights: &[f32]) -> Vec<ChartRegion> {
    hits.sort_by(|a, b| a.page.cmp(&b.page).then(a.top.total_cmp(&b.top)));
    let mut seen = HashSet::new();
    hits.retain(|hit| seen.insert((hit.page, hit.title.clone())));

    hits.iter()
        .enumerate()
        .filter_map(|(i, hit)| {
            let page_height = *page_heights.get(hit.page.checked_sub(1)? as usize)?;
            let next_top = hits[i + 1..]
                .iter()
                .find(|next| next.page == hit.page)
                .map(|next| next.top - TITLE_MARGIN_PT);

            let top = (hit.top - TITLE_MARGIN_PT).max(0.0);
            let bottom = next_top.unwrap_or(page_height).min(page_height);
            (bottom > top).then(|| ChartRegion {
                title: hit.title.clone(),
                page: hit.page,
                top,
                bottom,
            })
        })
        .collect()
}

/// Pixel rows `(y, height)` of a rendered page covering `region`
pub fn pixel_rows(region: &ChartRegion, page_height: f32, image_height: u32) -> Option<(u32, u32)> {
    if page_height <= 0.0 || image_height == 0 {
        return None;
    }
    let scale = image_height as f32 / page_height;
    let y = ((region.top * scale) as u32).min(image_height);
    let end = ((region.bottom * scale).ceil() as u32).min(image_height);
    (end > y).then(|| (y, end - y))
}

/// Pixel size of a page rendered at `RENDER_DPI`, capped to `MAX_DIMENSION_PX`
fn render_size(width_pt: f32, height_pt: f32) -> (i32, i32) {
    let scale = RENDER_DPI / POINTS_PER_INCH;
    let width = (width_pt * scale).max(1.0);
    let height = (height_pt * scale).max(1.0);
    let cap = (MAX_DIMENSION_PX / width.max(height)).min(1.0);
    (
        ((width * cap) as i32).max(1),
        ((height * cap) as i32).max(1),
    )
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageOutputFormat::Png)
        .map_err(|e| Error::Pdf(format!("PNG encoding failed: {}", e)))?;
    Ok(buf.into_inner())
}

fn pdfium_error(e: PdfiumError) -> Error {
    Error::Pdf(e.to_string())
}

/// Renders located charts with a bound pdfium library.
///
/// `Pdfium` is not `Send`; build one per blocking task.
pub struct ChartRenderer {
    pdfium: Pdfium,
}

impl ChartRenderer {
    /// Bind pdfium from `PDFIUM_DYNAMIC_LIB_PATH`, or from the system library path
    pub fn load() -> Result<Self> {
        let bindings = match std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
            Ok(path) => Pdfium::bind_to_library(&path),
            Err(_) => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| Error::Pdf(format!("PDFium library not available: {}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Locate every known chart title and render each chart band to PNG
    pub fn render(&self, bytes: &[u8], titles: &[&str]) -> Result<Vec<PageImage>> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(pdfium_error)?;

        let mut hits = Vec::new();
        let mut heights = Vec::new();
        for (index, page) in document.pages().iter().enumerate() {
            let height = page.height().value;
            heights.push(height);

            let Ok(text) = page.text() else {
                continue;
            };
            for segment in text.segments().iter() {
                if let Some(title) = match_title(&segment.text(), titles) {
                    hits.push(TitleHit {
                        title,
                        page: index as u32 + 1,
                        top: height - segment.bounds().top().value,
                    });
                }
            }
        }

        let regions = chart_regions(hits, &heights);
        debug!("Located {} charts", regions.len());

        let mut images: Vec<PageImage> = Vec::with_capacity(regions.len());
        let mut rendered: Option<(u32, DynamicImage)> = None;
        for region in regions {
            if rendered.as_ref().map(|(page, _)| *page) != Some(region.page) {
                rendered = Some((region.page, self.render_page(&document, region.page)?));
            }
            let Some((_, page_image)) = &rendered else {
                continue;
            };
            let Some(&page_height) = heights.get(region.page as usize - 1) else {
                continue;
            };
            let Some((y, rows)) = pixel_rows(&region, page_height, page_image.height()) else {
                continue;
            };

            let crop = page_image.crop_imm(0, y, page_image.width(), rows);
            let index = images.iter().filter(|img| img.page == region.page).count();
            images.push(PageImage {
                page: region.page,
                index,
                width: crop.width() as i64,
                height: crop.height() as i64,
                mime_type: PNG_MIME.to_string(),
                title: Some(region.title),
                data: encode_png(&crop)?,
            });
        }

        Ok(images)
    }

    fn render_page(&self, document: &PdfDocument<'_>, page_number: u32) -> Result<DynamicImage> {
        let index = u16::try_from(page_number - 1)
            .map_err(|_| Error::Pdf(format!("Page {} out of range", page_number)))?;
        let page = document.pages().get(index).map_err(pdfium_error)?;

        let (width, height) = render_size(page.width().value, page.height().value);
        let config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_maximum_height(height);
        let bitmap = page.render_with_config(&config).map_err(pdfium_error)?;

        debug!(page = page_number, width, height, "Rendered page");
        Ok(bitmap.as_image())
    }
}

/// Keep embedded images on pages that print a chart title, labelling each
/// with the title in the same reading position
pub fn label_embedded_images(
    images: Vec<PageImage>,
    page_texts: &[String],
    titles: &[&str],
) -> Vec<PageImage> {
    images
        .into_iter()
        .filter_map(|mut image| {
            let text = page_texts.get(image.page.checked_sub(1)? as usize)?;
            let found = titles_in_order(text, titles);
            if found.is_empty() {
                return None;
            }
            image.title = found.into_iter().nth(image.index);
            Some(image)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, page: u32, top: f32) -> TitleHit {
        TitleHit {
            title: title.to_string(),
            page,
            top,
        }
    }

    fn image(page: u32, index: usize) -> PageImage {
        PageImage {
            page,
            index,
            width: 10,
            height: 10,
            mime_type: "image/jpeg".to_string(),
            title: None,
            data: vec![0xFF, 0xD8],
        }
    }

    #[test]
    fn test_match_title_ignores_spacing() {
        assert_eq!(
            match_title("  Capacity  utilization BF &\nEAF (%) ", &CHART_TITLES).as_deref(),
            Some("Capacity utilization BF & EAF (%)")
        );
        assert!(match_title("Iron ore prices", &CHART_TITLES).is_none());
    }

    #[test]
    fn test_titled_page_splits_into_bands() {
        // Two charts on page 2, one on page 3, pages 842pt tall
        let hits = vec![
            hit(CHART_TITLES[3], 2, 420.0),
            hit(CHART_TITLES[0], 2, 100.0),
            hit(CHART_TITLES[5], 3, 60.0),
            hit(CHART_TITLES[0], 2, 700.0),
        ];

        let regions = chart_regions(hits, &[842.0, 842.0, 842.0]);

        assert_eq!(
            regions,
            vec![
                ChartRegion {
                    title: CHART_TITLES[0].to_string(),
                    page: 2,
                    top: 90.0,
                    bottom: 410.0,
                },
                ChartRegion {
                    title: CHART_TITLES[3].to_string(),
                    page: 2,
                    top: 410.0,
                    bottom: 842.0,
                },
                ChartRegion {
                    title: CHART_TITLES[5].to_string(),
                    page: 3,
                    top: 50.0,
                    bottom: 842.0,
                },
            ]
        );
    }

    #[test]
    fn test_hits_on_unknown_pages_are_dropped() {
        let regions = chart_regions(vec![hit(CHART_TITLES[1], 4, 10.0)], &[842.0]);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_pixel_rows_scale_with_render() {
        let region = ChartRegion {
            title: CHART_TITLES[0].to_string(),
            page: 1,
            top: 100.0,
            bottom: 400.0,
        };
        assert_eq!(pixel_rows(&region, 800.0, 1600), Some((200, 600)));
        assert_eq!(pixel_rows(&region, 0.0, 1600), None);
    }

    #[test]
    fn test_render_size_is_capped() {
        let (w, h) = render_size(595.0, 842.0);
        assert!((1600..1700).contains(&w), "{w}");
        assert!((2300..2400).contains(&h), "{h}");

        let (w, h) = render_size(5000.0, 10000.0);
        assert!(w <= 4096 && h <= 4096);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_embedded_images_are_restricted_to_titled_pages() {
        let pages = vec![
            "Company logo and cover".to_string(),
            format!("{} ... {}", CHART_TITLES[4], CHART_TITLES[2]),
        ];

        let labelled = label_embedded_images(
            vec![image(1, 0), image(2, 0), image(2, 1), image(2, 2)],
            &pages,
            &CHART_TITLES,
        );

        let titles: Vec<(u32, Option<&str>)> = labelled
            .iter()
            .map(|img| (img.page, img.title.as_deref()))
            .collect();
        assert_eq!(
            titles,
            vec![
                (2, Some(CHART_TITLES[4])),
                (2, Some(CHART_TITLES[2])),
                (2, None),
            ]
        );
    }
}

//! Embedded image extraction using lopdf, used when pdfium cannot be loaded.
//!
//! Only JPEG (DCTDecode) XObjects are returned: their stream content is a
//! complete JPEG file that the extraction service can consume directly.

use super::PageImage;
use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object};
use tracing::debug;

const JPEG_MIME: &str = "image/jpeg";

/// Walk every page's `/Resources /XObject` and collect JPEG images
pub fn extract_page_images(bytes: &[u8]) -> Result<Vec<PageImage>> {
    let doc = Document::load_mem(bytes).map_err(|e| Error::Pdf(e.to_string()))?;

    let mut images = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        let Ok(page) = doc.get_object(page_id).and_then(|obj| obj.as_dict()) else {
            continue;
        };
        let Some(xobjects) = resolve_dict(&doc, page, b"Resources")
            .and_then(|resources| resolve_dict(&doc, resources, b"XObject"))
        else {
            continue;
        };

        let mut index = 0;
        for (_name, entry) in xobjects.iter() {
            let Object::Stream(stream) = resolve_object(&doc, entry) else {
                continue;
            };
            if !is_image(&stream.dict) || !is_jpeg(&stream.dict) {
                continue;
            }

            images.push(PageImage {
                page: page_number,
                index,
                width: get_int(&stream.dict, b"Width"),
                height: get_int(&stream.dict, b"Height"),
                mime_type: JPEG_MIME.to_string(),
                title: None,
                data: jpeg_bytes(stream),
            });
            index += 1;
        }
    }

    debug!("Extracted {} embedded images", images.len());
    Ok(images)
}

fn resolve_object<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Dictionary> {
    let obj = dict.get(key).ok()?;
    resolve_object(doc, obj).as_dict().ok()
}

fn is_image(dict: &Dictionary) -> bool {
    matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
}

fn is_jpeg(dict: &Dictionary) -> bool {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => name == b"DCTDecode",
        Ok(Object::Array(filters)) => filters
            .iter()
            .any(|f| matches!(f, Object::Name(name) if name == b"DCTDecode")),
        _ => false,
    }
}

/// A lone DCTDecode filter means the raw stream is the JPEG; chained filters
/// have to be peeled first.
fn jpeg_bytes(stream: &lopdf::Stream) -> Vec<u8> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(_)) => stream.content.clone(),
        _ => stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone()),
    }
}

fn get_int(dict: &Dictionary, key: &[u8]) -> i64 {
    dict.get(key).and_then(|obj| obj.as_i64()).unwrap_or(0)
}

pub mod html;
pub mod pdf;

use crate::fetch::{PageBody, PageKind};
use crate::text::{dedup_paragraphs, split_paragraphs};

/// Ordered main-content paragraphs plus whatever title the source carried.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }
}

/// Converts a fetched body into paragraphs.
///
/// Never fails: input that cannot be parsed meaningfully yields an empty
/// paragraph list, which callers treat as a recoverable no-content signal.
pub fn extract_main_text(kind: PageKind, body: &PageBody) -> Extraction {
    match (kind, body) {
        (PageKind::Html, PageBody::Text(html)) => html::extract_html(html),
        (PageKind::Pdf, PageBody::Bytes(bytes)) => Extraction {
            title: None,
            paragraphs: pdf::extract_pdf_paragraphs(bytes),
        },
        // Unknown but textual: treat blank-line blocks as paragraphs.
        (_, PageBody::Text(text)) => Extraction {
            title: None,
            paragraphs: dedup_paragraphs(split_paragraphs(text)),
        },
        _ => Extraction::default(),
    }
}

use std::collections::{BTreeMap, HashMap};

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::text::{dedup_paragraphs, normalize_whitespace, split_paragraphs};

// Runs whose baselines differ by less than this many text-space units belong
// to the same visual line.
const LINE_TOLERANCE: f32 = 5.0;
// A line repeating on at least this share of pages is a header or footer.
const REPEAT_RATIO: f32 = 0.6;
// Unless it is long enough to plausibly be body text.
const LONG_LINE_CHARS: usize = 120;

/// Extracts paragraphs from PDF bytes.
///
/// Page content streams are walked operator by operator; shown text is tagged
/// with its baseline so runs can be regrouped into visual lines, and lines
/// repeating across most pages are dropped as page furniture. Any parse
/// failure yields an empty list; PDF extraction is best effort by contract.
pub fn extract_pdf_paragraphs(bytes: &[u8]) -> Vec<String> {
    let doc = match Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(err) => {
            debug!(error = %err, "pdf parse failed");
            return Vec::new();
        }
    };

    let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if pages.is_empty() {
        return Vec::new();
    }

    let page_lines: Vec<Vec<String>> = pages
        .iter()
        .map(|page_id| lines_for_page(&doc, *page_id))
        .collect();

    // Count on how many pages each lowercase line appears.
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    for lines in &page_lines {
        let mut unique: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
        unique.sort();
        unique.dedup();
        for line in unique {
            *occurrences.entry(line).or_insert(0) += 1;
        }
    }

    let threshold = (page_lines.len() as f32 * REPEAT_RATIO).floor() as usize;
    let threshold = threshold.max(2);

    let cleaned: Vec<String> = page_lines
        .iter()
        .map(|lines| {
            lines
                .iter()
                .filter(|line| {
                    let count = occurrences.get(&line.to_lowercase()).copied().unwrap_or(0);
                    count < threshold || line.len() > LONG_LINE_CHARS
                })
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|page| !page.is_empty())
        .collect();

    // A page break acts as a blank line so each page splits cleanly.
    dedup_paragraphs(split_paragraphs(&cleaned.join("\n\n")))
}

struct Line {
    y: f32,
    text: String,
}

fn operand_number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Decodes one page's content stream into top-to-bottom visual lines.
fn lines_for_page(doc: &Document, page_id: ObjectId) -> Vec<String> {
    let content_bytes = match doc.get_page_content(page_id) {
        Ok(bytes) => bytes,
        Err(_) => return Vec::new(),
    };
    let content = match Content::decode(&content_bytes) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };

    let encodings: BTreeMap<Vec<u8>, &str> = doc
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect();

    let mut lines: Vec<Line> = Vec::new();
    let mut encoding: Option<&str> = None;
    let mut y = 0.0f32;
    let mut leading = 0.0f32;

    let mut show = |y: f32, text: String, lines: &mut Vec<Line>| {
        let text = normalize_whitespace(&text);
        if text.is_empty() {
            return;
        }
        if let Some(line) = lines.iter_mut().find(|line| (line.y - y).abs() < LINE_TOLERANCE) {
            line.text.push(' ');
            line.text.push_str(&text);
        } else {
            lines.push(Line { y, text });
        }
    };

    for operation in &content.operations {
        let operands = &operation.operands;
        match operation.operator.as_str() {
            "BT" => {
                y = 0.0;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    encoding = encodings.get(name).copied();
                }
            }
            "TL" => {
                if let Some(value) = operands.first().and_then(operand_number) {
                    leading = value;
                }
            }
            "Td" => {
                if let Some(ty) = operands.get(1).and_then(operand_number) {
                    y += ty;
                }
            }
            "TD" => {
                if let Some(ty) = operands.get(1).and_then(operand_number) {
                    y += ty;
                    leading = -ty;
                }
            }
            "Tm" => {
                if let Some(value) = operands.get(5).and_then(operand_number) {
                    y = value;
                }
            }
            "T*" => {
                y -= leading;
            }
            "Tj" => {
                if let Some(Object::String(text, _)) = operands.first() {
                    show(y, Document::decode_text(encoding, text), &mut lines);
                }
            }
            "'" => {
                y -= leading;
                if let Some(Object::String(text, _)) = operands.first() {
                    show(y, Document::decode_text(encoding, text), &mut lines);
                }
            }
            "\"" => {
                y -= leading;
                if let Some(Object::String(text, _)) = operands.get(2) {
                    show(y, Document::decode_text(encoding, text), &mut lines);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    let mut run = String::new();
                    for item in items {
                        if let Object::String(text, _) = item {
                            run.push_str(&Document::decode_text(encoding, text));
                        }
                    }
                    show(y, run, &mut lines);
                }
            }
            _ => {}
        }
    }

    // PDF user space grows upward, so higher baselines come first.
    lines.sort_by(|a, b| b.y.partial_cmp(&a.y).unwrap_or(std::cmp::Ordering::Equal));
    lines.into_iter().map(|line| line.text).collect()
}

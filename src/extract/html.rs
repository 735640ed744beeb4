use ego_tree::NodeId;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Node, Selector};

use super::Extraction;
use crate::text::{dedup_paragraphs, normalize_whitespace};

// Everything that never holds readable body copy.
const REMOVAL_SELECTOR: &str = "script, style, noscript, template, iframe, svg, canvas, form, \
     nav, footer, header, aside, figure, figcaption, video, audio, button";

// Tried in order; the first candidate with enough text wins.
const PRIORITIZED_SELECTORS: &[&str] = &[
    "main",
    "article",
    r#"[role="main"]"#,
    r#"section[role="main"]"#,
    r#"div[role="main"]"#,
    "div#content",
    "div.content",
    r#"div[id*="content"]"#,
    r#"div[class*="content"]"#,
];

// A prioritized candidate must carry at least this much text to be trusted.
const ROOT_TEXT_THRESHOLD: usize = 400;
// Blocks below this length are ignored by the longest-block fallback scan.
const FALLBACK_TEXT_THRESHOLD: usize = 200;

lazy_static! {
    static ref REMOVAL: Selector = Selector::parse(REMOVAL_SELECTOR).unwrap();
    static ref PRIORITIZED: Vec<Selector> = PRIORITIZED_SELECTORS
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect();
    static ref BLOCKS: Selector = Selector::parse("p, article, section, div").unwrap();
    static ref TITLE: Selector = Selector::parse("title").unwrap();
    static ref BODY: Selector = Selector::parse("body").unwrap();
}

/// Extracts the page title and main-content paragraphs from raw HTML.
pub fn extract_html(html: &str) -> Extraction {
    let mut doc = Html::parse_document(html);
    strip_unwanted_nodes(&mut doc);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|el| normalize_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let paragraphs = match select_content_root(&doc) {
        Some(root) => collect_paragraphs(root),
        None => Vec::new(),
    };

    Extraction { title, paragraphs }
}

fn strip_unwanted_nodes(doc: &mut Html) {
    let ids: Vec<NodeId> = doc.select(&REMOVAL).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn element_text_len(el: ElementRef) -> usize {
    normalize_whitespace(&el.text().collect::<String>()).len()
}

fn select_content_root(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in PRIORITIZED.iter() {
        if let Some(candidate) = doc.select(selector).next() {
            if element_text_len(candidate) > ROOT_TEXT_THRESHOLD {
                return Some(candidate);
            }
        }
    }

    // No semantic marker was convincing; fall back to the densest block.
    let mut best: Option<(usize, ElementRef)> = None;
    for el in doc.select(&BLOCKS) {
        let len = element_text_len(el);
        if len < FALLBACK_TEXT_THRESHOLD {
            continue;
        }
        if best.as_ref().map(|(b, _)| len > *b).unwrap_or(true) {
            best = Some((len, el));
        }
    }
    if let Some((_, el)) = best {
        return Some(el);
    }

    doc.select(&BODY).next().or_else(|| Some(doc.root_element()))
}

fn is_block_boundary(tag: &str) -> bool {
    matches!(tag, "p" | "br" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Walks text nodes under `root` in document order, flushing the running
/// buffer whenever the text's parent element ends a block.
fn collect_paragraphs(root: ElementRef) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&normalized);

        let parent_tag = node
            .parent()
            .and_then(ElementRef::wrap)
            .map(|el| el.value().name().to_ascii_lowercase());
        if parent_tag.as_deref().map(is_block_boundary).unwrap_or(false) {
            paragraphs.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    dedup_paragraphs(
        paragraphs
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    )
}

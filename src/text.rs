use xxhash_rust::xxh3::xxh3_64;

/// Collapses all whitespace runs to single spaces and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits raw text into paragraphs on blank-line boundaries.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    // Longer newline runs leave empty or whitespace-only blocks behind;
    // normalization plus the emptiness filter absorbs them.
    text.split("\n\n")
        .map(normalize_whitespace)
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

/// Dedup key for a paragraph. Case-insensitive so headers repeated with
/// different casing still collapse.
pub fn paragraph_key(paragraph: &str) -> u64 {
    xxh3_64(paragraph.to_lowercase().as_bytes())
}

/// Drops repeated paragraphs, keeping the first occurrence in place.
pub fn dedup_paragraphs(paragraphs: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paragraphs
        .into_iter()
        .filter(|paragraph| seen.insert(paragraph_key(paragraph)))
        .collect()
}

/// Packs paragraphs into chunks of roughly `target` characters.
///
/// A paragraph joins the running chunk unless the join would reach `target`
/// while the running chunk already holds something; then the chunk is flushed
/// and the paragraph starts the next one. Joining every produced chunk back
/// with a blank line reproduces the input sequence exactly.
pub fn pack_chunks(paragraphs: &[String], target: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current = paragraph.clone();
            continue;
        }
        if current.len() + 2 + paragraph.len() >= target {
            chunks.push(std::mem::take(&mut current));
            current = paragraph.clone();
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

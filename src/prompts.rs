//! Prompt builders for the summarization and answering passes.

use crate::providers::PromptMessage;

/// Mini-summary pass over one map-reduce chunk.
pub fn chunk_summary(text: &str, language: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(
            "You are an assistant that condenses text for a synthesis pipeline. \
             Reply in the same language as the source text.",
        ),
        PromptMessage::user(format!(
            "Expected language: {language}. Provide a concise summary (5 sentences at most) \
             of the following passage to prepare a global summary.\n\n{text}"
        )),
    ]
}

/// Strict JSON summary request; the reply must parse into `tldr` + `summary`.
pub fn final_summary_json(text: &str, language: &str, url: &str) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(
            "You are a meticulous summarization assistant. Always return a JSON object with \
             the fields \"tldr\" (an array of 3 to 5 concise bullet points) and \"summary\" \
             (one paragraph of 150 to 220 words). Stay faithful to the provided text.",
        ),
        PromptMessage::user(format!(
            "Expected language: {language}. Summarize the content from {url}. \
             Provide verifiable facts only, no speculation.\n\nCONTENT:\n{text}"
        )),
    ]
}

/// Markdown summary for the streaming path; no JSON so fragments render as
/// they arrive.
pub fn summary_markdown(chunks: &[String], language: &str, url: &str) -> Vec<PromptMessage> {
    let system = [
        format!("You are an assistant that writes clear, readable summaries in {language}."),
        "Strictly forbidden: JSON, HTML tags and code blocks.".to_string(),
        "Keep normal spacing between words and punctuation.".to_string(),
        "Insert line breaks to separate headings, bullets and paragraphs.".to_string(),
        "Structure the reply exactly as follows and start immediately with the content:".to_string(),
        "## TL;DR".to_string(),
        "- 3 to 5 bullets, each line starting with \"- \" (dash plus space).".to_string(),
        String::new(),
        "## Summary".to_string(),
        "One or two concise paragraphs (150 to 220 words in total). Stay factual, \
         no speculation."
            .to_string(),
    ]
    .join("\n");

    let user = format!(
        "Expected language: {language}. Using the excerpts below from {url}, write the \
         requested summary with the structure above.\n\
         Do not invent information. Do not cite sources unless they appear explicitly in \
         the excerpts.\n\nSELECTED EXCERPTS:\n{}",
        chunks.join("\n\n")
    );

    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

/// Question-answering over the selected chunks, markdown out.
pub fn answer_markdown(
    chunks: &[String],
    language: &str,
    url: &str,
    question: &str,
) -> Vec<PromptMessage> {
    let system = format!(
        "You are an assistant that answers questions about a web page in {language}. \
         Answer only from the provided excerpts; when they do not contain the answer, say so. \
         Write plain readable Markdown without code blocks, JSON or HTML tags, and start \
         directly with the answer."
    );

    let user = format!(
        "Expected language: {language}. The excerpts below come from {url}.\n\
         Question: {question}\n\nEXCERPTS:\n{}",
        chunks.join("\n\n")
    );

    vec![PromptMessage::system(system), PromptMessage::user(user)]
}

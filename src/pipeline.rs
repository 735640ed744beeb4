use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::Config;
use crate::error::PipelineError;
use crate::events::StreamEvent;
use crate::extract::{extract_main_text, Extraction};
use crate::fetch::{PageBody, PageFetcher, PageKind};
use crate::language::detect_language;
use crate::prompts;
use crate::providers::CompletionBackend;
use crate::rag::Retriever;
use crate::summarize::{Summarizer, SummaryResult};
use crate::text::pack_chunks;

/// Inbound request body shared by the summary and answer endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub dom_snapshot: Option<DomSnapshot>,
    #[serde(default)]
    pub question: Option<String>,
}

/// Client-captured markup, used when the live fetch fails or comes back thin.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshot {
    pub html: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Parses and normalizes the request URL. Only http(s) is accepted; the
/// fragment is dropped.
pub fn normalize_url(raw: &str) -> Result<String, PipelineError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|_| PipelineError::InvalidRequest("the url could not be parsed".to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(PipelineError::InvalidRequest(
            "the url must be reachable over http or https".to_string(),
        ));
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Outbound side of one request. The `disabled` form swallows events, which
/// lets the non-streaming endpoint share the pipeline unchanged.
#[derive(Clone)]
pub struct EventSender {
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl EventSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emits one event. A closed channel means the caller disconnected;
    /// that surfaces as `Cancelled` so in-flight work stops.
    pub async fn send(&self, event: StreamEvent) -> Result<(), PipelineError> {
        match &self.tx {
            Some(tx) => tx.send(event).await.map_err(|_| PipelineError::Cancelled),
            None => Ok(()),
        }
    }

    pub async fn progress(&self, message: &str) -> Result<(), PipelineError> {
        self.send(StreamEvent::Progress(message.to_string())).await
    }
}

/// Coordinator states. Transitions are linear apart from the two documented
/// fallback edges inside `Fetching` and `Extracting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Fetching,
    Extracting,
    Retrieving,
    Summarizing,
    StreamingDeltas,
    Terminal,
}

struct StageTracker {
    request_id: String,
    stage: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            stage: Stage::Idle,
        }
    }

    fn enter(&mut self, next: Stage) {
        debug!(request = %self.request_id, from = ?self.stage, to = ?next, "stage transition");
        self.stage = next;
    }
}

/// Everything the summarizing stages need, assembled by the shared prefix of
/// both run modes.
struct PreparedPage {
    url: String,
    title: String,
    language: String,
    paragraphs: Vec<String>,
    /// Top chunks in document order, retrieval-ranked when an index is
    /// configured, otherwise the leading chunks.
    selected: Vec<String>,
}

pub struct Pipeline {
    config: Arc<Config>,
    fetcher: Arc<dyn PageFetcher>,
    retriever: Option<Arc<Retriever>>,
    completion: Arc<dyn CompletionBackend>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        fetcher: Arc<dyn PageFetcher>,
        retriever: Option<Arc<Retriever>>,
        completion: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            config,
            fetcher,
            retriever,
            completion,
        }
    }

    /// Fetch, extract and select content. Shared prefix of both run modes.
    async fn prepare(
        &self,
        request: &PageRequest,
        events: &EventSender,
        stages: &mut StageTracker,
    ) -> Result<PreparedPage, PipelineError> {
        let normalized = normalize_url(&request.url)?;
        let snapshot = request.dom_snapshot.as_ref();
        let mut derived_title = request.title.clone().unwrap_or_default();

        stages.enter(Stage::Fetching);
        events.progress("Analyzing the page").await?;

        let (kind, body) = match self.fetcher.fetch(&normalized).await {
            Ok(page) => {
                if let Some(title) = &page.title {
                    derived_title = title.clone();
                }
                let mut kind = page.kind;
                let mut body = page.body;
                // A thin HTML body usually means a script-rendered shell;
                // the client's snapshot has the rendered markup.
                let too_thin = matches!(&body, PageBody::Text(text)
                    if kind == PageKind::Html && text.len() < self.config.fetch.min_content_length);
                if too_thin {
                    if let Some(snap) = snapshot {
                        debug!(url = %normalized, "fetched body too thin, using dom snapshot");
                        kind = PageKind::Html;
                        body = PageBody::Text(snap.html.clone());
                        if let Some(title) = &snap.title {
                            derived_title = title.clone();
                        }
                    }
                }
                (kind, body)
            }
            Err(err) => match snapshot {
                Some(snap) => {
                    warn!(url = %normalized, error = %err, "fetch failed, using dom snapshot");
                    if let Some(title) = &snap.title {
                        derived_title = title.clone();
                    }
                    (PageKind::Html, PageBody::Text(snap.html.clone()))
                }
                None => return Err(PipelineError::FetchFailed(err.0)),
            },
        };

        stages.enter(Stage::Extracting);
        events.progress("Extracting the main content").await?;

        let mut extraction: Extraction = extract_main_text(kind, &body);

        // One retry against the alternate source when the primary one came up
        // empty and the snapshot was not already what we extracted from.
        if extraction.is_empty() {
            if let Some(snap) = snapshot {
                let already_used =
                    matches!(&body, PageBody::Text(text) if *text == snap.html);
                if !already_used {
                    debug!(url = %normalized, "extraction empty, retrying against dom snapshot");
                    let fallback =
                        extract_main_text(PageKind::Html, &PageBody::Text(snap.html.clone()));
                    if !fallback.is_empty() {
                        extraction = fallback;
                        if let Some(title) = &snap.title {
                            derived_title = title.clone();
                        }
                    }
                }
            }
        }

        if extraction.is_empty() {
            return Err(PipelineError::ExtractionEmpty);
        }

        let title = extraction
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| Some(derived_title).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| normalized.clone());

        let language = detect_language(&extraction.paragraphs.join("\n"));
        debug!(url = %normalized, paragraphs = extraction.paragraphs.len(), %language, "extraction done");

        let selected = match &self.retriever {
            Some(retriever) => {
                stages.enter(Stage::Retrieving);
                events.progress("Finding the key passages").await?;
                retriever
                    .index_and_select(
                        &normalized,
                        &title,
                        &extraction.paragraphs,
                        request.question.as_deref(),
                    )
                    .await?
            }
            None => pack_chunks(
                &extraction.paragraphs,
                self.config.chunking.retrieval_target,
            )
            .into_iter()
            .take(self.config.retrieval.prompt_chunk_cap)
            .collect(),
        };

        Ok(PreparedPage {
            url: normalized,
            title,
            language,
            paragraphs: extraction.paragraphs,
            selected,
        })
    }

    /// Strict mode: full pipeline, validated structured result, no events.
    pub async fn run_structured(
        &self,
        request: PageRequest,
    ) -> Result<SummaryResult, PipelineError> {
        let mut stages = StageTracker::new();
        let events = EventSender::disabled();
        let prepared = self.prepare(&request, &events, &mut stages).await?;

        stages.enter(Stage::Summarizing);
        let summarizer = Summarizer::new(self.completion.clone(), self.config.chunking.clone());
        let selected = self
            .retriever
            .is_some()
            .then(|| prepared.selected.as_slice());
        let result = summarizer
            .generate(
                &prepared.paragraphs,
                selected,
                &prepared.language,
                &prepared.url,
                &prepared.title,
            )
            .await;
        stages.enter(Stage::Terminal);
        result
    }

    /// Streaming mode: progress and delta events, raw text passthrough, one
    /// terminal event. Every failure, wherever it happens, becomes exactly
    /// one `error` event; a disconnected caller aborts silently.
    pub async fn run_stream(&self, request: PageRequest, events: EventSender) {
        let mut stages = StageTracker::new();
        match self.stream_inner(&request, &events, &mut stages).await {
            Ok(()) => {}
            Err(PipelineError::Cancelled) => {
                debug!("caller disconnected, abandoning request");
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "pipeline failed");
                let _ = events.send(StreamEvent::Error(err.to_string())).await;
            }
        }
        stages.enter(Stage::Terminal);
    }

    async fn stream_inner(
        &self,
        request: &PageRequest,
        events: &EventSender,
        stages: &mut StageTracker,
    ) -> Result<(), PipelineError> {
        let prepared = self.prepare(request, events, stages).await?;

        stages.enter(Stage::Summarizing);
        let chunks: Vec<String> = prepared
            .selected
            .iter()
            .take(self.config.retrieval.prompt_chunk_cap)
            .cloned()
            .collect();

        let question = request
            .question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty());
        let messages = match question {
            Some(question) => {
                events.progress("Writing the answer").await?;
                prompts::answer_markdown(&chunks, &prepared.language, &prepared.url, question)
            }
            None => {
                events.progress("Writing the summary").await?;
                prompts::summary_markdown(&chunks, &prepared.language, &prepared.url)
            }
        };

        let mut deltas = self.completion.stream(&messages).await?;
        stages.enter(Stage::StreamingDeltas);

        // Forward fragments in provider order; their concatenation is the
        // final payload.
        let mut accumulated = String::new();
        while let Some(item) = deltas.next().await {
            let fragment = item?;
            accumulated.push_str(&fragment);
            events.send(StreamEvent::Delta(fragment)).await?;
        }

        events.send(StreamEvent::Final(accumulated)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_http_and_https() {
        assert_eq!(
            normalize_url("https://example.com/page").unwrap(),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("http://example.com").unwrap(),
            "http://example.com/"
        );
    }

    #[test]
    fn normalize_drops_fragments() {
        assert_eq!(
            normalize_url("https://example.com/page#section-2").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn normalize_rejects_other_schemes() {
        for raw in ["ftp://example.com", "file:///etc/passwd", "not a url", ""] {
            let err = normalize_url(raw).unwrap_err();
            assert_eq!(err.kind(), "invalid_request");
        }
    }

    #[tokio::test]
    async fn disabled_sender_swallows_events() {
        let events = EventSender::disabled();
        assert!(events.progress("anything").await.is_ok());
        assert!(events.send(StreamEvent::Done).await.is_ok());
    }

    #[tokio::test]
    async fn dropped_receiver_cancels() {
        let (events, rx) = EventSender::channel(4);
        drop(rx);
        let err = events.progress("anything").await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }
}

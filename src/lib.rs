//! Retrieval-augmented page summarization service.
//!
//! The pipeline fetches (or reuses) page content, extracts the main text from
//! HTML or PDF, incrementally indexes chunk embeddings keyed by content hash,
//! retrieves the most relevant passages, and streams a model-written summary
//! or answer back to the caller as server-sent events.

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod fetch;
pub mod language;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod rag;
pub mod server;
pub mod summarize;
pub mod text;

pub use config::Config;
pub use error::PipelineError;
pub use events::StreamEvent;
pub use pipeline::{DomSnapshot, EventSender, PageRequest, Pipeline};
pub use summarize::SummaryResult;

use serde::Serialize;

/// One event on the wire. Per request the order is: zero or more `Progress`,
/// zero or more `Delta`, then exactly one of `Final`, `Error` or `Done`.
/// Concatenating the deltas in emission order equals the final text.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Human-readable status line for the caller's UI.
    Progress(String),
    /// One incremental fragment of the answer text, forwarded verbatim.
    Delta(String),
    /// Complete result text; terminal.
    Final(String),
    /// Human-readable failure; terminal.
    Error(String),
    /// Empty terminal marker for modes without an aggregate payload.
    Done,
}

impl StreamEvent {
    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Progress(_) => "progress",
            StreamEvent::Delta(_) => "delta",
            StreamEvent::Final(_) => "final",
            StreamEvent::Error(_) => "error",
            StreamEvent::Done => "done",
        }
    }

    /// SSE data payload. `Done` carries an empty object so every event has a
    /// body the client can parse uniformly.
    pub fn payload(&self) -> &str {
        match self {
            StreamEvent::Progress(text)
            | StreamEvent::Delta(text)
            | StreamEvent::Final(text)
            | StreamEvent::Error(text) => text,
            StreamEvent::Done => "{}",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Final(_) | StreamEvent::Error(_) | StreamEvent::Done
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_wire_vocabulary() {
        assert_eq!(StreamEvent::Progress("p".into()).kind(), "progress");
        assert_eq!(StreamEvent::Delta("d".into()).kind(), "delta");
        assert_eq!(StreamEvent::Final("f".into()).kind(), "final");
        assert_eq!(StreamEvent::Error("e".into()).kind(), "error");
        assert_eq!(StreamEvent::Done.kind(), "done");
    }

    #[test]
    fn only_the_three_terminals_terminate() {
        assert!(!StreamEvent::Progress("p".into()).is_terminal());
        assert!(!StreamEvent::Delta("d".into()).is_terminal());
        assert!(StreamEvent::Final("f".into()).is_terminal());
        assert!(StreamEvent::Error("e".into()).is_terminal());
        assert!(StreamEvent::Done.is_terminal());
    }
}

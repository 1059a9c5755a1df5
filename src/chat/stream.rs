//! Aggregation of streamed completion fragments. Each fragment is
//! forwarded for progressive display as it arrives while the ordered
//! concatenation accumulates for the transcript. One aggregator
//! instance covers exactly one request/response cycle.

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The fragment stream ended abnormally (transport failure,
    /// provider error, or cancellation). Carries whatever partial
    /// text had accumulated so the caller can decide what to do with
    /// it. This system's policy is to discard it.
    #[error("completion stream interrupted after {} bytes", partial.len())]
    Interrupted { partial: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    AwaitingFirstFragment,
    Streaming,
    Complete,
    Failed,
}

/// Single-pass accumulator for one streamed response. Fragments are
/// forwarded in arrival order with no buffering beyond the current
/// fragment, never dropped or modified, and no fragment boundary is
/// assumed to align with a token or word.
pub struct StreamAggregator {
    state: StreamState,
    buf: String,
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl StreamAggregator {
    pub fn new(tx: Option<mpsc::UnboundedSender<String>>) -> Self {
        Self {
            state: StreamState::AwaitingFirstFragment,
            buf: String::new(),
            tx,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Forwards one fragment to the display channel and appends it to
    /// the aggregate. A closed receiver is not an error; the response
    /// still needs to finish accumulating for the transcript.
    pub fn push(&mut self, fragment: &str) {
        debug_assert!(matches!(
            self.state,
            StreamState::AwaitingFirstFragment | StreamState::Streaming
        ));
        self.state = StreamState::Streaming;
        if let Some(tx) = &self.tx {
            let _ = tx.send(fragment.to_string());
        }
        self.buf.push_str(fragment);
    }

    /// Ends the cycle normally, yielding the full concatenation. An
    /// empty fragment sequence yields the empty string.
    pub fn finish(mut self) -> String {
        self.state = StreamState::Complete;
        self.buf
    }

    /// Ends the cycle abnormally. The partial aggregate rides along
    /// in the error.
    pub fn interrupt(mut self) -> StreamError {
        self.state = StreamState::Failed;
        StreamError::Interrupted { partial: self.buf }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progressive_fragments_equal_final_aggregate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut aggregator = StreamAggregator::new(Some(tx));

        for fragment in ["TMS ", "treats ", "depression."] {
            aggregator.push(fragment);
        }
        let full = aggregator.finish();
        assert_eq!(full, "TMS treats depression.");

        let mut forwarded = String::new();
        while let Ok(fragment) = rx.try_recv() {
            forwarded.push_str(&fragment);
        }
        assert_eq!(forwarded, full);
    }

    #[test]
    fn test_empty_sequence_yields_empty_string() {
        let aggregator = StreamAggregator::new(None);
        assert_eq!(aggregator.finish(), "");
    }

    #[test]
    fn test_fragment_boundaries_are_preserved() {
        // Boundaries need not align with words or sentences.
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut aggregator = StreamAggregator::new(Some(tx));
        for fragment in ["dep", "res", "sion"] {
            aggregator.push(fragment);
        }
        assert_eq!(rx.try_recv().unwrap(), "dep");
        assert_eq!(rx.try_recv().unwrap(), "res");
        assert_eq!(rx.try_recv().unwrap(), "sion");
        assert_eq!(aggregator.finish(), "depression");
    }

    #[test]
    fn test_interrupt_carries_partial() {
        let mut aggregator = StreamAggregator::new(None);
        aggregator.push("TMS trea");
        let err = aggregator.interrupt();
        match err {
            StreamError::Interrupted { partial } => assert_eq!(partial, "TMS trea"),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut aggregator = StreamAggregator::new(None);
        assert_eq!(aggregator.state(), StreamState::AwaitingFirstFragment);
        aggregator.push("a");
        assert_eq!(aggregator.state(), StreamState::Streaming);
        aggregator.push("b");
        assert_eq!(aggregator.state(), StreamState::Streaming);
    }

    #[test]
    fn test_closed_receiver_does_not_stop_aggregation() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut aggregator = StreamAggregator::new(Some(tx));
        aggregator.push("still ");
        aggregator.push("works");
        assert_eq!(aggregator.finish(), "still works");
    }
}

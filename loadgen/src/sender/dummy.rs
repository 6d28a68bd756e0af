//! A sender that counts spans and discards them.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use loadgen_payload::Fielder;
use tracing::info;

use super::{Error, Sendable, Sender, Span, SpanContext};

#[derive(Debug, Default)]
struct Counts {
    traces: AtomicU64,
    spans: AtomicU64,
}

#[derive(Debug, Default)]
/// Counts spans and drops them.
pub struct Dummy {
    counts: Arc<Counts>,
}

#[derive(Debug)]
/// A span that is counted when sent.
pub struct DummySpan {
    counts: Arc<Counts>,
}

impl Dummy {
    /// Traces started so far.
    #[must_use]
    pub fn traces(&self) -> u64 {
        self.counts.traces.load(Ordering::Relaxed)
    }

    /// Spans sent so far.
    #[must_use]
    pub fn spans(&self) -> u64 {
        self.counts.spans.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sender for Dummy {
    type Span = DummySpan;

    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span) {
        // Fields are still generated so the dummy run costs what a real one does.
        let span = Span::root(name, fielder, count);
        self.counts.traces.fetch_add(1, Ordering::Relaxed);
        (
            span.context,
            DummySpan {
                counts: Arc::clone(&self.counts),
            },
        )
    }

    fn create_span(
        &self,
        parent: &SpanContext,
        name: &str,
        level: usize,
        fielder: &Fielder,
    ) -> (SpanContext, Self::Span) {
        let span = Span::child(parent, name, level, fielder);
        (
            span.context,
            DummySpan {
                counts: Arc::clone(&self.counts),
            },
        )
    }

    async fn close(&self) -> Result<(), Error> {
        info!(
            traces = self.traces(),
            spans = self.spans(),
            "Dummy sender closed"
        );
        Ok(())
    }
}

impl Sendable for DummySpan {
    fn send(self) {
        self.counts.spans.fetch_add(1, Ordering::Relaxed);
    }
}

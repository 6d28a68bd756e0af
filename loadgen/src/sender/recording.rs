//! A sender that keeps every finished span in memory.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use loadgen_payload::Fielder;

use super::{Error, Sendable, Sender, Span, SpanContext};

#[derive(Debug, Clone, Default)]
pub(crate) struct Recording {
    spans: Arc<Mutex<Vec<Span>>>,
}

#[derive(Debug)]
pub(crate) struct RecordingSpan {
    span: Span,
    spans: Arc<Mutex<Vec<Span>>>,
}

impl Recording {
    /// Finished spans in the order they were sent.
    pub(crate) fn spans(&self) -> Vec<Span> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Sender for Recording {
    type Span = RecordingSpan;

    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span) {
        let span = Span::root(name, fielder, count);
        (
            span.context,
            RecordingSpan {
                span,
                spans: Arc::clone(&self.spans),
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
            RecordingSpan {
                span,
                spans: Arc::clone(&self.spans),
            },
        )
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl Sendable for RecordingSpan {
    fn send(mut self) {
        self.span.finish();
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.span);
    }
}

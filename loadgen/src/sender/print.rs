//! A sender that writes one line per finished span.
//!
//! Lines look like
//!
//! ```text
//! T:<trace id> S:<span id> P:<parent id or -> <service> <name> <start> <end> <fields as json>
//! ```
//!
//! with RFC 3339 timestamps.

use std::{
    fmt,
    io::{self, Write},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use async_trait::async_trait;
use loadgen_payload::Fielder;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, warn};

use super::{Error, Sendable, Sender, Span, SpanContext};

struct Inner {
    writer: Mutex<Box<dyn Write + Send>>,
    traces: AtomicU64,
    spans: AtomicU64,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("traces", &self.traces)
            .field("spans", &self.spans)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
/// Writes spans as text lines.
pub struct Print {
    inner: Arc<Inner>,
}

#[derive(Debug)]
/// A span that is written when sent.
pub struct PrintSpan {
    span: Span,
    inner: Arc<Inner>,
}

impl Print {
    /// Write to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Write to `writer`.
    #[must_use]
    pub fn with_writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                writer: Mutex::new(Box::new(writer)),
                traces: AtomicU64::new(0),
                spans: AtomicU64::new(0),
            }),
        }
    }

    fn bind(&self, span: Span) -> (SpanContext, PrintSpan) {
        (
            span.context,
            PrintSpan {
                span,
                inner: Arc::clone(&self.inner),
            },
        )
    }
}

fn rfc3339(at: SystemTime) -> String {
    OffsetDateTime::from(at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("-"))
}

fn render(span: &Span) -> String {
    let parent = span
        .parent_id
        .map_or_else(|| String::from("-"), |id| id.to_string());
    let end = span.end.map_or_else(|| String::from("-"), rfc3339);
    let fields = serde_json::to_string(&span.fields).unwrap_or_else(|_| String::from("{}"));
    format!(
        "T:{trace} S:{id} P:{parent} {service} {name} {start} {end} {fields}",
        trace = span.context.trace_id,
        id = span.context.span_id,
        service = span.service,
        name = span.name,
        start = rfc3339(span.start),
    )
}

#[async_trait]
impl Sender for Print {
    type Span = PrintSpan;

    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span) {
        self.inner.traces.fetch_add(1, Ordering::Relaxed);
        self.bind(Span::root(name, fielder, count))
    }

    fn create_span(
        &self,
        parent: &SpanContext,
        name: &str,
        level: usize,
        fielder: &Fielder,
    ) -> (SpanContext, Self::Span) {
        self.bind(Span::child(parent, name, level, fielder))
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        info!(
            traces = self.inner.traces.load(Ordering::Relaxed),
            spans = self.inner.spans.load(Ordering::Relaxed),
            "Print sender closed"
        );
        Ok(())
    }
}

impl Sendable for PrintSpan {
    fn send(mut self) {
        self.span.finish();
        let line = render(&self.span);
        let mut writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(writer, "{line}") {
            warn!("Failed to write span: {err}");
            return;
        }
        self.inner.spans.fetch_add(1, Ordering::Relaxed);
    }
}

//! The span transports.
//!
//! The trace generator builds spans through a [`Sender`] and hands each one
//! back through [`Sendable::send`] once it has ended. Every span carries its
//! service name, trace and span ids, parent id, start and end time and the
//! fields the [`Fielder`] selected for its level.

use std::{fmt, time::SystemTime};

use async_trait::async_trait;
use loadgen_payload::{Fielder, Fields};

use crate::config::{Config, SenderKind};

pub mod dummy;
pub mod otlp;
pub mod print;
#[cfg(test)]
pub(crate) mod recording;

/// Errors produced by [`Sender`] implementations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Output could not be written or flushed
    #[error("Failed to write spans: {0}")]
    Io(#[from] std::io::Error),
    /// The OTLP exporter failed to start or stop
    #[error(transparent)]
    Otlp(#[from] otlp::Error),
}

/// Sender contract between the trace generator and a transport.
#[async_trait]
pub trait Sender: Send + Sync + 'static {
    /// The in-flight span handed back by `create_*`.
    type Span: Sendable;

    /// Begin a parentless root span. Root fields are requested at level 0,
    /// with `count` included when non-zero.
    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span);

    /// Begin a child span of `parent` with the fields scoped to `level`.
    fn create_span(
        &self,
        parent: &SpanContext,
        name: &str,
        level: usize,
        fielder: &Fielder,
    ) -> (SpanContext, Self::Span);

    /// Flush and shut down the transport. Called once at the end of a run.
    ///
    /// # Errors
    ///
    /// Fails if buffered spans cannot be flushed.
    async fn close(&self) -> Result<(), Error>;
}

/// A span that has been started and is waiting to be sent.
pub trait Sendable: Send {
    /// Stamp the end time and hand the span to the transport.
    fn send(self);
}

/// A 128-bit trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// A random, non-zero id.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random::<u128>().max(1))
    }

    /// Big-endian bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// A 64-bit span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// A random, non-zero id.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random::<u64>().max(1))
    }

    /// Big-endian bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifies a span so that children can be attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    /// The trace the span belongs to
    pub trace_id: TraceId,
    /// The span itself
    pub span_id: SpanId,
    /// Nesting level, 0 for the root
    pub level: usize,
}

impl SpanContext {
    fn root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            level: 0,
        }
    }

    fn child(&self, level: usize) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            level,
        }
    }
}

/// A transport-independent span.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    /// Operation name
    pub name: String,
    /// Service the span is attributed to
    pub service: String,
    /// Ids and level
    pub context: SpanContext,
    /// Parent span, `None` for a root
    pub parent_id: Option<SpanId>,
    /// Wall-clock start
    pub start: SystemTime,
    /// Wall-clock end, set by [`Span::finish`]
    pub end: Option<SystemTime>,
    /// Generated fields
    pub fields: Fields,
}

impl Span {
    /// Start a root span.
    #[must_use]
    pub fn root(name: &str, fielder: &Fielder, count: u64) -> Self {
        Self {
            name: name.to_string(),
            service: fielder.service_name(0).to_string(),
            context: SpanContext::root(),
            parent_id: None,
            start: SystemTime::now(),
            end: None,
            fields: fielder.fields(count, 0),
        }
    }

    /// Start a child of `parent` at `level`.
    #[must_use]
    pub fn child(parent: &SpanContext, name: &str, level: usize, fielder: &Fielder) -> Self {
        Self {
            name: name.to_string(),
            service: fielder.service_name(level).to_string(),
            context: parent.child(level),
            parent_id: Some(parent.span_id),
            start: SystemTime::now(),
            end: None,
            fields: fielder.fields(0, level),
        }
    }

    /// Record the end time.
    pub fn finish(&mut self) {
        self.end = Some(SystemTime::now());
    }
}

/// Sender selected by configuration.
#[derive(Debug)]
pub enum Transport {
    /// See [`crate::sender::print::Print`] for details.
    Print(print::Print),
    /// See [`crate::sender::dummy::Dummy`] for details.
    Dummy(dummy::Dummy),
    /// See [`crate::sender::otlp::Otlp`] for details.
    Otlp(otlp::Otlp),
}

/// Span type of [`Transport`].
#[derive(Debug)]
pub enum TransportSpan {
    /// A span bound for stdout
    Print(print::PrintSpan),
    /// A span that is only counted
    Dummy(dummy::DummySpan),
    /// A span bound for the OTLP exporter
    Otlp(otlp::OtlpSpan),
}

impl Transport {
    /// Create the configured transport. The OTLP transport spawns its exporter
    /// and so must be created within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the OTLP endpoint or headers are invalid.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let transport = match config.output.sender {
            SenderKind::Print => Transport::Print(print::Print::stdout()),
            SenderKind::Dummy => Transport::Dummy(dummy::Dummy::default()),
            SenderKind::Otlp => {
                Transport::Otlp(otlp::Otlp::new(&config.output, &config.telemetry)?)
            }
        };
        Ok(transport)
    }
}

#[async_trait]
impl Sender for Transport {
    type Span = TransportSpan;

    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span) {
        match self {
            Transport::Print(inner) => {
                let (ctx, span) = inner.create_trace(name, fielder, count);
                (ctx, TransportSpan::Print(span))
            }
            Transport::Dummy(inner) => {
                let (ctx, span) = inner.create_trace(name, fielder, count);
                (ctx, TransportSpan::Dummy(span))
            }
            Transport::Otlp(inner) => {
                let (ctx, span) = inner.create_trace(name, fielder, count);
                (ctx, TransportSpan::Otlp(span))
            }
        }
    }

    fn create_span(
        &self,
        parent: &SpanContext,
        name: &str,
        level: usize,
        fielder: &Fielder,
    ) -> (SpanContext, Self::Span) {
        match self {
            Transport::Print(inner) => {
                let (ctx, span) = inner.create_span(parent, name, level, fielder);
                (ctx, TransportSpan::Print(span))
            }
            Transport::Dummy(inner) => {
                let (ctx, span) = inner.create_span(parent, name, level, fielder);
                (ctx, TransportSpan::Dummy(span))
            }
            Transport::Otlp(inner) => {
                let (ctx, span) = inner.create_span(parent, name, level, fielder);
                (ctx, TransportSpan::Otlp(span))
            }
        }
    }

    async fn close(&self) -> Result<(), Error> {
        match self {
            Transport::Print(inner) => inner.close().await,
            Transport::Dummy(inner) => inner.close().await,
            Transport::Otlp(inner) => inner.close().await,
        }
    }
}

impl Sendable for TransportSpan {
    fn send(self) {
        match self {
            TransportSpan::Print(span) => span.send(),
            TransportSpan::Dummy(span) => span.send(),
            TransportSpan::Otlp(span) => span.send(),
        }
    }
}

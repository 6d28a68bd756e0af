//! Trace shape generation.
//!
//! A trace is a root span with a recursive tree of children. Each level takes
//! a random slice of the remaining time for itself and splits the rest across
//! its siblings, sleeping for real so a trace takes about as long as the
//! durations it records.

use std::time::Duration;

use futures::{FutureExt, future::BoxFuture};
use loadgen_payload::{Fielder, Rng};
use metrics::counter;
use tokio::time::sleep;

use crate::sender::{Sendable, Sender, SpanContext};

/// The shape of every generated trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Nesting depth
    pub depth: usize,
    /// Span budget
    pub span_count: usize,
    /// Wall-clock duration of one trace
    pub duration: Duration,
}

fn divide(duration: Duration, parts: usize) -> Duration {
    duration / u32::try_from(parts.max(1)).unwrap_or(u32::MAX)
}

/// Builds traces through a sender.
pub(crate) struct Tracer<'a, S> {
    pub(crate) sender: &'a S,
    pub(crate) fielder: &'a Fielder,
}

impl<S> Tracer<'_, S>
where
    S: Sender,
{
    /// Generate one whole trace. Returns once the root span has been sent.
    pub(crate) async fn generate_root(&self, rng: &mut Rng, shape: Shape, count: u64) {
        let (context, root) = self.sender.create_trace("root", self.fielder, count);
        let this_span = rng.duration(divide(shape.duration, shape.span_count + 1));
        let half = this_span / 2;

        sleep(half).await;
        self.generate_spans(
            rng,
            context,
            shape.depth.saturating_sub(1),
            shape.span_count.saturating_sub(1),
            shape.duration.saturating_sub(this_span),
        )
        .await;
        sleep(this_span - half).await;

        root.send();
        counter!("spans_sent").increment(1);
        counter!("traces_sent").increment(1);
    }

    /// Generate the children of `parent`. With more span budget than depth a
    /// level may fan out into several siblings; with less the trace is cut
    /// short once the budget is spent.
    fn generate_spans<'b>(
        &'b self,
        rng: &'b mut Rng,
        parent: SpanContext,
        depth: usize,
        span_count: usize,
        remaining: Duration,
    ) -> BoxFuture<'b, ()> {
        async move {
            if depth == 0 || span_count == 0 {
                return;
            }
            let nspans = if span_count > depth + 1 {
                1 + rng.intn(span_count - depth - 1)
            } else {
                1
            };

            let mut this_level = rng.duration(divide(remaining, span_count + 1));
            let per_child = divide(remaining.saturating_sub(this_level), nspans);
            let level = parent.level + 1;

            for i in 0..nspans {
                let this_span = divide(this_level, nspans - i);
                this_level -= this_span;
                let half = this_span / 2;

                sleep(half).await;
                let (context, span) = self
                    .sender
                    .create_span(&parent, "child", level, self.fielder);
                self.generate_spans(
                    &mut *rng,
                    context,
                    depth - 1,
                    span_count - nspans,
                    per_child,
                )
                .await;
                sleep(this_span - half).await;

                span.send();
                counter!("spans_sent").increment(1);
            }
        }
        .boxed()
    }
}

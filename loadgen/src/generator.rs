//! The trace generator.
//!
//! A controller ramps a pool of workers up to the size needed for the target
//! rate, holds it there, then ramps it back down one worker per tick. Ramp up
//! and ramp down share one tick interval, so stopping takes as long as
//! starting. Each worker generates at most one whole trace per trace duration.
//!
//! External shutdown stops every worker at once, abandoning traces in flight.
//! The maximum run time and a finished trace budget both taper instead.

use std::{
    collections::VecDeque,
    num::NonZeroU64,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use loadgen_payload::{Fielder, Rng};
use loadgen_signal::{Broadcaster, Watcher};
use metrics::gauge;
use tokio::{
    task::JoinSet,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::sender::Sender;

pub mod budget;
pub mod shape;

pub use budget::TraceBudget;
pub use shape::Shape;
use shape::Tracer;

const MIN_RAMP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`TraceGenerator`].
pub enum Error {
    /// A worker task panicked
    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// Rate is not a positive finite number
    #[error("Traces per second must be positive and finite, got {0}")]
    InvalidRate(f64),
    /// Trace duration of zero
    #[error("Trace duration must be greater than zero")]
    ZeroDuration,
    /// Trace depth of zero
    #[error("Trace depth must be at least 1")]
    ZeroDepth,
}

/// Controller phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Adding one worker per tick
    Starting,
    /// Holding the worker count
    Running,
    /// Removing one worker per tick
    Stopping,
}

/// How many traces to generate and how quickly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    /// Aggregate traces per second across all workers
    pub traces_per_second: f64,
    /// Total traces to generate, `None` for no limit
    pub trace_count: Option<NonZeroU64>,
    /// Run time before ramping down, `None` for no limit
    pub max_time: Option<Duration>,
    /// Time to ramp up to the full worker count
    pub ramp: Duration,
}

/// Read-only view of the live worker count.
#[derive(Debug, Clone, Default)]
pub struct Workers(Arc<AtomicUsize>);

impl Workers {
    /// Workers currently running.
    #[must_use]
    pub fn running(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, n: usize) {
        self.0.store(n, Ordering::Release);
        gauge!("workers_running").set(n as f64);
    }
}

#[derive(Debug)]
struct Shared<S> {
    sender: Arc<S>,
    fielder: Arc<Fielder>,
    budget: TraceBudget,
    seed: String,
    shape: Shape,
}

#[derive(Debug)]
/// Drives a pool of trace-generating workers.
pub struct TraceGenerator<S> {
    shared: Arc<Shared<S>>,
    throughput: Throughput,
    workers: Workers,
}

impl<S> TraceGenerator<S>
where
    S: Sender,
{
    /// Create a new [`TraceGenerator`]. Each worker derives its own `Rng`
    /// from `seed` and its worker index.
    ///
    /// # Errors
    ///
    /// Fails on a zero depth or duration, or a rate that is not positive and
    /// finite.
    pub fn new(
        sender: Arc<S>,
        fielder: Arc<Fielder>,
        seed: &str,
        shape: Shape,
        throughput: Throughput,
    ) -> Result<Self, Error> {
        if shape.depth == 0 {
            return Err(Error::ZeroDepth);
        }
        if shape.duration.is_zero() {
            return Err(Error::ZeroDuration);
        }
        let tps = throughput.traces_per_second;
        if !tps.is_finite() || tps <= 0.0 {
            return Err(Error::InvalidRate(tps));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                sender,
                fielder,
                budget: TraceBudget::new(throughput.trace_count),
                seed: seed.to_string(),
                shape,
            }),
            throughput,
            workers: Workers::default(),
        })
    }

    /// Traces per second generated by a single worker.
    #[must_use]
    pub fn tps(&self) -> f64 {
        1.0 / self.shared.shape.duration.as_secs_f64()
    }

    /// Workers needed for the target rate, rounded to nearest and at least 1.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_workers(&self) -> usize {
        let workers = (self.throughput.traces_per_second / self.tps() + 0.5).floor();
        (workers as usize).max(1)
    }

    /// Controller tick interval, the ramp time spread over the target workers.
    #[must_use]
    pub fn ramp_interval(&self) -> Duration {
        let workers = u32::try_from(self.target_workers()).unwrap_or(u32::MAX);
        (self.throughput.ramp / workers).max(MIN_RAMP_INTERVAL)
    }

    /// Handle on the live worker count, usable while [`Self::spin`] runs.
    #[must_use]
    pub fn workers(&self) -> Workers {
        self.workers.clone()
    }

    /// Run the controller until every worker has stopped.
    ///
    /// # Errors
    ///
    /// Function will return an error if a worker task panics.
    pub async fn spin(self, shutdown: Watcher) -> Result<(), Error> {
        let target = self.target_workers();
        let period = self.ramp_interval();
        info!(
            target_workers = target,
            interval = ?period,
            traces_per_second = self.throughput.traces_per_second,
            "Starting trace generator"
        );
        gauge!("target_workers").set(target as f64);

        let shutdown_wait = shutdown.recv();
        tokio::pin!(shutdown_wait);

        let max_time = self.throughput.max_time;
        let deadline = async move {
            match max_time {
                Some(max_time) => time::sleep(max_time).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        let mut deadline_armed = true;

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = State::Starting;
        let mut stops: VecDeque<Broadcaster> = VecDeque::new();
        let mut tasks = JoinSet::new();
        let mut next_id: u64 = 0;

        loop {
            tokio::select! {
                () = &mut shutdown_wait => {
                    info!("shutdown signal received, stopping {} workers", stops.len());
                    for stop in stops.drain(..) {
                        stop.signal();
                    }
                    break;
                },
                () = &mut deadline, if deadline_armed => {
                    deadline_armed = false;
                    if state != State::Stopping {
                        info!("Maximum run time reached, ramping down");
                        state = State::Stopping;
                    }
                },
                _ = ticker.tick() => {
                    if state != State::Stopping && self.shared.budget.is_complete() {
                        info!(
                            traces = self.shared.budget.completed(),
                            "Trace budget complete, ramping down"
                        );
                        state = State::Stopping;
                    }
                    match state {
                        State::Starting => {
                            if stops.len() >= target {
                                info!("All {target} workers started, running");
                                state = State::Running;
                            } else {
                                let (watcher, broadcaster) = loadgen_signal::signal();
                                tasks.spawn(worker(Arc::clone(&self.shared), next_id, watcher));
                                stops.push_back(broadcaster);
                                debug!(worker = next_id, running = stops.len(), "Started worker");
                                next_id += 1;
                            }
                        }
                        State::Running => {}
                        State::Stopping => {
                            if let Some(stop) = stops.pop_front() {
                                stop.signal();
                                debug!(running = stops.len(), "Stopped worker");
                            } else {
                                info!("All workers stopped");
                                break;
                            }
                        }
                    }
                    self.workers.set(stops.len());
                },
                Some(result) = tasks.join_next() => {
                    result?;
                }
            }
        }

        self.workers.set(0);
        while let Some(result) = tasks.join_next().await {
            result?;
        }
        Ok(())
    }
}

/// Generate one trace per trace duration until stopped. A trace in flight
/// when the stop arrives is abandoned.
async fn worker<S>(shared: Arc<Shared<S>>, id: u64, stop: Watcher)
where
    S: Sender,
{
    let mut rng = Rng::with_stream(&shared.seed, id);
    let period = shared.shape.duration;
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let tracer = Tracer {
        sender: shared.sender.as_ref(),
        fielder: shared.fielder.as_ref(),
    };

    let stop_wait = stop.recv();
    tokio::pin!(stop_wait);

    loop {
        tokio::select! {
            () = &mut stop_wait => break,
            _ = ticker.tick() => {
                let Some(count) = shared.budget.try_claim() else {
                    continue;
                };
                tokio::select! {
                    () = tracer.generate_root(&mut rng, shared.shape, count) => {
                        shared.budget.complete();
                    }
                    () = &mut stop_wait => {
                        debug!(worker = id, "Abandoning trace {count}");
                        break;
                    }
                }
            }
        }
    }
    debug!(worker = id, "Worker stopped");
}

//! Value generators.
//!
//! A `ValueGenerator` produces one typed value per call. Each generator owns a
//! private `Rng`, so its sequence depends only on the seed it was forked from
//! and on how many times it has been called, never on which thread calls it.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use crate::{AttributeSink, Kind, Rng, Value};

type Sample<T> = Box<dyn Fn(&mut Rng) -> T + Send + Sync>;

enum Sampler {
    Int(Sample<i64>),
    Float(Sample<f64>),
    Str(Sample<String>),
    Bool(Sample<bool>),
}

/// Produces one value of a fixed `Kind` on each call.
pub struct ValueGenerator {
    rng: Mutex<Rng>,
    sampler: Sampler,
}

impl fmt::Debug for ValueGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueGenerator")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

impl ValueGenerator {
    fn new(rng: Rng, sampler: Sampler) -> Self {
        Self {
            rng: Mutex::new(rng),
            sampler,
        }
    }

    /// Generator of integers.
    pub fn int<F>(rng: Rng, f: F) -> Self
    where
        F: Fn(&mut Rng) -> i64 + Send + Sync + 'static,
    {
        Self::new(rng, Sampler::Int(Box::new(f)))
    }

    /// Generator of floats.
    pub fn float<F>(rng: Rng, f: F) -> Self
    where
        F: Fn(&mut Rng) -> f64 + Send + Sync + 'static,
    {
        Self::new(rng, Sampler::Float(Box::new(f)))
    }

    /// Generator of strings.
    pub fn string<F>(rng: Rng, f: F) -> Self
    where
        F: Fn(&mut Rng) -> String + Send + Sync + 'static,
    {
        Self::new(rng, Sampler::Str(Box::new(f)))
    }

    /// Generator of booleans.
    pub fn boolean<F>(rng: Rng, f: F) -> Self
    where
        F: Fn(&mut Rng) -> bool + Send + Sync + 'static,
    {
        Self::new(rng, Sampler::Bool(Box::new(f)))
    }

    /// Generator that always returns `value`.
    #[must_use]
    pub fn constant(rng: Rng, value: Value) -> Self {
        match value {
            Value::Int(v) => Self::int(rng, move |_| v),
            Value::Float(v) => Self::float(rng, move |_| v),
            Value::Str(v) => Self::string(rng, move |_| v.clone()),
            Value::Bool(v) => Self::boolean(rng, move |_| v),
        }
    }

    /// The kind of value this generator produces.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self.sampler {
            Sampler::Int(_) => Kind::Int,
            Sampler::Float(_) => Kind::Float,
            Sampler::Str(_) => Kind::Str,
            Sampler::Bool(_) => Kind::Bool,
        }
    }

    /// Produce the next value.
    pub fn generate(&self) -> Value {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        match &self.sampler {
            Sampler::Int(f) => Value::Int(f(&mut rng)),
            Sampler::Float(f) => Value::Float(f(&mut rng)),
            Sampler::Str(f) => Value::Str(f(&mut rng)),
            Sampler::Bool(f) => Value::Bool(f(&mut rng)),
        }
    }

    /// Produce the next value and hand it to the sink setter of its kind.
    pub fn emit<S>(&self, key: &str, sink: &mut S)
    where
        S: AttributeSink + ?Sized,
    {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        match &self.sampler {
            Sampler::Int(f) => sink.int(key, f(&mut rng)),
            Sampler::Float(f) => sink.float(key, f(&mut rng)),
            Sampler::Str(f) => sink.string(key, f(&mut rng)),
            Sampler::Bool(f) => sink.bool(key, f(&mut rng)),
        }
    }
}

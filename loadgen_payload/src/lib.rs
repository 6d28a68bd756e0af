//! The loadgen payloads
//!
//! This library supports field generation for the loadgen project: a seeded
//! random source, the field-spec grammar, the periodic key eligibility
//! scheduler and the `Fielder` that materializes fields onto spans.

#![deny(clippy::cargo)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]

pub mod eligibility;
pub mod field;
pub mod fielder;
pub mod generator;
pub mod rng;
pub mod value;
pub mod words;

pub use eligibility::PeriodicEligibility;
pub use field::{FieldSpec, Spec};
pub use fielder::{AttributeSink, Fielder, Fields, Options};
pub use generator::ValueGenerator;
pub use rng::Rng;
pub use value::{Kind, Value};

//! The per-run field set.
//!
//! A `Fielder` is built once from a seed and the user's field specs. It owns a
//! generator for every field, the service names, and the attribute budget used
//! by transports that cap attributes per span. Keys keep a fixed order: user
//! fields as declared, then auto-named extras, then `process_id`.

use std::sync::{Mutex, PoisonError};

use serde::{Serialize, Serializer, ser::SerializeMap};
use tracing::debug;

use crate::{
    Rng, Value, ValueGenerator, eligibility,
    field::{self, FieldSpec, Spec},
    words::SPICES,
};

/// Generator archetypes for auto-named extra fields.
const EXTRAS: [Spec; 15] = [
    Spec::Int { low: 0, high: 100 },
    Spec::Bool { percent: 99.0 },
    Spec::Bool { percent: 50.0 },
    Spec::Bool { percent: 1.0 },
    Spec::Int {
        low: -100,
        high: 100,
    },
    Spec::Float {
        low: 0.0,
        high: 1000.0,
    },
    Spec::Float { low: 0.0, high: 1.0 },
    Spec::GaussianInt {
        mean: 50.0,
        stddev: 30.0,
    },
    Spec::GaussianFloat {
        mean: 10_000.0,
        stddev: 1000.0,
    },
    Spec::GaussianFloat {
        mean: 500.0,
        stddev: 300.0,
    },
    Spec::Alpha { length: 2 },
    Spec::Alpha { length: 5 },
    Spec::Alpha { length: 10 },
    Spec::Guid,
    Spec::Hex { length: 16 },
];

/// Errors produced when building a [`Fielder`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A user field could not be parsed or built
    #[error(transparent)]
    Field(#[from] field::Error),
    /// A key scheduler could not be built
    #[error(transparent)]
    Eligibility(#[from] eligibility::Error),
    /// Zero services were requested
    #[error("at least one service is required")]
    NoServices,
}

/// Receives typed attributes from [`Fielder::add_attributes`].
pub trait AttributeSink {
    /// Set an integer attribute.
    fn int(&mut self, key: &str, value: i64);
    /// Set a float attribute.
    fn float(&mut self, key: &str, value: f64);
    /// Set a string attribute.
    fn string(&mut self, key: &str, value: String);
    /// Set a boolean attribute.
    fn bool(&mut self, key: &str, value: bool);
}

/// Construction options for a [`Fielder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Number of auto-named extra fields
    pub extra_fields: usize,
    /// Number of distinct service names
    pub nservices: usize,
    /// Attributes per span for budgeted transports, `None` for every field
    pub attributes_per_span: Option<usize>,
    /// Leading keys always included in the attribute budget
    pub intrinsic_attributes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            extra_fields: 0,
            nservices: 1,
            attributes_per_span: None,
            intrinsic_attributes: 0,
        }
    }
}

/// An ordered name to value mapping for one span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(String, Value)>,
}

impl Fields {
    /// Create an empty set with room for `capacity` fields.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert `value` under `name`, replacing any existing value in place.
    pub fn insert(&mut self, name: &str, value: Value) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// The value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl AttributeSink for Fields {
    fn int(&mut self, key: &str, value: i64) {
        self.insert(key, Value::Int(value));
    }

    fn float(&mut self, key: &str, value: f64) {
        self.insert(key, Value::Float(value));
    }

    fn string(&mut self, key: &str, value: String) {
        self.insert(key, Value::Str(value));
    }

    fn bool(&mut self, key: &str, value: bool) {
        self.insert(key, Value::Bool(value));
    }
}

#[derive(Debug)]
struct Field {
    key: String,
    name: String,
    level: Option<usize>,
    generator: ValueGenerator,
}

impl Field {
    fn applies_at(&self, level: usize) -> bool {
        self.level.is_none_or(|l| l == level)
    }
}

fn upsert(fields: &mut Vec<Field>, field: Field) {
    match fields.iter_mut().find(|f| f.key == field.key) {
        Some(existing) => *existing = field,
        None => fields.push(field),
    }
}

fn count_value(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Owns the generated field set for one run.
#[derive(Debug)]
pub struct Fielder {
    fields: Vec<Field>,
    services: Vec<String>,
    attributes_per_span: usize,
    intrinsic_attributes: usize,
    rng: Mutex<Rng>,
}

impl Fielder {
    /// Build the field set for `seed`.
    ///
    /// Every generator gets a private `Rng` forked in key order from the
    /// seeded one, so each field's sequence depends only on the seed and on
    /// how often that field is sampled.
    ///
    /// # Errors
    ///
    /// Fails if a field cannot be built or `nservices` is zero.
    pub fn new(seed: &str, specs: &[FieldSpec], options: Options) -> Result<Self, Error> {
        if options.nservices == 0 {
            return Err(Error::NoServices);
        }
        let mut rng = Rng::from_seed_str(seed);
        let mut fields: Vec<Field> = Vec::with_capacity(specs.len() + options.extra_fields + 1);

        for spec in specs {
            let generator = spec.build(rng.fork())?;
            upsert(
                &mut fields,
                Field {
                    key: spec.key().to_string(),
                    name: spec.name().to_string(),
                    level: spec.level(),
                    generator,
                },
            );
        }
        for _ in 0..options.extra_fields {
            let key = rng.word_pair();
            let archetype = &EXTRAS[rng.intn(EXTRAS.len())];
            let generator = archetype.build(rng.fork())?;
            upsert(
                &mut fields,
                Field {
                    name: key.clone(),
                    key,
                    level: None,
                    generator,
                },
            );
        }
        upsert(
            &mut fields,
            Field {
                key: "process_id".to_string(),
                name: "process_id".to_string(),
                level: None,
                generator: ValueGenerator::int(rng.fork(), |_| i64::from(std::process::id())),
            },
        );

        let services: Vec<String> = (0..options.nservices)
            .map(|_| rng.choice(SPICES).copied().unwrap_or_default().to_string())
            .collect();
        debug!(
            fields = fields.len(),
            services = ?services,
            "Built fields for seed {seed}"
        );

        let attributes_per_span = options
            .attributes_per_span
            .map_or(fields.len(), |n| n.min(fields.len()));
        let intrinsic_attributes = options.intrinsic_attributes.min(attributes_per_span);

        Ok(Self {
            fields,
            services,
            attributes_per_span,
            intrinsic_attributes,
            rng: Mutex::new(rng.fork()),
        })
    }

    /// Field keys in their fixed order, level prefixes included.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields. Never true, `process_id` is always present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Service name for index `n`, wrapping around the service list.
    #[must_use]
    pub fn service_name(&self, n: usize) -> &str {
        &self.services[n % self.services.len()]
    }

    /// Every service name.
    #[must_use]
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Attribute budget per span, capped at the number of fields.
    #[must_use]
    pub fn attributes_per_span(&self) -> usize {
        self.attributes_per_span
    }

    /// Leading keys always in the attribute budget, capped at the budget.
    #[must_use]
    pub fn intrinsic_attributes(&self) -> usize {
        self.intrinsic_attributes
    }

    /// Evaluate every field that applies at `level`. `count` is included only
    /// when non-zero.
    #[must_use]
    pub fn fields(&self, count: u64, level: usize) -> Fields {
        let mut out = Fields::with_capacity(self.fields.len() + 1);
        if count != 0 {
            out.insert("count", Value::Int(count_value(count)));
        }
        for field in self.fields.iter().filter(|f| f.applies_at(level)) {
            out.insert(&field.name, field.generator.generate());
        }
        out
    }

    /// Emit a budgeted subset of fields into `sink`.
    ///
    /// The first `intrinsic_attributes` keys are always emitted. The rest of
    /// the budget is a contiguous block of the remaining keys whose offset is
    /// drawn uniformly so the block fits. Fields scoped to another level are
    /// skipped.
    pub fn add_attributes<S>(&self, sink: &mut S, count: u64, level: usize)
    where
        S: AttributeSink + ?Sized,
    {
        if count != 0 {
            sink.int("count", count_value(count));
        }
        let (intrinsic, rest) = self.fields.split_at(self.intrinsic_attributes);
        for field in intrinsic.iter().filter(|f| f.applies_at(level)) {
            field.generator.emit(&field.name, sink);
        }

        let budget = (self.attributes_per_span - self.intrinsic_attributes).min(rest.len());
        if budget == 0 {
            return;
        }
        let start = if rest.len() > budget {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.intn(rest.len() - budget + 1)
        } else {
            0
        };
        for field in rest[start..start + budget]
            .iter()
            .filter(|f| f.applies_at(level))
        {
            field.generator.emit(&field.name, sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Error, Fielder, Fields, Options};
    use crate::{FieldSpec, Value};

    fn specs(raw: &[&str]) -> Vec<FieldSpec> {
        raw.iter().map(|s| s.parse().expect("valid field")).collect()
    }

    fn options(extra_fields: usize) -> Options {
        Options {
            extra_fields,
            ..Options::default()
        }
    }

    #[test]
    fn deterministic_for_a_seed() {
        let user = specs(&["a=/i0,1000", "b=/sq20", "c=/fg"]);
        let one = Fielder::new("dataset", &user, options(10)).expect("valid");
        let two = Fielder::new("dataset", &user, options(10)).expect("valid");
        assert_eq!(one.keys().collect::<Vec<_>>(), two.keys().collect::<Vec<_>>());
        assert_eq!(one.services(), two.services());
        for level in 0..100 {
            assert_eq!(one.fields(0, level % 3), two.fields(0, level % 3));
        }
    }

    #[test]
    fn seeds_shape_the_extras() {
        let one = Fielder::new("first", &[], options(10)).expect("valid");
        let two = Fielder::new("second", &[], options(10)).expect("valid");
        assert_ne!(one.keys().collect::<Vec<_>>(), two.keys().collect::<Vec<_>>());
    }

    #[test]
    fn key_order() {
        let user = specs(&["z=1", "a=2", "z=3"]);
        let fielder = Fielder::new("order", &user, options(2)).expect("valid");
        let keys: Vec<&str> = fielder.keys().collect();
        assert_eq!(keys.len(), 5);
        assert_eq!(&keys[..2], &["z", "a"]);
        assert_eq!(keys[4], "process_id");
        assert_eq!(fielder.fields(0, 0).get("z"), Some(&Value::Int(3)));
    }

    #[test]
    fn process_id_is_present() {
        let fielder = Fielder::new("pid", &[], options(0)).expect("valid");
        assert_eq!(
            fielder.fields(0, 0).get("process_id"),
            Some(&Value::Int(i64::from(std::process::id())))
        );
    }

    #[test]
    fn level_scoping() {
        let user = specs(&["1.foo=bar", "always=1"]);
        let fielder = Fielder::new("levels", &user, options(0)).expect("valid");
        for level in 0..4 {
            let fields = fielder.fields(0, level);
            assert_eq!(fields.get("foo").is_some(), level == 1, "level {level}");
            assert!(fields.get("1.foo").is_none());
            assert!(fields.get("always").is_some());
        }
    }

    #[test]
    fn count_only_when_non_zero() {
        let fielder = Fielder::new("count", &[], options(0)).expect("valid");
        assert!(fielder.fields(0, 0).get("count").is_none());
        assert_eq!(fielder.fields(7, 0).get("count"), Some(&Value::Int(7)));
    }

    #[test]
    fn services_wrap() {
        let fielder = Fielder::new(
            "services",
            &[],
            Options {
                nservices: 3,
                ..Options::default()
            },
        )
        .expect("valid");
        assert_eq!(fielder.services().len(), 3);
        for n in 0..10 {
            assert_eq!(fielder.service_name(n), fielder.service_name(n + 3));
        }
        let err = Fielder::new(
            "none",
            &[],
            Options {
                nservices: 0,
                ..Options::default()
            },
        )
        .expect_err("no services");
        assert!(matches!(err, Error::NoServices));
    }

    #[test]
    fn attribute_budget() {
        let user = specs(&["first=1", "second=2"]);
        let fielder = Fielder::new(
            "budget",
            &user,
            Options {
                extra_fields: 10,
                attributes_per_span: Some(5),
                intrinsic_attributes: 2,
                ..Options::default()
            },
        )
        .expect("valid");
        let keys: Vec<&str> = fielder.keys().collect();
        for _ in 0..100 {
            let mut sink = Fields::default();
            fielder.add_attributes(&mut sink, 0, 0);
            let names: Vec<&str> = sink.names().collect();
            assert_eq!(names.len(), 5);
            assert_eq!(&names[..2], &["first", "second"]);
            let offset = keys
                .iter()
                .position(|k| *k == names[2])
                .expect("emitted key exists");
            assert!(offset >= 2);
            assert_eq!(&keys[offset..offset + 3], &names[2..]);
        }
    }

    #[test]
    fn budgets_are_capped() {
        let fielder = Fielder::new(
            "caps",
            &[],
            Options {
                extra_fields: 3,
                attributes_per_span: Some(100),
                intrinsic_attributes: 50,
                ..Options::default()
            },
        )
        .expect("valid");
        assert_eq!(fielder.attributes_per_span(), fielder.len());
        assert_eq!(fielder.intrinsic_attributes(), fielder.len());
        let mut sink = Fields::default();
        fielder.add_attributes(&mut sink, 3, 0);
        assert_eq!(sink.len(), fielder.len() + 1);
        assert_eq!(sink.get("count"), Some(&Value::Int(3)));
    }

    #[test]
    fn fields_serialize_as_a_map() {
        let fielder = Fielder::new("json", &specs(&["name=hello"]), options(0)).expect("valid");
        let json = serde_json::to_value(fielder.fields(0, 0)).expect("serializable");
        assert_eq!(json["name"], "hello");
    }

    proptest! {
        #[test]
        fn attribute_count_within_budget(
            extra_fields in 0_usize..30,
            budget in 0_usize..40,
            intrinsic in 0_usize..40,
        ) {
            let fielder = Fielder::new("prop", &[], Options {
                extra_fields,
                attributes_per_span: Some(budget),
                intrinsic_attributes: intrinsic,
                ..Options::default()
            }).expect("valid");
            let mut sink = Fields::default();
            fielder.add_attributes(&mut sink, 0, 0);
            prop_assert_eq!(sink.len(), fielder.attributes_per_span());
            prop_assert!(fielder.intrinsic_attributes() <= fielder.attributes_per_span());
        }
    }
}

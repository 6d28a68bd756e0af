//! The field-spec grammar.
//!
//! A field is written `name=value`. A value that does not start with `/` is a
//! constant: `true`/`false`, then an integer, then a float, else the literal
//! string. A value starting with `/` names a generator:
//!
//! ```text
//! /<code><p1>?,<p2>?,<p3>?,<p4>?
//! ```
//!
//! | code       | produces                                                      |
//! |------------|---------------------------------------------------------------|
//! | `i`, `ir`  | integer uniform in `[p1, p2)`, default `[0, 100)`             |
//! | `ig`       | gaussian integer, mean `p1` (100), stddev `p2` (mean/10)      |
//! | `f`, `fr`  | float uniform in `[p1, p2)`, default `[0, 100)`               |
//! | `fg`       | gaussian float, mean `p1` (100), stddev `p2` (mean/10)        |
//! | `ip`       | IPv4 address, octet `n` uniform in `[0, pn)`, default 256     |
//! | `b`        | boolean true `p1` percent of the time, default 50             |
//! | `s`, `sa`  | alphabetic string of length `p1`, default 16                  |
//! | `sw`       | word pair from a vocabulary of `p1` words, uniform            |
//! | `sq`       | word pair from a vocabulary of `p1` words, quadratic          |
//! | `sx`       | hex string of length `p1`, default 16                         |
//! | `sxc`      | hex of length `p1` (< 64) hashed from one of `p2` values      |
//! | `k`        | key from `p1` nouns (50) cycling over `p2` seconds (60)       |
//! | `u`, `uq`  | URL from `p1` (3) and `p2` (10) path words, `uq` adds a query |
//! | `st`       | HTTP status, `p1` percent 4xx (4), `p2` percent 5xx (1)       |
//!
//! A single parameter to a two-parameter range is the upper bound. A name
//! prefixed `<level>.` is only materialized on spans at that nesting level.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{
    Rng, Value, ValueGenerator, eligibility,
    eligibility::PeriodicEligibility,
    words::{ADJECTIVES, NOUNS},
};

static GENERATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^/([ibfsuk][awxrgqtp]?c?)([0-9.-]+)?(?:,([0-9.-]+))?(?:,([0-9.-]+))?(?:,([0-9.-]+))?$",
    )
    .expect("Invalid regex pattern provided")
});

static LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)\.(.*)$").expect("Invalid regex pattern provided"));

const STATUS_2XX: &[&str] = &["200", "200", "200", "201", "202"];
const STATUS_4XX: &[&str] = &["404", "400", "400", "400", "402", "429", "403"];
const STATUS_5XX: &[&str] = &["500", "503", "502", "504"];

const DEFAULT_LENGTH: usize = 16;
const MAX_LENGTH: usize = 1 << 16;
const MAX_HASHED_LENGTH: usize = 63;
const MAX_CARDINALITY: usize = 1 << 20;
const DEFAULT_OCTET: i64 = 256;

/// Errors produced while parsing a field.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The assignment has no `=`
    #[error("field {0} is not of the form name=value")]
    NotAnAssignment(String),
    /// The generator spec does not match the grammar
    #[error("unparseable field {name}={value}")]
    Unparseable {
        /// Field name
        name: String,
        /// Raw value
        value: String,
    },
    /// The generator code is not known
    #[error("invalid generator type {code} in field {name}={value}")]
    UnknownGenerator {
        /// Field name
        name: String,
        /// Raw value
        value: String,
        /// Generator code
        code: String,
    },
    /// A parameter is malformed or out of range
    #[error("invalid parameter in field {name}={value}: {source}")]
    InvalidParameter {
        /// Field name
        name: String,
        /// Raw value
        value: String,
        /// What is wrong with the parameter
        source: ParamError,
    },
    /// The key scheduler could not be built
    #[error("invalid key field {name}: {source}")]
    Eligibility {
        /// Field name
        name: String,
        /// Underlying scheduler error
        source: eligibility::Error,
    },
}

/// Errors in individual generator parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    /// Expected an integer
    #[error("{0} is not an integer")]
    NotAnInteger(String),
    /// Expected a number
    #[error("{0} is not a number")]
    NotANumber(String),
    /// Lower bound not below upper bound
    #[error("range [{low}, {high}) is empty")]
    EmptyRange {
        /// Lower bound
        low: String,
        /// Upper bound
        high: String,
    },
    /// Boolean probability outside `[0, 100]`
    #[error("probability {0} is outside [0, 100]")]
    ProbabilityOutOfRange(f64),
    /// More distinct values requested than the vocabulary holds
    #[error("cardinality {cardinality} cannot be more than {available}")]
    CardinalityTooLarge {
        /// Requested cardinality
        cardinality: usize,
        /// Vocabulary size
        available: usize,
    },
    /// Cardinality of zero
    #[error("cardinality must be greater than zero")]
    ZeroCardinality,
    /// String length above the maximum
    #[error("length {length} cannot be more than {max}")]
    LengthTooLarge {
        /// Requested length
        length: usize,
        /// Maximum length
        max: usize,
    },
    /// Key period of zero
    #[error("period must be greater than zero")]
    ZeroPeriod,
    /// Status percentages negative or summing past 100
    #[error("4xx ({fours}) and 5xx ({fives}) percentages must be non-negative and sum to at most 100")]
    PercentagesOutOfRange {
        /// Percent 4xx
        fours: f64,
        /// Percent 5xx
        fives: f64,
    },
    /// IP octet bound outside `[1, 256]`
    #[error("octet bound {0} is outside [1, 256]")]
    OctetOutOfRange(i64),
}

/// A validated generator description.
#[derive(Debug, Clone, PartialEq)]
pub enum Spec {
    /// Always the same value
    Constant(Value),
    /// Uniform integer in `[low, high)`
    Int {
        /// Inclusive lower bound
        low: i64,
        /// Exclusive upper bound
        high: i64,
    },
    /// Normally distributed integer
    GaussianInt {
        /// Mean
        mean: f64,
        /// Standard deviation
        stddev: f64,
    },
    /// Uniform float in `[low, high)`
    Float {
        /// Inclusive lower bound
        low: f64,
        /// Exclusive upper bound
        high: f64,
    },
    /// Normally distributed float
    GaussianFloat {
        /// Mean
        mean: f64,
        /// Standard deviation
        stddev: f64,
    },
    /// Dotted IPv4 address, octet `n` uniform in `[0, bounds[n])`
    Ip {
        /// Exclusive bound per octet
        bounds: [usize; 4],
    },
    /// Boolean, true `percent` of the time
    Bool {
        /// Percent true
        percent: f64,
    },
    /// Lowercase alphabetic string
    Alpha {
        /// String length
        length: usize,
    },
    /// Word pair drawn from a fixed generated vocabulary
    Words {
        /// Vocabulary size
        cardinality: usize,
        /// Bias the draw toward the front of the vocabulary
        quadratic: bool,
    },
    /// Lowercase hexadecimal string
    Hex {
        /// String length
        length: usize,
    },
    /// Truncated SHA-256 of one of `cardinality` inputs
    HashedHex {
        /// String length
        length: usize,
        /// Number of distinct values
        cardinality: usize,
    },
    /// `abcd-0123abcd-efgh` shaped identifier
    Guid,
    /// Noun chosen by the periodic eligibility scheduler
    Key {
        /// Number of nouns in play
        cardinality: usize,
        /// Length of one eligibility cycle
        period: Duration,
    },
    /// `https://example.com/<noun>/<adjective>`
    Url {
        /// First path segment vocabulary size
        paths: usize,
        /// Second path segment vocabulary size, zero for an empty segment
        subpaths: usize,
        /// Append `?extra=<random>`
        query: bool,
    },
    /// HTTP status code
    Status {
        /// Percent 4xx
        fours: f64,
        /// Percent 5xx
        fives: f64,
    },
}

/// One parsed `name=value` field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    key: String,
    name: String,
    level: Option<usize>,
    value: String,
    spec: Spec,
}

impl FieldSpec {
    /// Parse the field `key` with the raw spec `value`.
    ///
    /// # Errors
    ///
    /// Fails if `value` does not match the grammar, names an unknown generator
    /// or carries an invalid parameter.
    pub fn parse(key: &str, value: &str) -> Result<Self, Error> {
        let spec = parse_value(key, value)?;
        let (name, level) = split_level(key);
        Ok(Self {
            key: key.to_string(),
            name: name.to_string(),
            level,
            value: value.to_string(),
            spec,
        })
    }

    /// The field as written, including any level prefix.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The field name with any level prefix removed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The nesting level this field is restricted to, if any.
    #[must_use]
    pub fn level(&self) -> Option<usize> {
        self.level
    }

    /// The validated generator description.
    #[must_use]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Build this field's generator.
    ///
    /// # Errors
    ///
    /// Fails if the key scheduler cannot be built.
    pub fn build(&self, rng: Rng) -> Result<ValueGenerator, Error> {
        self.spec.build(rng).map_err(|source| Error::Eligibility {
            name: self.key.clone(),
            source,
        })
    }
}

impl FromStr for FieldSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| Error::NotAnAssignment(s.to_string()))?;
        Self::parse(key, value)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Split `<level>.<name>` into its parts. Names without a level prefix apply
/// at every level.
#[must_use]
pub fn split_level(key: &str) -> (&str, Option<usize>) {
    if let Some(caps) = LEVEL.captures(key) {
        if let (Some(level), Some(name)) = (caps.get(1), caps.get(2)) {
            if let Ok(level) = level.as_str().parse::<usize>() {
                return (name.as_str(), Some(level));
            }
        }
    }
    (key, None)
}

fn parse_value(name: &str, value: &str) -> Result<Spec, Error> {
    if !value.starts_with('/') {
        return Ok(Spec::Constant(Value::from_literal(value)));
    }
    let caps = GENERATOR
        .captures(value)
        .ok_or_else(|| Error::Unparseable {
            name: name.to_string(),
            value: value.to_string(),
        })?;
    let code = caps.get(1).map_or("", |m| m.as_str());
    let params = [2, 3, 4, 5].map(|i| caps.get(i).map(|m| m.as_str()));
    match Spec::from_code(code, params) {
        Ok(Some(spec)) => Ok(spec),
        Ok(None) => Err(Error::UnknownGenerator {
            name: name.to_string(),
            value: value.to_string(),
            code: code.to_string(),
        }),
        Err(source) => Err(Error::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            source,
        }),
    }
}

fn int(raw: Option<&str>) -> Result<Option<i64>, ParamError> {
    raw.map(|s| s.parse().map_err(|_| ParamError::NotAnInteger(s.to_string())))
        .transpose()
}

fn unsigned<T: FromStr>(raw: Option<&str>) -> Result<Option<T>, ParamError> {
    raw.map(|s| s.parse().map_err(|_| ParamError::NotAnInteger(s.to_string())))
        .transpose()
}

fn float(raw: Option<&str>) -> Result<Option<f64>, ParamError> {
    raw.map(|s| s.parse().map_err(|_| ParamError::NotANumber(s.to_string())))
        .transpose()
}

/// A lone first parameter is the upper bound.
fn bounds<T: Default>(p1: Option<T>, p2: Option<T>) -> (T, T) {
    match (p1, p2) {
        (low, Some(high)) => (low.unwrap_or_default(), high),
        (high, None) => (T::default(), high.unwrap_or_default()),
    }
}

#[allow(clippy::float_cmp)]
fn gaussian_defaults(mean: f64, stddev: f64) -> (f64, f64) {
    if mean == 0.0 && stddev == 0.0 {
        (100.0, 10.0)
    } else if stddev == 0.0 {
        (mean, mean / 10.0)
    } else {
        (mean, stddev)
    }
}

fn length(raw: Option<&str>, max: usize) -> Result<usize, ParamError> {
    let length = unsigned(raw)?.unwrap_or(DEFAULT_LENGTH);
    if length > max {
        return Err(ParamError::LengthTooLarge { length, max });
    }
    Ok(length)
}

fn cardinality(raw: Option<&str>, default: usize, max: usize) -> Result<usize, ParamError> {
    let cardinality = unsigned(raw)?.unwrap_or(default);
    if cardinality == 0 {
        return Err(ParamError::ZeroCardinality);
    }
    if cardinality > max {
        return Err(ParamError::CardinalityTooLarge {
            cardinality,
            available: max,
        });
    }
    Ok(cardinality)
}

fn word_list(rng: &mut Rng, cardinality: usize, source: &[&str]) -> Vec<String> {
    (0..cardinality)
        .map(|_| {
            if source.len() >= cardinality {
                rng.choice(source).copied().unwrap_or_default().to_string()
            } else {
                rng.word_pair()
            }
        })
        .collect()
}

impl Spec {
    /// Validate generator `code` and its parameters. `Ok(None)` if the code is
    /// not known.
    #[allow(clippy::too_many_lines)]
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::float_cmp)]
    fn from_code(code: &str, p: [Option<&str>; 4]) -> Result<Option<Self>, ParamError> {
        let spec = match code {
            "i" | "ir" => {
                let (low, high) = match bounds(int(p[0])?, int(p[1])?) {
                    (0, 0) => (0, 100),
                    b => b,
                };
                if low >= high {
                    return Err(ParamError::EmptyRange {
                        low: low.to_string(),
                        high: high.to_string(),
                    });
                }
                Spec::Int { low, high }
            }
            "ig" => {
                let (mean, stddev) = gaussian_defaults(
                    int(p[0])?.unwrap_or(0) as f64,
                    int(p[1])?.unwrap_or(0) as f64,
                );
                Spec::GaussianInt { mean, stddev }
            }
            "f" | "fr" => {
                let (low, high) = match bounds(float(p[0])?, float(p[1])?) {
                    (low, high) if low == 0.0 && high == 0.0 => (0.0, 100.0),
                    b => b,
                };
                if low >= high || !low.is_finite() || !high.is_finite() {
                    return Err(ParamError::EmptyRange {
                        low: low.to_string(),
                        high: high.to_string(),
                    });
                }
                Spec::Float { low, high }
            }
            "fg" => {
                let (mean, stddev) =
                    gaussian_defaults(float(p[0])?.unwrap_or(0.0), float(p[1])?.unwrap_or(0.0));
                Spec::GaussianFloat { mean, stddev }
            }
            "ip" => {
                let mut bounds = [0_usize; 4];
                for (bound, raw) in bounds.iter_mut().zip(p) {
                    let octet = int(raw)?.unwrap_or(DEFAULT_OCTET);
                    if !(1..=DEFAULT_OCTET).contains(&octet) {
                        return Err(ParamError::OctetOutOfRange(octet));
                    }
                    *bound = usize::try_from(octet).map_err(|_| ParamError::OctetOutOfRange(octet))?;
                }
                Spec::Ip { bounds }
            }
            "b" => {
                let percent = float(p[0])?.unwrap_or(50.0);
                if !(0.0..=100.0).contains(&percent) {
                    return Err(ParamError::ProbabilityOutOfRange(percent));
                }
                Spec::Bool { percent }
            }
            "s" | "sa" => Spec::Alpha {
                length: length(p[0], MAX_LENGTH)?,
            },
            "sx" => Spec::Hex {
                length: length(p[0], MAX_LENGTH)?,
            },
            "sw" | "sq" => Spec::Words {
                cardinality: cardinality(p[0], DEFAULT_LENGTH, MAX_CARDINALITY)?,
                quadratic: code == "sq",
            },
            "sxc" => Spec::HashedHex {
                length: length(p[0], MAX_HASHED_LENGTH)?,
                cardinality: cardinality(p[1], DEFAULT_LENGTH, MAX_CARDINALITY)?,
            },
            "k" => {
                let cardinality = cardinality(p[0], 50, NOUNS.len())?;
                let seconds: u64 = unsigned(p[1])?.unwrap_or(60);
                if seconds == 0 {
                    return Err(ParamError::ZeroPeriod);
                }
                Spec::Key {
                    cardinality,
                    period: Duration::from_secs(seconds),
                }
            }
            "u" | "uq" => Spec::Url {
                paths: cardinality(p[0], 3, MAX_CARDINALITY)?,
                subpaths: cardinality(p[1], 10, MAX_CARDINALITY)?,
                query: code == "uq",
            },
            "st" => {
                let fours = float(p[0])?.unwrap_or(4.0);
                let fives = float(p[1])?.unwrap_or(1.0);
                let valid = fours >= 0.0 && fives >= 0.0 && fours + fives <= 100.0;
                if !valid {
                    return Err(ParamError::PercentagesOutOfRange { fours, fives });
                }
                Spec::Status { fours, fives }
            }
            _ => return Ok(None),
        };
        Ok(Some(spec))
    }

    /// Build a generator for this spec. Vocabularies and eligibility windows
    /// are drawn from `rng`, which the generator then keeps for sampling.
    ///
    /// # Errors
    ///
    /// Fails if a `Key` spec has a zero cardinality or period.
    pub fn build(&self, mut rng: Rng) -> Result<ValueGenerator, eligibility::Error> {
        let generator = match *self {
            Spec::Constant(ref value) => ValueGenerator::constant(rng, value.clone()),
            Spec::Int { low, high } => ValueGenerator::int(rng, move |r| r.int(low, high)),
            Spec::GaussianInt { mean, stddev } => {
                ValueGenerator::int(rng, move |r| r.gaussian_int(mean, stddev))
            }
            Spec::Float { low, high } => ValueGenerator::float(rng, move |r| r.float(low, high)),
            Spec::GaussianFloat { mean, stddev } => {
                ValueGenerator::float(rng, move |r| r.gaussian(mean, stddev))
            }
            Spec::Ip { bounds } => ValueGenerator::string(rng, move |r| {
                format!(
                    "{}.{}.{}.{}",
                    r.intn(bounds[0]),
                    r.intn(bounds[1]),
                    r.intn(bounds[2]),
                    r.intn(bounds[3])
                )
            }),
            Spec::Bool { percent } => {
                ValueGenerator::boolean(rng, move |r| r.bool_with_prob(percent))
            }
            Spec::Alpha { length } => ValueGenerator::string(rng, move |r| r.string(length)),
            Spec::Words {
                cardinality,
                quadratic,
            } => {
                let words: Vec<String> = (0..cardinality).map(|_| rng.word_pair()).collect();
                ValueGenerator::string(rng, move |r| {
                    let word = if quadratic {
                        r.quadratic_choice(&words)
                    } else {
                        r.choice(&words)
                    };
                    word.cloned().unwrap_or_default()
                })
            }
            Spec::Hex { length } => ValueGenerator::string(rng, move |r| r.hex_string(length)),
            Spec::HashedHex {
                length,
                cardinality,
            } => ValueGenerator::string(rng, move |r| {
                let n = r.intn(cardinality);
                let digest = Sha256::digest(format!("{n}:{length}").as_bytes());
                let mut hashed = hex::encode(digest);
                hashed.truncate(length);
                hashed
            }),
            Spec::Guid => ValueGenerator::string(rng, |r| {
                format!("{}-{}-{}", r.string(4), r.hex_string(8), r.string(4))
            }),
            Spec::Key {
                cardinality,
                period,
            } => {
                let vocabulary = &NOUNS[..cardinality.min(NOUNS.len())];
                let eligibility = PeriodicEligibility::new(&mut rng, vocabulary, period)?;
                let start = Instant::now();
                ValueGenerator::string(rng, move |r| {
                    eligibility.eligible_word(r, start.elapsed()).to_string()
                })
            }
            Spec::Url {
                paths,
                subpaths,
                query,
            } => {
                let paths = word_list(&mut rng, paths, NOUNS);
                let subpaths = word_list(&mut rng, subpaths, ADJECTIVES);
                ValueGenerator::string(rng, move |r| {
                    let path = r.choice(&paths).map_or("", String::as_str);
                    let subpath = r.choice(&subpaths).map_or("", String::as_str);
                    let mut url = format!("https://example.com/{path}/{subpath}");
                    if query {
                        url.push_str("?extra=");
                        url.push_str(&r.string(10));
                    }
                    url
                })
            }
            Spec::Status { fours, fives } => {
                let twos = 100.0 - fours - fives;
                ValueGenerator::string(rng, move |r| {
                    let roll = r.float(0.0, 100.0);
                    let bucket = if roll < twos {
                        STATUS_2XX
                    } else if roll < twos + fours {
                        STATUS_4XX
                    } else {
                        STATUS_5XX
                    };
                    r.quadratic_choice(bucket)
                        .copied()
                        .unwrap_or("500")
                        .to_string()
                })
            }
        };
        Ok(generator)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use sha2::{Digest, Sha256};

    use super::{Error, FieldSpec, ParamError, Spec, split_level};
    use crate::{Kind, Rng, Value, ValueGenerator};

    fn build(assignment: &str) -> ValueGenerator {
        let spec: FieldSpec = assignment.parse().expect("valid field");
        spec.build(Rng::from_seed_str("field-tests"))
            .expect("buildable")
    }

    fn param_error(assignment: &str) -> ParamError {
        match assignment.parse::<FieldSpec>() {
            Err(Error::InvalidParameter { source, .. }) => source,
            other => panic!("expected a parameter error for {assignment}, got {other:?}"),
        }
    }

    #[test]
    fn int_range() {
        let g = build("name=/i10,20");
        assert_eq!(g.kind(), Kind::Int);
        for _ in 0..10_000 {
            match g.generate() {
                Value::Int(v) => assert!((10..20).contains(&v), "{v}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn single_parameter_is_upper_bound() {
        let spec: FieldSpec = "n=/i5".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::Int { low: 0, high: 5 });
        let spec: FieldSpec = "n=/i".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::Int { low: 0, high: 100 });
        let spec: FieldSpec = "n=/f2.5".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::Float { low: 0.0, high: 2.5 });
    }

    #[test]
    fn bool_probability() {
        let g = build("name=/b30");
        let draws = 10_000;
        let trues = (0..draws)
            .filter(|_| g.generate() == Value::Bool(true))
            .count();
        let frequency = trues as f64 / f64::from(draws);
        assert!((frequency - 0.30).abs() < 0.02, "{frequency}");
    }

    #[test]
    fn constants() {
        for (assignment, expected) in [
            ("name=42", Value::Int(42)),
            ("name=true", Value::Bool(true)),
            ("name=hello", Value::Str("hello".to_string())),
            ("name=1.25", Value::Float(1.25)),
        ] {
            let g = build(assignment);
            for _ in 0..10 {
                assert_eq!(g.generate(), expected);
            }
        }
    }

    #[test]
    fn malformed_specs_name_the_field() {
        for assignment in ["name=/z5", "name=/i0,0,0,0,0", "name=/i1x"] {
            let err = assignment.parse::<FieldSpec>().expect_err("malformed");
            assert!(matches!(err, Error::Unparseable { ref name, .. } if name == "name"));
            assert!(err.to_string().contains("name"));
        }
        let err = "name=/bq".parse::<FieldSpec>().expect_err("unknown");
        assert!(matches!(err, Error::UnknownGenerator { ref code, .. } if code == "bq"));
        assert!(matches!(
            "no-equals".parse::<FieldSpec>(),
            Err(Error::NotAnAssignment(_))
        ));
    }

    #[test]
    fn parameters_are_validated() {
        assert_eq!(param_error("n=/b101"), ParamError::ProbabilityOutOfRange(101.0));
        assert!(matches!(param_error("n=/i20,10"), ParamError::EmptyRange { .. }));
        assert!(matches!(param_error("n=/i1.5"), ParamError::NotAnInteger(_)));
        assert!(matches!(param_error("n=/f1-2"), ParamError::NotANumber(_)));
        assert!(matches!(
            param_error("n=/k500"),
            ParamError::CardinalityTooLarge { cardinality: 500, .. }
        ));
        assert_eq!(param_error("n=/k0"), ParamError::ZeroCardinality);
        assert_eq!(param_error("n=/k10,0"), ParamError::ZeroPeriod);
        assert_eq!(param_error("n=/sw0"), ParamError::ZeroCardinality);
        assert!(matches!(param_error("n=/sxc64"), ParamError::LengthTooLarge { .. }));
        assert!(matches!(
            param_error("n=/st60,50"),
            ParamError::PercentagesOutOfRange { .. }
        ));
        assert!(matches!(
            param_error("n=/s99999999999"),
            ParamError::LengthTooLarge { length: 99_999_999_999, .. }
        ));
        assert!(matches!(param_error("n=/sx70000"), ParamError::LengthTooLarge { .. }));
        assert!(matches!(
            param_error("n=/sw2000000"),
            ParamError::CardinalityTooLarge { cardinality: 2_000_000, .. }
        ));
        assert!(matches!(
            param_error("n=/sxc8,2000000"),
            ParamError::CardinalityTooLarge { .. }
        ));
        assert!(matches!(
            param_error("n=/u3,2000000"),
            ParamError::CardinalityTooLarge { .. }
        ));
        assert_eq!(param_error("n=/ip0"), ParamError::OctetOutOfRange(0));
        assert_eq!(param_error("n=/ip1,1,1,300"), ParamError::OctetOutOfRange(300));
    }

    #[test]
    fn level_prefix() {
        let spec: FieldSpec = "1.foo=bar".parse().expect("valid");
        assert_eq!(spec.key(), "1.foo");
        assert_eq!(spec.name(), "foo");
        assert_eq!(spec.level(), Some(1));
        assert_eq!(split_level("foo"), ("foo", None));
        assert_eq!(split_level("12.a.b"), ("a.b", Some(12)));
        assert_eq!(split_level("x.foo"), ("x.foo", None));
    }

    #[test]
    fn gaussian_defaults() {
        let spec: FieldSpec = "n=/ig".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::GaussianInt { mean: 100.0, stddev: 10.0 });
        let spec: FieldSpec = "n=/fg50".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::GaussianFloat { mean: 50.0, stddev: 5.0 });
        let spec: FieldSpec = "n=/fg50,2".parse().expect("valid");
        assert_eq!(spec.spec(), &Spec::GaussianFloat { mean: 50.0, stddev: 2.0 });

        let g = build("n=/ig");
        let sum: i64 = (0..10_000)
            .map(|_| match g.generate() {
                Value::Int(v) => v,
                other => panic!("unexpected {other:?}"),
            })
            .sum();
        let mean = sum as f64 / 10_000.0;
        assert!((mean - 100.0).abs() < 2.0, "{mean}");
        assert_eq!(build("n=/fg").kind(), Kind::Float);
    }

    #[test]
    fn ip_octets() {
        let g = build("n=/ip10,1,1,2");
        for _ in 0..1_000 {
            let Value::Str(ip) = g.generate() else {
                panic!("ip is a string")
            };
            let octets: Vec<usize> = ip.split('.').map(|o| o.parse().expect("octet")).collect();
            assert_eq!(octets.len(), 4);
            assert!(octets[0] < 10);
            assert_eq!(octets[1], 0);
            assert_eq!(octets[2], 0);
            assert!(octets[3] < 2);
        }
    }

    #[test]
    fn bounded_cardinality() {
        for (assignment, limit) in [("n=/sw5", 5), ("n=/sq7", 7), ("n=/sxc12,9", 9)] {
            let g = build(assignment);
            let seen: HashSet<String> = (0..2_000).map(|_| g.generate().to_string()).collect();
            assert!(seen.len() <= limit, "{assignment}: {}", seen.len());
        }
        let g = build("n=/sxc12,9");
        assert!(g.generate().to_string().len() == 12);
    }

    #[test]
    fn hashed_hex_is_a_truncated_digest() {
        let hashes: HashSet<String> = (0..9)
            .map(|n| {
                let mut hashed = hex::encode(Sha256::digest(format!("{n}:12").as_bytes()));
                hashed.truncate(12);
                hashed
            })
            .collect();
        let g = build("n=/sxc12,9");
        for _ in 0..500 {
            let value = g.generate().to_string();
            assert!(hashes.contains(&value), "{value}");
        }
    }

    #[test]
    fn strings_have_requested_length() {
        assert_eq!(build("n=/s").generate().to_string().len(), 16);
        assert_eq!(build("n=/sa3").generate().to_string().len(), 3);
        assert_eq!(build("n=/sx40").generate().to_string().len(), 40);
        let guid = Spec::Guid
            .build(Rng::from_seed_str("guid"))
            .expect("buildable")
            .generate()
            .to_string();
        assert_eq!(guid.len(), 18);
    }

    #[test]
    fn urls() {
        let plain = build("n=/u2,3").generate().to_string();
        assert!(plain.starts_with("https://example.com/"));
        assert!(!plain.contains('?'));
        let query = build("n=/uq").generate().to_string();
        assert!(query.contains("?extra="));
        assert_eq!(query.split("?extra=").nth(1).map(str::len), Some(10));
    }

    #[test]
    fn status_buckets() {
        for (assignment, prefix) in [("n=/st0,0", '2'), ("n=/st100,0", '4'), ("n=/st0,100", '5')] {
            let g = build(assignment);
            for _ in 0..500 {
                let status = g.generate().to_string();
                assert!(status.starts_with(prefix), "{assignment}: {status}");
            }
        }
    }

    #[test]
    fn keys_come_from_nouns() {
        let g = build("n=/k10,5");
        for _ in 0..100 {
            let key = g.generate().to_string();
            assert!(crate::words::NOUNS[..10].contains(&key.as_str()));
        }
    }
}

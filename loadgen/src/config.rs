//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Crashes are most likely
//! to originate from this code, intentionally.

use std::{fmt, num::NonZeroU64, str::FromStr, time::Duration};

use http::Uri;
use loadgen_payload::{FieldSpec, Options};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::generator::{Shape, Throughput};

/// Default gRPC OTLP port
const GRPC_PORT: u16 = 4317;
/// Default HTTP OTLP port
const HTTP_PORT: u16 = 4318;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// A field spec could not be parsed
    #[error(transparent)]
    Field(#[from] loadgen_payload::field::Error),
    /// Trace depth of zero
    #[error("depth must be at least 1")]
    ZeroDepth,
    /// Trace duration of zero
    #[error("trace_duration_millis must be greater than zero")]
    ZeroDuration,
    /// Rate is not a positive finite number
    #[error("traces_per_second must be positive and finite, got {0}")]
    InvalidRate(f64),
    /// Zero services requested
    #[error("nservices must be at least 1")]
    ZeroServices,
    /// The output host could not be turned into a URI
    #[error("Invalid output host {host}: {source}")]
    Host {
        /// The configured host
        host: String,
        /// Underlying parse error
        #[source]
        source: http::uri::InvalidUri,
    },
    /// The output host has no authority component
    #[error("Output host {0} has no host name")]
    MissingAuthority(String),
}

fn default_seed() -> String {
    "loadgen".to_string()
}

fn default_depth() -> usize {
    3
}

fn default_span_count() -> usize {
    3
}

fn default_extra_fields() -> usize {
    10
}

fn default_trace_duration_millis() -> u64 {
    1_000
}

fn default_nservices() -> usize {
    1
}

fn default_traces_per_second() -> f64 {
    1.0
}

fn default_max_time_seconds() -> u64 {
    60
}

fn default_ramp_millis() -> u64 {
    1_000
}

fn default_host() -> String {
    "localhost".to_string()
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seed for field generation. Runs with the same seed and fields produce
    /// the same field shapes.
    #[serde(default = "default_seed")]
    pub seed: String,
    /// The shape of each generated trace
    #[serde(default)]
    pub format: Format,
    /// How many traces to generate and how quickly
    #[serde(default)]
    pub quantity: Quantity,
    /// Where spans go
    #[serde(default)]
    pub output: Output,
    /// Backend identity sent with exported spans
    #[serde(default)]
    pub telemetry: Telemetry,
    /// User fields, each `name=spec`
    #[serde(default)]
    pub fields: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            format: Format::default(),
            quantity: Quantity::default(),
            output: Output::default(),
            telemetry: Telemetry::default(),
            fields: Vec::new(),
        }
    }
}

/// Trace shape configuration
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct Format {
    /// Nesting depth of a trace
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Number of spans in a trace
    #[serde(default = "default_span_count")]
    pub span_count: usize,
    /// Number of auto-named extra fields per span
    #[serde(default = "default_extra_fields")]
    pub extra_fields: usize,
    /// Wall-clock duration of one trace
    #[serde(default = "default_trace_duration_millis")]
    pub trace_duration_millis: u64,
    /// Attribute limit per span for budgeted transports, unset for no limit
    #[serde(default)]
    pub attributes_per_span: Option<usize>,
    /// Leading fields always present under an attribute limit
    #[serde(default)]
    pub intrinsic_attributes: usize,
    /// Number of simulated services
    #[serde(default = "default_nservices")]
    pub nservices: usize,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            span_count: default_span_count(),
            extra_fields: default_extra_fields(),
            trace_duration_millis: default_trace_duration_millis(),
            attributes_per_span: None,
            intrinsic_attributes: 0,
            nservices: default_nservices(),
        }
    }
}

/// Throughput configuration
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
#[serde(deny_unknown_fields)]
pub struct Quantity {
    /// Target aggregate traces per second
    #[serde(default = "default_traces_per_second")]
    pub traces_per_second: f64,
    /// Stop after this many traces, 0 for no limit
    #[serde(default)]
    pub trace_count: u64,
    /// Stop after this many seconds, 0 for no limit
    #[serde(default = "default_max_time_seconds")]
    pub max_time_seconds: u64,
    /// Time to ramp from zero to the target rate, and back down
    #[serde(default = "default_ramp_millis")]
    pub ramp_millis: u64,
}

impl Default for Quantity {
    fn default() -> Self {
        Self {
            traces_per_second: default_traces_per_second(),
            trace_count: 0,
            max_time_seconds: default_max_time_seconds(),
            ramp_millis: default_ramp_millis(),
        }
    }
}

/// The transport spans are handed to.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    /// One line per span on stdout
    #[default]
    Print,
    /// Count spans and discard them
    Dummy,
    /// Export spans over OTLP
    Otlp,
}

/// OTLP wire protocol.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// gRPC
    #[default]
    Grpc,
    /// Protobuf over HTTP
    Protobuf,
    /// JSON over HTTP
    Json,
}

impl Protocol {
    /// The port used when the host does not name one.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Grpc => GRPC_PORT,
            Protocol::Protobuf | Protocol::Json => HTTP_PORT,
        }
    }
}

impl FromStr for SenderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "print" | "stdout" => Ok(SenderKind::Print),
            "dummy" => Ok(SenderKind::Dummy),
            "otlp" => Ok(SenderKind::Otlp),
            other => Err(format!("unknown sender {other}, expected print, dummy or otlp")),
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SenderKind::Print => "print",
            SenderKind::Dummy => "dummy",
            SenderKind::Otlp => "otlp",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(Protocol::Grpc),
            "protobuf" => Ok(Protocol::Protobuf),
            "json" => Ok(Protocol::Json),
            other => Err(format!(
                "unknown protocol {other}, expected grpc, protobuf or json"
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Grpc => "grpc",
            Protocol::Protobuf => "protobuf",
            Protocol::Json => "json",
        })
    }
}

/// Output configuration
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Output {
    /// Which transport to use
    #[serde(default)]
    pub sender: SenderKind,
    /// OTLP wire protocol
    #[serde(default)]
    pub protocol: Protocol,
    /// `honeycomb`, `dogfood`, `localhost` or a URL
    #[serde(default = "default_host")]
    pub host: String,
    /// Use `http` when the host names no scheme
    #[serde(default)]
    pub insecure: bool,
    /// Extra headers sent with every export
    #[serde(default)]
    pub headers: FxHashMap<String, String>,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            sender: SenderKind::default(),
            protocol: Protocol::default(),
            host: default_host(),
            insecure: false,
            headers: FxHashMap::default(),
        }
    }
}

impl Output {
    /// Resolve the configured host into an export endpoint.
    ///
    /// Host aliases are expanded, a missing scheme is filled in from
    /// `insecure` and a missing port from the protocol.
    ///
    /// # Errors
    ///
    /// Fails if the host does not parse as a URI or has no host name.
    pub fn endpoint(&self) -> Result<Uri, Error> {
        let host = match self.host.as_str() {
            "honeycomb" => "https://api.honeycomb.io:443",
            "dogfood" => "https://api-dogfood.honeycomb.io:443",
            "localhost" => "http://localhost",
            other => other,
        };
        let with_scheme = if host.contains("://") {
            host.to_string()
        } else {
            let scheme = if self.insecure { "http" } else { "https" };
            format!("{scheme}://{host}")
        };
        let invalid = |source| Error::Host {
            host: self.host.clone(),
            source,
        };
        let uri: Uri = with_scheme.parse().map_err(invalid)?;
        let authority = uri
            .authority()
            .ok_or_else(|| Error::MissingAuthority(self.host.clone()))?;
        if authority.port_u16().is_some() {
            return Ok(uri);
        }
        let scheme = uri.scheme_str().unwrap_or("https");
        let path = uri.path_and_query().map_or("", |p| p.as_str());
        format!(
            "{scheme}://{host}:{port}{path}",
            host = authority.host(),
            port = self.protocol.default_port()
        )
        .parse()
        .map_err(invalid)
    }
}

/// Backend identity configuration
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Telemetry {
    /// Dataset name, also the exported `service.name`
    #[serde(default)]
    pub dataset: String,
    /// API key for the backend
    #[serde(default)]
    pub api_key: String,
}

impl Config {
    /// Parse a YAML document.
    ///
    /// # Errors
    ///
    /// Fails if the document is not valid YAML for this struct.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Fails on a zero depth, duration or service count, or a rate that is
    /// not positive and finite.
    pub fn valid(&self) -> Result<(), Error> {
        if self.format.depth == 0 {
            return Err(Error::ZeroDepth);
        }
        if self.format.trace_duration_millis == 0 {
            return Err(Error::ZeroDuration);
        }
        if self.format.nservices == 0 {
            return Err(Error::ZeroServices);
        }
        let tps = self.quantity.traces_per_second;
        if !tps.is_finite() || tps <= 0.0 {
            return Err(Error::InvalidRate(tps));
        }
        Ok(())
    }

    /// Parse the configured fields.
    ///
    /// # Errors
    ///
    /// Fails on the first field that does not parse.
    pub fn field_specs(&self) -> Result<Vec<FieldSpec>, Error> {
        self.fields
            .iter()
            .map(|f| f.parse::<FieldSpec>().map_err(Error::from))
            .collect()
    }

    /// Fielder options.
    #[must_use]
    pub fn fielder_options(&self) -> Options {
        Options {
            extra_fields: self.format.extra_fields,
            nservices: self.format.nservices,
            attributes_per_span: self.format.attributes_per_span,
            intrinsic_attributes: self.format.intrinsic_attributes,
        }
    }

    /// Trace shape.
    #[must_use]
    pub fn shape(&self) -> Shape {
        Shape {
            depth: self.format.depth,
            span_count: self.format.span_count,
            duration: Duration::from_millis(self.format.trace_duration_millis),
        }
    }

    /// Throughput.
    #[must_use]
    pub fn throughput(&self) -> Throughput {
        Throughput {
            traces_per_second: self.quantity.traces_per_second,
            trace_count: NonZeroU64::new(self.quantity.trace_count),
            max_time: (self.quantity.max_time_seconds > 0)
                .then(|| Duration::from_secs(self.quantity.max_time_seconds)),
            ramp: Duration::from_millis(self.quantity.ramp_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Config, Error, Output, Protocol, SenderKind};

    #[test]
    fn empty_document_is_all_defaults() {
        let config = Config::from_yaml("{}").expect("valid");
        assert_eq!(config, Config::default());
        assert!(config.valid().is_ok());
        assert_eq!(config.shape().duration, Duration::from_secs(1));
        assert_eq!(config.throughput().max_time, Some(Duration::from_secs(60)));
        assert!(config.throughput().trace_count.is_none());
    }

    #[test]
    fn config_deserializes() {
        let contents = r#"
seed: "my-dataset"
format:
  depth: 5
  span_count: 12
  extra_fields: 0
  trace_duration_millis: 250
  attributes_per_span: 8
  intrinsic_attributes: 2
  nservices: 3
quantity:
  traces_per_second: 20.5
  trace_count: 100
  max_time_seconds: 0
  ramp_millis: 5000
output:
  sender: otlp
  protocol: json
  host: "collector.internal:9000"
  insecure: true
  headers:
    x-extra: "yes"
telemetry:
  dataset: "loadtest"
  api_key: "abc123"
fields:
  - "status=/st10,2"
  - "1.db.table=/sw5"
"#;
        let config = Config::from_yaml(contents).expect("valid");
        assert_eq!(config.seed, "my-dataset");
        assert_eq!(config.format.depth, 5);
        assert_eq!(config.format.attributes_per_span, Some(8));
        assert_eq!(config.output.sender, SenderKind::Otlp);
        assert_eq!(config.output.protocol, Protocol::Json);
        assert_eq!(config.output.headers.get("x-extra").map(String::as_str), Some("yes"));
        assert_eq!(config.telemetry.api_key, "abc123");
        assert!(config.throughput().max_time.is_none());
        assert_eq!(config.throughput().trace_count.map(|n| n.get()), Some(100));

        let specs = config.field_specs().expect("fields parse");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].name(), "db.table");
        assert_eq!(specs[1].level(), Some(1));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_yaml("nope: 1").is_err());
        assert!(Config::from_yaml("format:\n  width: 1").is_err());
    }

    #[test]
    fn validation() {
        let mut config = Config::default();
        config.format.depth = 0;
        assert!(matches!(config.valid(), Err(Error::ZeroDepth)));

        let mut config = Config::default();
        config.format.trace_duration_millis = 0;
        assert!(matches!(config.valid(), Err(Error::ZeroDuration)));

        let mut config = Config::default();
        config.format.nservices = 0;
        assert!(matches!(config.valid(), Err(Error::ZeroServices)));

        for tps in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = Config::default();
            config.quantity.traces_per_second = tps;
            assert!(matches!(config.valid(), Err(Error::InvalidRate(_))));
        }

        let config = Config {
            fields: vec!["bad=/z".to_string()],
            ..Config::default()
        };
        assert!(matches!(config.field_specs(), Err(Error::Field(_))));
    }

    #[test]
    fn endpoints() {
        let endpoint = |host: &str, insecure: bool, protocol: Protocol| {
            Output {
                host: host.to_string(),
                insecure,
                protocol,
                ..Output::default()
            }
            .endpoint()
            .expect("valid host")
            .to_string()
        };
        assert_eq!(
            endpoint("honeycomb", false, Protocol::Grpc),
            "https://api.honeycomb.io:443/"
        );
        assert_eq!(
            endpoint("dogfood", true, Protocol::Json),
            "https://api-dogfood.honeycomb.io:443/"
        );
        assert_eq!(
            endpoint("localhost", false, Protocol::Grpc),
            "http://localhost:4317/"
        );
        assert_eq!(
            endpoint("collector", true, Protocol::Protobuf),
            "http://collector:4318/"
        );
        assert_eq!(
            endpoint("collector:9000", false, Protocol::Grpc),
            "https://collector:9000/"
        );
    }

    #[test]
    fn names_parse() {
        assert_eq!("stdout".parse::<SenderKind>(), Ok(SenderKind::Print));
        assert_eq!("otlp".parse::<SenderKind>(), Ok(SenderKind::Otlp));
        assert!("honeycomb".parse::<SenderKind>().is_err());
        assert_eq!("protobuf".parse::<Protocol>(), Ok(Protocol::Protobuf));
        assert!("thrift".parse::<Protocol>().is_err());
    }
}

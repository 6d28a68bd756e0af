//! The OTLP sender.
//!
//! Finished spans are queued to a background exporter which batches them into
//! `ExportTraceServiceRequest`s and ships them over gRPC, or as protobuf or
//! JSON over HTTP. A batch goes out when it holds [`BATCH_SIZE`] spans or once
//! a second, whichever comes first. Export failures are counted and dropped,
//! never retried.

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use http::{
    HeaderMap, Uri,
    header::{CONTENT_TYPE, HeaderName, HeaderValue},
};
use loadgen_payload::{AttributeSink, Fielder};
use metrics::counter;
use opentelemetry_proto::tonic::{
    collector::trace::v1::{ExportTraceServiceRequest, trace_service_client::TraceServiceClient},
    common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value},
    resource::v1::Resource,
    trace::v1::{self, Status, span::Event},
};
use prost::Message;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tonic::{
    metadata::MetadataMap,
    transport::{Channel, ClientTlsConfig, Endpoint},
};
use tracing::{debug, info, warn};

use super::{Sendable, Sender, SpanContext};
use crate::config::{self, Output, Protocol, Telemetry};

/// Spans per export request
pub const BATCH_SIZE: usize = 512;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const QUEUE_CAPACITY: usize = 16 * BATCH_SIZE;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const SPAN_KIND_INTERNAL: i32 = 1;
const SPAN_KIND_SERVER: i32 = 2;
const STATUS_CODE_OK: i32 = 1;
const STATUS_CODE_ERROR: i32 = 2;

/// One in this many child spans carries an exception.
const ERROR_ONE_IN: u32 = 10;

const TEAM_HEADER: &str = "x-honeycomb-team";
const DATASET_HEADER: &str = "x-honeycomb-dataset";

/// Errors produced by [`Otlp`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The export endpoint could not be resolved
    #[error(transparent)]
    Endpoint(#[from] config::Error),
    /// The gRPC channel could not be configured
    #[error("Failed to configure gRPC channel: {0}")]
    Transport(#[from] tonic::transport::Error),
    /// A configured header is not a valid HTTP header
    #[error("Invalid header {0}")]
    Header(String),
    /// The gRPC export call failed
    #[error("gRPC export failed: {0}")]
    Status(#[from] tonic::Status),
    /// The HTTP export call failed
    #[error("HTTP export failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The backend answered with a non-success status
    #[error("Export rejected with status {0}")]
    Rejected(reqwest::StatusCode),
    /// The request could not be encoded as JSON
    #[error("Failed to encode request as JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The exporter task panicked
    #[error("Exporter task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug)]
struct Pending {
    service: String,
    span: v1::Span,
}

/// Exports spans over OTLP.
#[derive(Debug)]
pub struct Otlp {
    queue: mpsc::Sender<Pending>,
    exporter: Mutex<Option<(loadgen_signal::Broadcaster, JoinHandle<()>)>>,
}

/// A span bound for the OTLP exporter.
#[derive(Debug)]
pub struct OtlpSpan {
    pending: Pending,
    queue: mpsc::Sender<Pending>,
}

#[derive(Debug)]
enum Client {
    Grpc(TraceServiceClient<Channel>),
    Http {
        client: reqwest::Client,
        url: String,
        json: bool,
    },
}

impl Client {
    fn new(endpoint: Uri, protocol: Protocol) -> Result<Self, Error> {
        match protocol {
            Protocol::Grpc => {
                let tls = endpoint.scheme_str() == Some("https");
                let mut endpoint = Endpoint::new(endpoint)?.connect_timeout(CONNECT_TIMEOUT);
                if tls {
                    endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
                }
                Ok(Client::Grpc(TraceServiceClient::new(endpoint.connect_lazy())))
            }
            Protocol::Protobuf | Protocol::Json => Ok(Client::Http {
                client: reqwest::Client::new(),
                url: traces_url(&endpoint),
                json: protocol == Protocol::Json,
            }),
        }
    }

    async fn export(
        &mut self,
        request: ExportTraceServiceRequest,
        headers: &HeaderMap,
    ) -> Result<(), Error> {
        match self {
            Client::Grpc(client) => {
                let mut request = tonic::Request::new(request);
                *request.metadata_mut() = MetadataMap::from_headers(headers.clone());
                client.export(request).await?;
            }
            Client::Http { client, url, json } => {
                let (content_type, body) = if *json {
                    ("application/json", serde_json::to_vec(&request)?)
                } else {
                    ("application/x-protobuf", request.encode_to_vec())
                };
                let response = client
                    .post(url.as_str())
                    .headers(headers.clone())
                    .header(CONTENT_TYPE, content_type)
                    .body(body)
                    .send()
                    .await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Rejected(status));
                }
            }
        }
        Ok(())
    }
}

fn traces_url(endpoint: &Uri) -> String {
    let scheme = endpoint.scheme_str().unwrap_or("https");
    let authority = endpoint.authority().map_or("", |a| a.as_str());
    let prefix = endpoint.path().trim_end_matches('/');
    format!("{scheme}://{authority}{prefix}/v1/traces")
}

fn headers(output: &Output, telemetry: &Telemetry) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    let identity = [
        (TEAM_HEADER, telemetry.api_key.as_str()),
        (DATASET_HEADER, telemetry.dataset.as_str()),
    ];
    let extra = output.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    for (name, value) in identity.into_iter().filter(|(_, v)| !v.is_empty()).chain(extra) {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::Header(name.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| Error::Header(name.as_str().to_string()))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

fn key_value(key: &str, value: any_value::Value) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue { value: Some(value) }),
    }
}

fn string_value(key: &str, value: &str) -> KeyValue {
    key_value(key, any_value::Value::StringValue(value.to_string()))
}

struct Attributes(Vec<KeyValue>);

impl AttributeSink for Attributes {
    fn int(&mut self, key: &str, value: i64) {
        self.0.push(key_value(key, any_value::Value::IntValue(value)));
    }

    fn float(&mut self, key: &str, value: f64) {
        self.0.push(key_value(key, any_value::Value::DoubleValue(value)));
    }

    fn string(&mut self, key: &str, value: String) {
        self.0.push(key_value(key, any_value::Value::StringValue(value)));
    }

    fn bool(&mut self, key: &str, value: bool) {
        self.0.push(key_value(key, any_value::Value::BoolValue(value)));
    }
}

fn attributes(fielder: &Fielder, count: u64, level: usize) -> Vec<KeyValue> {
    let mut sink = Attributes(Vec::with_capacity(fielder.attributes_per_span() + 1));
    fielder.add_attributes(&mut sink, count, level);
    sink.0
}

fn exception(time_unix_nano: u64) -> Event {
    Event {
        time_unix_nano,
        name: "exception".to_string(),
        attributes: vec![
            string_value("exception.type", "error"),
            string_value("exception.message", "error message"),
            string_value("exception.stacktrace", "stacktrace"),
            key_value("exception.escaped", any_value::Value::BoolValue(false)),
        ],
        ..Default::default()
    }
}

/// Group spans by resolved service name into one request. `dataset`, when
/// set, replaces every span's service.
fn request<I>(pending: I, dataset: Option<&str>) -> ExportTraceServiceRequest
where
    I: IntoIterator<Item = Pending>,
{
    let mut groups: Vec<(String, Vec<v1::Span>)> = Vec::new();
    for Pending { service, span } in pending {
        let service = dataset.map_or(service, str::to_string);
        match groups.iter_mut().find(|(name, _)| *name == service) {
            Some((_, spans)) => spans.push(span),
            None => groups.push((service, vec![span])),
        }
    }
    let resource_spans = groups
        .into_iter()
        .map(|(service, spans)| v1::ResourceSpans {
            resource: Some(Resource {
                attributes: vec![string_value("service.name", &service)],
                ..Default::default()
            }),
            scope_spans: vec![v1::ScopeSpans {
                scope: Some(InstrumentationScope {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    ..Default::default()
                }),
                spans,
                schema_url: String::new(),
            }],
            schema_url: String::new(),
        })
        .collect();
    ExportTraceServiceRequest { resource_spans }
}

struct Exporter {
    client: Client,
    headers: HeaderMap,
    dataset: Option<String>,
}

impl Exporter {
    async fn flush(&mut self, batch: &mut Vec<Pending>) {
        if batch.is_empty() {
            return;
        }
        let spans = batch.len() as u64;
        let request = request(batch.drain(..), self.dataset.as_deref());
        match self.client.export(request, &self.headers).await {
            Ok(()) => {
                counter!("spans_exported").increment(spans);
                debug!("Exported {spans} spans");
            }
            Err(err) => {
                counter!("export_failure").increment(1);
                warn!("Failed to export {spans} spans: {err}");
            }
        }
    }

    async fn spin(mut self, mut queue: mpsc::Receiver<Pending>, shutdown: loadgen_signal::Watcher) {
        let shutdown_wait = shutdown.recv();
        tokio::pin!(shutdown_wait);

        let mut flush = time::interval_at(time::Instant::now() + FLUSH_INTERVAL, FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch = Vec::with_capacity(BATCH_SIZE);

        loop {
            tokio::select! {
                pending = queue.recv() => {
                    let Some(pending) = pending else { break };
                    batch.push(pending);
                    if batch.len() >= BATCH_SIZE {
                        self.flush(&mut batch).await;
                    }
                }
                _ = flush.tick() => {
                    self.flush(&mut batch).await;
                }
                () = &mut shutdown_wait => {
                    info!("OTLP exporter draining");
                    queue.close();
                    while let Some(pending) = queue.recv().await {
                        batch.push(pending);
                        if batch.len() >= BATCH_SIZE {
                            self.flush(&mut batch).await;
                        }
                    }
                    break;
                }
            }
        }
        self.flush(&mut batch).await;
        info!("OTLP exporter stopped");
    }
}

impl Otlp {
    /// Resolve the endpoint and start the exporter task. Must be called within
    /// a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint or a header is invalid.
    pub fn new(output: &Output, telemetry: &Telemetry) -> Result<Self, Error> {
        let endpoint = output.endpoint()?;
        info!(
            endpoint = %endpoint,
            protocol = %output.protocol,
            "Exporting spans over OTLP"
        );
        let exporter = Exporter {
            client: Client::new(endpoint, output.protocol)?,
            headers: headers(output, telemetry)?,
            dataset: (!telemetry.dataset.is_empty()).then(|| telemetry.dataset.clone()),
        };
        let (queue, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let (watcher, broadcaster) = loadgen_signal::signal();
        let handle = tokio::spawn(exporter.spin(receiver, watcher));
        Ok(Self {
            queue,
            exporter: Mutex::new(Some((broadcaster, handle))),
        })
    }

    fn bind(&self, service: &str, span: v1::Span) -> OtlpSpan {
        OtlpSpan {
            pending: Pending {
                service: service.to_string(),
                span,
            },
            queue: self.queue.clone(),
        }
    }
}

#[async_trait]
impl Sender for Otlp {
    type Span = OtlpSpan;

    fn create_trace(&self, name: &str, fielder: &Fielder, count: u64) -> (SpanContext, Self::Span) {
        let context = SpanContext::root();
        let span = v1::Span {
            trace_id: context.trace_id.to_bytes().to_vec(),
            span_id: context.span_id.to_bytes().to_vec(),
            name: name.to_string(),
            kind: SPAN_KIND_SERVER,
            start_time_unix_nano: now_nanos(),
            attributes: attributes(fielder, count, 0),
            status: Some(Status {
                code: STATUS_CODE_OK,
                ..Default::default()
            }),
            ..Default::default()
        };
        (context, self.bind(fielder.service_name(0), span))
    }

    fn create_span(
        &self,
        parent: &SpanContext,
        name: &str,
        level: usize,
        fielder: &Fielder,
    ) -> (SpanContext, Self::Span) {
        let context = parent.child(level);
        let start = now_nanos();
        let (status, events) = if rand::random_ratio(1, ERROR_ONE_IN) {
            (
                Status {
                    code: STATUS_CODE_ERROR,
                    message: "Somethings wrong".to_string(),
                },
                vec![exception(start)],
            )
        } else {
            (
                Status {
                    code: STATUS_CODE_OK,
                    message: "Everything's good".to_string(),
                },
                Vec::new(),
            )
        };
        let span = v1::Span {
            trace_id: context.trace_id.to_bytes().to_vec(),
            span_id: context.span_id.to_bytes().to_vec(),
            parent_span_id: parent.span_id.to_bytes().to_vec(),
            name: name.to_string(),
            kind: SPAN_KIND_INTERNAL,
            start_time_unix_nano: start,
            attributes: attributes(fielder, 0, level),
            events,
            status: Some(status),
            ..Default::default()
        };
        (context, self.bind(fielder.service_name(level), span))
    }

    async fn close(&self) -> Result<(), super::Error> {
        let exporter = self
            .exporter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((broadcaster, handle)) = exporter {
            broadcaster.signal();
            handle.await.map_err(Error::from)?;
        }
        Ok(())
    }
}

impl Sendable for OtlpSpan {
    fn send(mut self) {
        self.pending.span.end_time_unix_nano = now_nanos();
        match self.queue.try_send(self.pending) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!("spans_dropped").increment(1);
            }
            Err(TrySendError::Closed(_)) => {
                counter!("spans_dropped").increment(1);
                debug!("OTLP exporter closed, dropping span");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{HeaderValue, Uri};
    use loadgen_payload::{Fielder, Options};
    use opentelemetry_proto::tonic::{common::v1::any_value, trace::v1};
    use tokio::sync::mpsc;

    use super::{
        Error, Otlp, Pending, STATUS_CODE_ERROR, STATUS_CODE_OK, headers, request, traces_url,
    };
    use crate::{
        config::{Output, Telemetry},
        sender::{Sendable, Sender},
    };

    fn fielder() -> Fielder {
        Fielder::new(
            "otlp",
            &["team=core".parse().expect("valid field")],
            Options {
                extra_fields: 4,
                nservices: 3,
                ..Options::default()
            },
        )
        .expect("valid fielder")
    }

    fn string_attr<'a>(attrs: &'a [super::KeyValue], key: &str) -> Option<&'a str> {
        attrs.iter().find(|kv| kv.key == key).and_then(|kv| {
            match kv.value.as_ref().and_then(|v| v.value.as_ref()) {
                Some(any_value::Value::StringValue(s)) => Some(s.as_str()),
                _ => None,
            }
        })
    }

    #[test]
    fn traces_urls() {
        let url = |s: &str| traces_url(&s.parse::<Uri>().expect("valid uri"));
        assert_eq!(url("http://localhost:4318/"), "http://localhost:4318/v1/traces");
        assert_eq!(
            url("https://collector:443/otlp/"),
            "https://collector:443/otlp/v1/traces"
        );
    }

    #[test]
    fn identity_headers() {
        let telemetry = Telemetry {
            dataset: "loadtest".to_string(),
            api_key: "secret".to_string(),
        };
        let mut output = Output::default();
        output
            .headers
            .insert("x-extra".to_string(), "yes".to_string());
        let map = headers(&output, &telemetry).expect("valid headers");
        assert_eq!(map.get("x-honeycomb-team").map(HeaderValue::as_bytes), Some(&b"secret"[..]));
        assert_eq!(map.get("x-honeycomb-dataset").map(HeaderValue::as_bytes), Some(&b"loadtest"[..]));
        assert_eq!(map.get("x-extra").map(HeaderValue::as_bytes), Some(&b"yes"[..]));

        let map = headers(&Output::default(), &Telemetry::default()).expect("valid headers");
        assert!(map.is_empty());

        output
            .headers
            .insert("bad header".to_string(), "x".to_string());
        assert!(matches!(headers(&output, &telemetry), Err(Error::Header(_))));
    }

    #[test]
    fn requests_group_by_service() {
        let pending = |service: &str| Pending {
            service: service.to_string(),
            span: v1::Span::default(),
        };
        let spans = || vec![pending("a"), pending("b"), pending("a")];

        let grouped = request(spans(), None);
        assert_eq!(grouped.resource_spans.len(), 2);
        let services: Vec<Option<&str>> = grouped
            .resource_spans
            .iter()
            .map(|rs| {
                rs.resource
                    .as_ref()
                    .and_then(|r| string_attr(&r.attributes, "service.name"))
            })
            .collect();
        assert_eq!(services, vec![Some("a"), Some("b")]);
        assert_eq!(grouped.resource_spans[0].scope_spans[0].spans.len(), 2);

        let collapsed = request(spans(), Some("dataset"));
        assert_eq!(collapsed.resource_spans.len(), 1);
        assert_eq!(collapsed.resource_spans[0].scope_spans[0].spans.len(), 3);
    }

    #[test]
    fn spans_carry_ids_status_and_fields() {
        let (queue, mut receiver) = mpsc::channel(1_024);
        let otlp = Otlp {
            queue,
            exporter: Mutex::new(None),
        };
        let fielder = fielder();

        let (root_ctx, root) = otlp.create_trace("root", &fielder, 9);
        for _ in 0..200 {
            let (_, child) = otlp.create_span(&root_ctx, "child", 1, &fielder);
            child.send();
        }
        root.send();

        let mut children = Vec::new();
        while let Ok(pending) = receiver.try_recv() {
            children.push(pending);
        }
        let root = children.pop().expect("root sent last");
        assert_eq!(children.len(), 200);

        assert!(root.span.parent_span_id.is_empty());
        assert_eq!(root.span.trace_id, root_ctx.trace_id.to_bytes().to_vec());
        assert_eq!(root.span.status.as_ref().map(|s| s.code), Some(STATUS_CODE_OK));
        assert_eq!(root.service, fielder.service_name(0));
        assert!(root.span.end_time_unix_nano >= root.span.start_time_unix_nano);
        assert!(root.span.attributes.iter().any(|kv| kv.key == "count"));
        assert_eq!(string_attr(&root.span.attributes, "team"), Some("core"));
        assert!(root.span.attributes.iter().any(|kv| kv.key == "process_id"));

        let mut errors = 0;
        for child in &children {
            assert_eq!(child.span.parent_span_id, root_ctx.span_id.to_bytes().to_vec());
            assert_eq!(child.span.trace_id, root.span.trace_id);
            assert_eq!(child.service, fielder.service_name(1));
            assert!(!child.span.attributes.iter().any(|kv| kv.key == "count"));
            let status = child.span.status.as_ref().expect("status set");
            if status.code == STATUS_CODE_ERROR {
                errors += 1;
                assert_eq!(child.span.events.len(), 1);
                assert_eq!(child.span.events[0].name, "exception");
                assert_eq!(
                    string_attr(&child.span.events[0].attributes, "exception.type"),
                    Some("error")
                );
            } else {
                assert!(child.span.events.is_empty());
            }
        }
        assert!(errors > 0 && errors < 100, "errors {errors}");
    }

    #[tokio::test]
    async fn close_stops_the_exporter() {
        let output = Output {
            host: "http://127.0.0.1:9".to_string(),
            ..Output::default()
        };
        let otlp = Otlp::new(&output, &Telemetry::default()).expect("valid endpoint");
        otlp.close().await.expect("exporter stops");
        otlp.close().await.expect("second close is a no-op");
    }
}

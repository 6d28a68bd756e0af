use std::{env, io::Read, net::SocketAddr, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use loadgen::{
    config::{self, Config, Protocol, SenderKind},
    generator::{self, TraceGenerator},
    sender::{self, Sender, Transport},
};
use loadgen_payload::{Fielder, fielder};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{runtime::Builder, signal};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

const CONFIG_ENV: &str = "LOADGEN_CONFIG";

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::Error),
    #[error("Failed to build fields: {0}")]
    Fielder(#[from] fielder::Error),
    #[error("Sender failed: {0}")]
    Sender(#[from] sender::Error),
    #[error("Trace generator failed: {0}")]
    Generator(#[from] generator::Error),
    #[error("Could not join the trace generator task: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Parsing Prometheus address failed: {0}")]
    PrometheusAddr(#[from] std::net::AddrParseError),
    #[error("Failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct CliWithSubcommands {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate traces with the specified configuration
    Run(Box<RunCommand>),
    /// Validate configuration and fields and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args)]
struct RunCommand {
    #[command(flatten)]
    args: LoadgenArgs,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<String>,
    /// additional fields, each `name=spec`
    fields: Vec<String>,
}

#[derive(Args)]
struct LoadgenArgs {
    /// path on disk to the configuration file, defaults apply without one
    #[clap(long)]
    config_path: Option<String>,
    /// seed for field generation
    #[clap(long)]
    seed: Option<String>,
    /// nesting depth of each trace
    #[clap(long)]
    depth: Option<usize>,
    /// number of spans in each trace
    #[clap(long)]
    spancount: Option<usize>,
    /// number of auto-named extra fields per span
    #[clap(long)]
    extra_fields: Option<usize>,
    /// duration of one trace, in milliseconds
    #[clap(long)]
    duration_millis: Option<u64>,
    /// number of simulated services
    #[clap(long)]
    nservices: Option<usize>,
    /// target traces per second
    #[clap(long)]
    tps: Option<f64>,
    /// total traces to send, 0 for no limit
    #[clap(long)]
    tracecount: Option<u64>,
    /// maximum run time in seconds, 0 for no limit
    #[clap(long)]
    maxtime_seconds: Option<u64>,
    /// ramp up and down time, in milliseconds
    #[clap(long)]
    ramp_millis: Option<u64>,
    /// where spans go: print, dummy or otlp
    #[clap(long)]
    sender: Option<SenderKind>,
    /// OTLP protocol: grpc, protobuf or json
    #[clap(long)]
    protocol: Option<Protocol>,
    /// OTLP host: honeycomb, dogfood, localhost or a URL
    #[clap(long)]
    host: Option<String>,
    /// use http when the host names no scheme
    #[clap(long)]
    insecure: bool,
    /// dataset name
    #[clap(long)]
    dataset: Option<String>,
    /// API key
    #[clap(long)]
    apikey: Option<String>,
    /// socket to bind the prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<String>,
    /// log at debug unless RUST_LOG says otherwise
    #[clap(long, short)]
    verbose: bool,
    /// the maximum time to wait, in seconds, for controlled shutdown
    #[clap(long, default_value_t = 10)]
    max_shutdown_delay: u16,
    /// additional fields, each `name=spec`
    fields: Vec<String>,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .finish()
        .init();
}

fn load_config_contents(config_path: Option<&str>) -> Result<Option<String>, Error> {
    if let Ok(env_var_value) = env::var(CONFIG_ENV) {
        debug!("Using config from env var '{CONFIG_ENV}'");
        return Ok(Some(env_var_value));
    }
    let Some(config_path) = config_path else {
        debug!("No configuration given, using defaults");
        return Ok(None);
    };
    debug!("Attempting to open configuration file at: {config_path}");
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_path)
        .map_err(|err| {
            error!("Could not read config file '{config_path}': {err}");
            err
        })?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(Some(contents))
}

fn parse_config(contents: Option<&str>) -> Result<Config, Error> {
    let Some(contents) = contents else {
        return Ok(Config::default());
    };
    Config::from_yaml(contents).map_err(|err| {
        error!("Configuration validation failed: {err}");
        Error::Config(err)
    })
}

/// Build the run configuration: file or environment first, then flags, then
/// positional fields appended after the configured ones.
fn get_config(args: &LoadgenArgs, contents: Option<String>) -> Result<Config, Error> {
    let contents = match contents {
        Some(contents) => Some(contents),
        None => load_config_contents(args.config_path.as_deref())?,
    };
    let mut config = parse_config(contents.as_deref())?;

    if let Some(seed) = &args.seed {
        config.seed.clone_from(seed);
    }
    let format = &mut config.format;
    format.depth = args.depth.unwrap_or(format.depth);
    format.span_count = args.spancount.unwrap_or(format.span_count);
    format.extra_fields = args.extra_fields.unwrap_or(format.extra_fields);
    format.trace_duration_millis = args.duration_millis.unwrap_or(format.trace_duration_millis);
    format.nservices = args.nservices.unwrap_or(format.nservices);

    let quantity = &mut config.quantity;
    quantity.traces_per_second = args.tps.unwrap_or(quantity.traces_per_second);
    quantity.trace_count = args.tracecount.unwrap_or(quantity.trace_count);
    quantity.max_time_seconds = args.maxtime_seconds.unwrap_or(quantity.max_time_seconds);
    quantity.ramp_millis = args.ramp_millis.unwrap_or(quantity.ramp_millis);

    let output = &mut config.output;
    output.sender = args.sender.unwrap_or(output.sender);
    output.protocol = args.protocol.unwrap_or(output.protocol);
    if let Some(host) = &args.host {
        output.host.clone_from(host);
    }
    output.insecure |= args.insecure;

    if let Some(dataset) = &args.dataset {
        config.telemetry.dataset.clone_from(dataset);
    }
    if let Some(apikey) = &args.apikey {
        config.telemetry.api_key.clone_from(apikey);
    }
    config.fields.extend(args.fields.iter().cloned());

    config.valid()?;
    Ok(config)
}

fn build_fielder(config: &Config) -> Result<Fielder, Error> {
    let specs = config.field_specs().map_err(|err| {
        error!("Field validation failed: {err}");
        err
    })?;
    Ok(Fielder::new(&config.seed, &specs, config.fielder_options())?)
}

fn validate_config(command: &ConfigCheckCommand) -> Result<(), Error> {
    let contents = load_config_contents(command.config_path.as_deref())?;
    let mut config = parse_config(contents.as_deref())?;
    config.fields.extend(command.fields.iter().cloned());
    config.valid()?;
    let fielder = build_fielder(&config)?;
    info!(
        fields = fielder.len(),
        "Configuration and fields are valid"
    );
    Ok(())
}

async fn inner_main(config: Config, prometheus_addr: Option<SocketAddr>) -> Result<(), Error> {
    if let Some(addr) = prometheus_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus exporter listening on {addr}");
    }

    let fielder = Arc::new(build_fielder(&config)?);
    info!(
        fields = fielder.len(),
        services = ?fielder.services(),
        "Fields ready"
    );
    let sender = Arc::new(Transport::new(&config)?);
    let generator = TraceGenerator::new(
        Arc::clone(&sender),
        fielder,
        &config.seed,
        config.shape(),
        config.throughput(),
    )?;

    let (shutdown_watcher, shutdown_broadcast) = loadgen_signal::signal();
    let engine = tokio::spawn(generator.spin(shutdown_watcher));
    tokio::pin!(engine);

    let res = tokio::select! {
        res = &mut engine => res,
        _ = signal::ctrl_c() => {
            info!("received ctrl-c");
            shutdown_broadcast.signal();
            (&mut engine).await
        }
    };
    let closed = sender.close().await;
    res??;
    closed?;
    Ok(())
}

fn main() -> Result<(), Error> {
    let cli = CliWithSubcommands::parse();
    let args = match cli.command {
        Commands::Run(run_cmd) => run_cmd.args,
        Commands::ConfigCheck(config_check_cmd) => {
            init_logging(false);
            match validate_config(&config_check_cmd) {
                Ok(()) => std::process::exit(0),
                Err(_) => std::process::exit(1),
            }
        }
    };
    init_logging(args.verbose);

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting loadgen {version} run.");

    let config = get_config(&args, None)?;
    let prometheus_addr = args
        .prometheus_addr
        .as_deref()
        .map(str::parse::<SocketAddr>)
        .transpose()?;
    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config, prometheus_addr));
    info!(
        "Shutting down runtime with a {} second delay. May leave orphaned tasks.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);
    info!("Bye. :)");
    res
}

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use mcpstdio::{supervisor, Config, Framing, ResponseOrder};

#[derive(Parser, Debug)]
#[command(name = "mcpstdio", version)]
#[command(about = "MCP server over stdio with a ping health-check tool", long_about = None)]
struct Args {
    /// Event log file (default: ~/mcpstdio.log)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Message framing on stdin/stdout
    #[arg(long, value_enum, default_value_t = Framing::Lines)]
    framing: Framing,

    /// Write responses in request arrival order instead of completion order
    #[arg(long)]
    ordered: bool,

    /// Seconds between liveness entries in the event log
    #[arg(long, default_value_t = 30)]
    liveness_interval_secs: u64,

    /// Fail requests whose handler runs longer than this many seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    /// Seconds in-flight requests may still finish after stdin closes
    #[arg(long, default_value_t = 5)]
    shutdown_grace_secs: u64,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            log_file: args.log_file,
            framing: args.framing,
            response_order: if args.ordered {
                ResponseOrder::Arrival
            } else {
                ResponseOrder::Completion
            },
            liveness_interval: Duration::from_secs(args.liveness_interval_secs),
            request_timeout: args.request_timeout_secs.map(Duration::from_secs),
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
            ..Config::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout belongs to the protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcpstdio=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();

    supervisor::run(args.into())
}

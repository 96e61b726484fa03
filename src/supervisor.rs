//! Process lifecycle: wiring, liveness reporting and shutdown.
//!
//! This is the only place that decides the process exit status.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::logger::EventLog;
use crate::registry::ToolRegistry;
use crate::server::{panic_message, Server};
use crate::tools;
use crate::transport::{self, SessionEnd, StreamTransport};
use crate::types::McpError;

/// How the process should exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Input closed, interrupted, or the peer went away.
    Clean,
    /// A fault escaped every component-local handler.
    Fault,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Clean => ExitCode::SUCCESS,
            Exit::Fault => ExitCode::FAILURE,
        }
    }
}

/// Run the server on stdio until the session ends.
///
/// Uses a current-thread runtime: handlers interleave at their await points
/// but never run in parallel.
pub fn run(config: Config) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let framing = config.framing;
    let exit = runtime.block_on(Supervisor::new(config).run_with(transport::stdio(framing)));
    // A blocked stdin read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_secs(1));
    exit.into()
}

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start every component, serve `transport` and shut down.
    pub async fn run_with<R, W>(self, transport: StreamTransport<R, W>) -> Exit
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        // Truncate the log before anything else can write to it.
        let log = Arc::new(EventLog::create_or_disabled(self.config.log_path()).await);
        log.record(format!(
            "Starting {} {}",
            self.config.server_name, self.config.server_version
        ))
        .await;

        let server = match self.build_server(Arc::clone(&log)) {
            Ok(server) => Arc::new(server),
            Err(e) => {
                tracing::error!(error = %e, "startup failed");
                log.record(format!("Fatal: startup failed: {}", e)).await;
                return Exit::Fault;
            }
        };
        log.record(format!(
            "Registered {} tool(s); awaiting requests",
            server.registry().len()
        ))
        .await;
        tracing::info!(name = server.name(), "server ready");

        let shutdown = CancellationToken::new();
        let liveness = spawn_liveness(
            Arc::clone(&log),
            self.config.liveness_interval,
            shutdown.child_token(),
        );
        let interrupt = spawn_interrupt_watch(shutdown.clone());

        let session = {
            let server = Arc::clone(&server);
            let options = self.config.serve_options();
            let cancel = shutdown.child_token();
            let mut transport = transport;
            tokio::spawn(async move { transport.serve(&server, &options, cancel).await })
        };

        let exit = match session.await {
            Ok(Ok(SessionEnd::InputClosed)) => {
                log.record("Input stream closed; shutting down").await;
                Exit::Clean
            }
            Ok(Ok(SessionEnd::Cancelled)) => {
                log.record("Interrupted; shutting down").await;
                Exit::Clean
            }
            Ok(Err(McpError::TransportWrite(e))) => {
                tracing::warn!(error = %e, "output stream broken");
                log.record(format!("Output stream broken ({}); shutting down", e))
                    .await;
                Exit::Clean
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "session failed");
                log.record(format!("Fatal: session failed: {:?}", e)).await;
                Exit::Fault
            }
            Err(join) => {
                let detail = if join.is_panic() {
                    panic_message(&*join.into_panic())
                } else {
                    "session task cancelled".to_string()
                };
                tracing::error!(detail = %detail, "session task died");
                log.record(format!("Fatal: session task died: {}", detail))
                    .await;
                Exit::Fault
            }
        };

        shutdown.cancel();
        interrupt.abort();
        if let Err(e) = liveness.await {
            tracing::warn!(error = %e, "liveness task ended abnormally");
        }

        log.record(format!("Server stopped ({:?})", exit)).await;
        exit
    }

    fn build_server(&self, log: Arc<EventLog>) -> Result<Server, McpError> {
        let mut registry = ToolRegistry::new();
        tools::register_builtin(&mut registry)?;

        Server::builder()
            .registry(registry)
            .server_info(&self.config.server_name, &self.config.server_version)
            .event_log(log)
            .request_timeout(self.config.request_timeout)
            .build()
    }
}

/// Record a liveness entry every `every` until `cancel` fires.
fn spawn_liveness(log: Arc<EventLog>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    // tokio's interval rejects a zero period.
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log.record("Server still alive").await,
            }
        }
    })
}

fn spawn_interrupt_watch(shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for interrupts"),
        }
    })
}

//! rcmd - remote command host and client
//!
//! - `serve` runs a dispatch engine (TCP or watched directory) and installs
//!   the shutdown hook chain
//! - `send` delivers one command to a running host
//! - `inspect` decodes a message file

mod command;
mod config;
mod connection;
mod context;
mod engine;
mod flow;
mod shutdown;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use command::{CommandRegistry, RegistryError};
use config::{HostConfig, WireFormat};
use connection::{Connection, DirectoryConnection, TcpConnection};
use context::AppContext;
use engine::{DirectoryEngine, ScriptingEngine, TcpEngine};
use rcmd_shared::protocol::DEFAULT_PORT;
use rcmd_shared::ErrorCollection;
use shutdown::{MultiHook, RemoteCommandExecution, ShutdownHook, ShutdownRegistry, StopFlows};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rcmd", about = "Remote command host and client", version)]
struct Cli {
    /// Log filter, e.g. `debug` or `rcmd=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command host
    Serve(ServeArgs),
    /// Send one command to a host
    Send(SendArgs),
    /// Decode a message file and print its header
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, value_enum, default_value_t = WireFormat::Plain)]
    format: WireFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Watch this directory instead of listening on TCP
    #[arg(long)]
    watch_dir: Option<PathBuf>,

    /// Where the directory engine writes responses
    #[arg(long, requires = "watch_dir")]
    response_dir: Option<PathBuf>,

    /// Time each flow gets to stop at shutdown
    #[arg(long, default_value = "5000")]
    flow_timeout_ms: u64,

    /// Time the engine gets to stop at shutdown
    #[arg(long, default_value = "10000")]
    grace_ms: u64,
}

impl ServeArgs {
    fn into_config(self) -> HostConfig {
        HostConfig {
            bind: self.bind,
            port: self.port,
            format: self.format,
            pretty: self.pretty,
            watch_dir: self.watch_dir,
            response_dir: self.response_dir,
            flow_timeout: Duration::from_millis(self.flow_timeout_ms),
            grace_period: Duration::from_millis(self.grace_ms),
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct SendArgs {
    /// Command line, e.g. `basic.Ping` or `flow.StopFlow -id 2`
    descriptor: String,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, value_enum, default_value_t = WireFormat::Plain)]
    format: WireFormat,

    #[arg(long)]
    pretty: bool,

    /// File whose content becomes the request payload
    #[arg(long)]
    payload: Option<PathBuf>,

    /// Drop the request into this directory instead of using TCP
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Connect and read timeout
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    /// Run a local TCP engine on this port while sending, and wait for
    /// the host to stop it with a command of its own
    #[arg(long)]
    listen_port: Option<u16>,

    /// How long the local engine waits to be stopped
    #[arg(long, default_value = "30000", requires = "listen_port")]
    wait_ms: u64,
}

#[derive(Args)]
struct InspectArgs {
    file: PathBuf,

    /// Wire format; guessed from the extension when omitted
    #[arg(long, value_enum)]
    format: Option<WireFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = filter_directive(cli.log_level.as_deref(), std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Serve(args) => serve(args.into_config()).await,
        Commands::Send(args) => send(args).await,
        Commands::Inspect(args) => inspect(args),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// `--log-level` wins over RUST_LOG, which wins over `info`
fn filter_directive(flag: Option<&str>, env: Option<String>) -> String {
    flag.map(str::to_string)
        .or(env.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| "info".into())
}

async fn serve(config: HostConfig) -> Result<()> {
    let ctx = Arc::new(AppContext::standard(config.clone()));

    let (engine, connection): (Arc<dyn ScriptingEngine>, Arc<dyn Connection>) = match &config.watch_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            if let Some(responses) = &config.response_dir {
                tokio::fs::create_dir_all(responses).await?;
            }
            let engine: Arc<dyn ScriptingEngine> =
                Arc::new(DirectoryEngine::new(dir, config.response_dir.clone()));
            let connection: Arc<dyn Connection> =
                Arc::new(DirectoryConnection::new(dir, config.processor()));
            (engine, connection)
        }
        None => {
            let engine = TcpEngine::bind(&config.bind, config.port).await?;
            let connection = TcpConnection::from_config(
                &HostConfig {
                    port: engine.local_addr().port(),
                    ..config.clone()
                },
                ctx.registry().clone(),
            );
            let engine: Arc<dyn ScriptingEngine> = Arc::new(engine);
            let connection: Arc<dyn Connection> = Arc::new(connection);
            (engine, connection)
        }
    };

    engine.control().set_owner("serve");
    ctx.set_engine(engine.clone());
    let mut engine_task: JoinHandle<Result<()>> = tokio::spawn({
        let (ctx, engine) = (ctx.clone(), engine.clone());
        async move { engine.execute(ctx).await }
    });

    let hooks = ShutdownRegistry::new();
    let stop_flows = || StopFlows::new(ctx.flows().clone(), config.flow_timeout, config.poll_interval);
    let chain = MultiHook::new().with(stop_flows()).with(
        RemoteCommandExecution::new(ctx.clone(), connection)
            .command(ctx.registry().instantiate("basic.Stop -type engine")?)
            .wait_time(config.grace_period)
            .poll_interval(config.poll_interval),
    );
    let chain_id = hooks
        .install(&chain)
        .map_err(|e| anyhow!("Failed to install shutdown hooks: {}", e))?;
    info!("{} shutdown hook(s) installed", hooks.len());

    info!("Host running ({} engine, {} format)", engine.name(), ctx.processor().name());

    let mut exit = ctx.exit_requested();
    let engine_ended = tokio::select! {
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            false
        }
        _ = exit.wait_for(|requested| *requested) => {
            info!("Exit requested by command");
            false
        }
        result = &mut engine_task => {
            report_engine(result);
            true
        }
    };

    // Nothing left to send a stop to
    if engine_ended {
        hooks.remove(chain_id);
        hooks
            .install(&stop_flows())
            .map_err(|e| anyhow!("Failed to install shutdown hooks: {}", e))?;
    }

    let failures = hooks.run().await;

    if !engine_ended {
        match tokio::time::timeout(config.grace_period, &mut engine_task).await {
            Ok(result) => report_engine(result),
            Err(_) => {
                warn!("Engine still running after {}ms, aborting", config.grace_period.as_millis());
                engine.stop_execution();
                engine_task.abort();
            }
        }
    }

    info!("Host stopped");
    if !failures.is_empty() {
        bail!("Shutdown finished with errors: {}", failures.join("; "));
    }
    Ok(())
}

fn report_engine(result: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("Engine stopped"),
        Ok(Err(e)) => error!("Engine error: {:#}", e),
        Err(e) => error!("Engine task failed: {}", e),
    }
}

async fn send(args: SendArgs) -> Result<()> {
    let registry = Arc::new(CommandRegistry::standard());
    let processor = args.format.processor(args.pretty);

    let mut command = registry.instantiate(&args.descriptor).map_err(|e| match e {
        RegistryError::UnknownKind(_) => anyhow!("{} (known kinds: {})", e, registry.kinds().join(", ")),
        e => e.into(),
    })?;
    if let Some(path) = &args.payload {
        let payload = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read payload {}", path.display()))?;
        command.set_payload(payload);
    }

    let connection: Arc<dyn Connection> = match &args.dir {
        Some(dir) => Arc::new(DirectoryConnection::new(dir.clone(), processor.clone())),
        None => {
            let timeout = Duration::from_millis(args.timeout_ms);
            Arc::new(
                TcpConnection::new(&args.host, args.port, processor.clone(), registry.clone())
                    .with_timeouts(timeout, timeout),
            )
        }
    };

    let Some(listen_port) = args.listen_port else {
        info!("Sending {} to {}", command.descriptor(), connection.name());
        return connection.send_request(&command).await;
    };

    let config = HostConfig {
        port: listen_port,
        format: args.format,
        pretty: args.pretty,
        ..Default::default()
    };
    let engine = TcpEngine::bind(&config.bind, config.port).await?;
    info!("Local engine listening on {}", engine.local_addr());

    let ctx = Arc::new(AppContext::new(config.clone(), registry));
    let hook = RemoteCommandExecution::new(ctx, connection)
        .command(command)
        .engine(Arc::new(engine))
        .wait_time(Duration::from_millis(args.wait_ms))
        .poll_interval(config.poll_interval);
    if let Some(problem) = hook.check() {
        bail!("{}", problem);
    }
    hook.configure().await
}

fn inspect(args: InspectArgs) -> Result<()> {
    let format = args.format.unwrap_or_else(|| {
        match args.file.extension().and_then(|e| e.to_str()) {
            Some("json") => WireFormat::Json,
            _ => WireFormat::Plain,
        }
    });
    let processor = format.processor(false);

    let mut errors = ErrorCollection::new();
    let Some(message) = processor.read_message(&args.file, &mut errors) else {
        bail!("{}", errors);
    };

    println!("File:    {}", args.file.display());
    println!("Format:  {}", processor.name());
    println!("Header:");
    for (key, value) in message.header.iter() {
        println!("  {} = {}", key, value);
    }
    println!("Payload: {} bytes", message.payload.len());

    let registry = CommandRegistry::standard();
    match command::from_message(&registry, message, &mut errors) {
        Some(command) => println!("Command: {} ({})", command.kind(), command.role()),
        None => println!("Command: not recognised ({})", errors),
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io;
use std::time::Duration;

use sockscope::backends::netio::{detect_netio_backends, select_netio_backend};
use sockscope::backends::process::socket_mapper::{detect_socket_mappers, select_socket_mapper};
use sockscope::{
    CancelToken, Config, ConnectionCollector, KillRequest, Killer, NixSignalSender, Report,
    filter_by_pid, filter_by_port,
};

/// Sockscope - who owns which socket
#[derive(Parser, Debug)]
#[command(name = "sockscope")]
#[command(version)]
#[command(about = "List TCP/UDP sockets by owning application and kill by port", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    /// Socket mapper backend to use (procfs, lsof, libproc)
    #[arg(long, global = true, value_name = "BACKEND")]
    socket_mapper: Option<String>,

    /// Give up on collection after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// List all available backends and exit
    #[arg(long)]
    list_backends: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    list: ListArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show sockets grouped by application (default)
    List(ListArgs),

    /// Signal the processes bound to one or more local ports
    Kill(KillArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
struct ListArgs {
    /// Only show connections on this port (local or remote)
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Only show connections owned by this PID
    #[arg(long, value_name = "PID")]
    pid: Option<i32>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Skip per-process byte counters
    #[arg(long)]
    no_io: bool,
}

#[derive(ClapArgs, Debug, Clone)]
struct KillArgs {
    /// Local ports whose owners should be signalled
    #[arg(required = true, value_name = "PORT")]
    ports: Vec<u16>,

    /// Signal name or number (default from config, TERM otherwise)
    #[arg(long, short, value_name = "SIGNAL")]
    signal: Option<String>,

    /// Don't ask for confirmation
    #[arg(long, short)]
    yes: bool,
}

/// Effective settings after merging config file and flags
struct Settings {
    socket_mapper: Option<String>,
    netio_backend: Option<String>,
    enrichment: bool,
    default_signal: String,
}

fn print_available_backends() {
    println!("Sockscope v{} - Available Backends\n", env!("CARGO_PKG_VERSION"));

    println!("Socket Mappers:");
    for backend in detect_socket_mappers() {
        let status = if backend.available {
            "available"
        } else {
            "unavailable"
        };
        let capabilities = select_socket_mapper(Some(backend.name))
            .map(|mapper| mapper.capabilities().summary())
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "  {:20} [priority: {:?}] {:12} {}",
            backend.name, backend.priority, status, capabilities
        );
    }

    println!();

    println!("I/O Enrichment:");
    let netio_backends = detect_netio_backends();
    if netio_backends.is_empty() {
        println!("  (none compiled in)");
    } else {
        for backend in netio_backends {
            let status = if backend.available {
                "available"
            } else {
                "unavailable"
            };
            println!(
                "  {:20} [priority: {:?}] {}",
                backend.name, backend.priority, status
            );
        }
    }

    println!();
    println!("Usage:");
    println!("  sockscope [list] [--port <PORT>] [--pid <PID>] [--json] [--no-io]");
    println!("  sockscope kill <PORT>... [--signal <SIGNAL>] [--yes]");
}

fn run_list(args: &ListArgs, settings: &Settings, cancel: &CancelToken) -> Result<()> {
    let collector = ConnectionCollector::with_socket_mapper(settings.socket_mapper.as_deref())?;

    if let Some(pid) = args.pid {
        if !collector.process_exists(pid) {
            anyhow::bail!("No process with PID {}", pid);
        }
    }

    let netio = if settings.enrichment && !args.no_io {
        select_netio_backend(settings.netio_backend.as_deref())
    } else {
        None
    };
    if let Some(ref backend) = netio {
        log::debug!("Using I/O enrichment backend: {}", backend.name());
    }

    let (mut snapshot, stats) = collector.collect_once(netio.as_deref(), cancel)?;

    if let Some(port) = args.port {
        snapshot = filter_by_port(&snapshot, port);
    }
    if let Some(pid) = args.pid {
        snapshot = filter_by_pid(&snapshot, pid);
    }

    let report = Report::build(&snapshot, &stats);
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print!("{}", report.render_table());
    }

    Ok(())
}

fn run_kill(args: &KillArgs, settings: &Settings, cancel: &CancelToken) -> Result<()> {
    let signal = args
        .signal
        .clone()
        .unwrap_or_else(|| settings.default_signal.clone());
    let request = KillRequest::new(signal, args.ports.clone()).assume_yes(args.yes);

    let collector = ConnectionCollector::with_socket_mapper(settings.socket_mapper.as_deref())?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let outcome =
        Killer::new(&collector, &NixSignalSender).run(&request, cancel, &mut input, &mut output)?;
    log::debug!("Kill finished: {:?}", outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::formatted_builder()
            .parse_default_env()
            .init();
    }

    // Handle --list-backends
    if args.list_backends {
        print_available_backends();
        return Ok(());
    }

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Ignoring config: {:#}", e);
        Config::default()
    });

    let timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.command_timeout());
    let settings = Settings {
        socket_mapper: args.socket_mapper.or(config.preferred_socket_mapper),
        netio_backend: config.preferred_netio_backend,
        enrichment: config.enrichment,
        default_signal: config.default_signal,
    };

    let cancel = CancelToken::with_timeout(timeout);
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Received Ctrl+C, cancelling");
                cancel.cancel();
            }
        });
    }

    let command = args.command.unwrap_or(Command::List(args.list));

    // Collection blocks on the OS and on child processes
    tokio::task::spawn_blocking(move || match command {
        Command::List(list) => run_list(&list, &settings, &cancel),
        Command::Kill(kill) => run_kill(&kill, &settings, &cancel),
    })
    .await
    .context("Worker thread failed")?
}

//! Surface Mapper
//!
//! Runs a configured control surface: connects the MIDI ports, feeds inbound
//! messages into the session and flushes its output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use surface_mapper::actions::ConsoleActions;
use surface_mapper::config::SurfaceConfig;
use surface_mapper::output::MidiSink;
use surface_mapper::ports::{self, DryRunSink, InputPorts, PortSink};
use surface_mapper::{Error, Message, Session};

/// Surface Mapper - Drive applications from a MIDI control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "surface.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to this file, rotated daily
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Run without hardware; output is only logged
    #[arg(long)]
    dry_run: bool,

    /// Validate the configuration and print a summary
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, args.log_file.as_deref())?;

    info!("Starting Surface Mapper v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        // Mark the configured ports when the config is readable
        let (inputs, outputs) = match SurfaceConfig::load(&args.config).await {
            Ok(config) => (config.midi.inputs, config.midi.outputs),
            Err(_) => Default::default(),
        };
        ports::print_ports(&inputs, &outputs)?;
        return Ok(());
    }

    info!("Configuration file: {}", args.config);
    let config = SurfaceConfig::load(&args.config).await?;
    info!(
        "✅ Configuration loaded ({} controls, {} views)",
        config.controls.len(),
        config.views.len()
    );

    if args.check {
        return check_config(&config);
    }

    let actions = ConsoleActions::new();
    let (tx, rx) = mpsc::channel::<Message>(1024);

    let (sink, inputs): (Box<dyn MidiSink>, Option<InputPorts>) = if args.dry_run {
        warn!("⚠️  Dry run: no MIDI ports are opened");
        (Box::new(DryRunSink::new()), None)
    } else {
        let sink = PortSink::connect(&config.midi.outputs)?;
        let inputs = InputPorts::connect(&config.midi.inputs, tx)?;
        info!("✅ Connected {} inputs, {} outputs", inputs.len(), sink.len());
        (Box::new(sink), Some(inputs))
    };

    let mut session = Session::new(sink);
    config.register(&mut session, &actions)?;
    session.init()?;
    if let Some(view) = config.initial_view() {
        session.activate_view(view)?;
    }
    session.flush()?;

    run(&mut session, rx, config.timing.flush_interval(), shutdown_signal()).await?;

    drop(inputs);
    info!(
        "Surface Mapper shutdown complete ({} actions executed)",
        actions.execution_count()
    );
    Ok(())
}

async fn run(
    session: &mut Session,
    mut rx: mpsc::Receiver<Message>,
    flush_interval: Duration,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("🚀 Ready to process MIDI events!");

    let mut flush_tick = tokio::time::interval(flush_interval);
    flush_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    loop {
        let deadline = session.next_deadline();
        let timers = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            Some(message) = rx.recv() => {
                match session.on_midi_input(&message) {
                    Ok(()) => {}
                    Err(Error::UnmatchedMessage(hex)) => debug!("No control for {}", hex),
                    Err(e) => warn!("⚠️  Failed to handle {}: {}", message.short_hex(), e),
                }
                flush(session);
            }

            _ = timers => {
                if let Err(e) = session.run_due_timers() {
                    warn!("⚠️  Timer failed: {}", e);
                }
                flush(session);
            }

            _ = flush_tick.tick() => flush(session),

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    info!("Shutting down...");
    session.exit().context("Failed to reset controls on exit")?;
    Ok(())
}

fn flush(session: &mut Session) {
    if let Err(e) = session.flush() {
        warn!("⚠️  Flush failed: {}", e);
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {}", path.display()))?;

            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let layer = fmt::layer().with_ansi(false).with_target(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️  Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn check_config(config: &SurfaceConfig) -> Result<()> {
    use colored::*;

    println!("\n{}", "=== Surface Configuration ===".bold().cyan());

    let mut session = Session::new(Box::new(DryRunSink::new()));
    config.register(&mut session, &ConsoleActions::new())?;
    session.init().context("Session failed to initialise")?;

    println!("\n{}", "Ports:".bold());
    for (index, name) in config.midi.inputs.iter().enumerate() {
        println!("  in  {} {}", index.to_string().green(), name);
    }
    for (index, name) in config.midi.outputs.iter().enumerate() {
        println!("  out {} {}", index.to_string().green(), name);
    }

    println!("\n{}", "Controls:".bold());
    for control in session.controls() {
        let patterns: Vec<String> = control.patterns().iter().map(|p| p.to_string()).collect();
        println!(
            "  {:<12} {} [{}..{}]",
            control.name().bright_white(),
            patterns.join(" ").yellow(),
            control.min_value(),
            control.max_value()
        );
    }

    println!("\n{}", "Views:".bold());
    for view in &config.views {
        let extends = if view.extends.is_empty() {
            String::new()
        } else {
            format!(" extends {}", view.extends.join(", "))
        };
        println!(
            "  {}{} ({} components)",
            view.name.cyan(),
            extends.dimmed(),
            view.components.len()
        );
    }

    if let Some(view) = config.initial_view() {
        println!("\n  Initial view: {}", view.green());
    }
    println!("\n{}", "Configuration OK".bold().bright_green());
    Ok(())
}

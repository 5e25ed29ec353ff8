//! fleetdeck - operator CLI and terminal dashboard for device fleets.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive dashboard for the default tenant
//! fleetdeck tui
//!
//! # Open on the devices screen with sample data
//! fleetdeck tui --demo --screen devices
//!
//! # One JSON snapshot on stdout, for scripts and agents
//! fleetdeck tui --headless --screen incidents
//!
//! # Keep emitting snapshots every 2s, at most 10 of them
//! fleetdeck tui --headless --follow --interval-ms 2000 --max-frames 10
//!
//! # List configured tenants
//! fleetdeck tenants
//! ```

use std::panic;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use fleetdeck_api::{ApiError, FleetApi, HttpFleetApi, ScriptedFleetApi, UnavailableFleetApi};
use fleetdeck_core::{Config, LogGuard, LogOptions, init_logging};
use fleetdeck_tui::{HeadlessOptions, ScreenId, SessionContext, SessionExit, TuiError};
use tracing::{error, info, warn};

/// fleetdeck operator console
///
/// Browse devices, spaces, incidents and tickets for a tenant, and run
/// remote device operations, from a terminal dashboard or as JSON snapshots.
#[derive(Parser, Debug)]
#[command(name = "fleetdeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.fleetdeck/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Config file (defaults to ~/.fleetdeck/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the terminal session, interactive or headless
    Tui(TuiArgs),

    /// List configured tenants
    Tenants,
}

#[derive(Args, Debug)]
struct TuiArgs {
    /// Write JSON snapshots to stdout instead of drawing the dashboard
    #[arg(long)]
    headless: bool,

    /// Screen to open: dashboard, devices, spaces, incidents, tickets
    #[arg(long, default_value = "dashboard")]
    screen: ScreenId,

    /// Headless output format
    #[arg(long, default_value = "json")]
    format: String,

    /// Keep emitting snapshots until interrupted (headless only)
    #[arg(long)]
    follow: bool,

    /// Interval between follow snapshots in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Stop after this many snapshots in follow mode
    #[arg(long)]
    max_frames: Option<u64>,

    /// Tenant to use (defaults to the configured default tenant)
    #[arg(long)]
    tenant: Option<String>,

    /// Disable animations
    #[arg(long)]
    no_motion: bool,

    /// Record every input, dispatch, refresh and render event in the log
    #[arg(long)]
    debug: bool,

    /// Use built-in sample data instead of the fleet API
    #[arg(long)]
    demo: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    install_panic_hook();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = match cli.command {
        Command::Tui(ref args) => runtime.block_on(run_tui(&cli, args)),
        Command::Tenants => list_tenants(&cli),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fleetdeck error: {}", e);
            report_error(&e);
            ExitCode::from(e.exit_code())
        }
    }
}

/// Restore the terminal before the default hook prints the panic message.
/// Panics inside a containment scope are only logged; the session reports
/// them itself and keeps the screen.
fn install_panic_hook() {
    let original_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        if fleetdeck_tui::panics::is_contained() {
            error!(panic = %panic_info, "Contained panic");
            return;
        }
        fleetdeck_tui::restore_terminal();
        original_hook(panic_info);
    }));
}

/// Set up logging based on CLI arguments.
///
/// The terminal session paints stdout and headless mode writes frames to it,
/// so console logging is only enabled for the other commands.
fn setup_logging(cli: &Cli) -> fleetdeck_core::Result<LogGuard> {
    let (console, debug_events) = match &cli.command {
        Command::Tui(args) => (false, args.debug),
        Command::Tenants => (true, false),
    };
    init_logging(LogOptions {
        log_dir: cli.log_dir.clone(),
        verbose: cli.verbose > 0,
        debug_events,
        console,
    })
}

fn report_error(err: &TuiError) {
    match err {
        TuiError::ErrorStorm { message, count } => {
            eprintln!("fleetdeck stopped: the same error repeated {count} times.");
            eprintln!("  {message}");
            eprintln!("See the log in ~/.fleetdeck/logs/ (run with --debug for the event trail).");
        }
        TuiError::Core(core) => {
            eprintln!("Error: {core}");
            if let Some(hint) = core.guidance() {
                eprintln!("  {hint}");
            }
        }
        other => eprintln!("Error: {other}"),
    }
}

async fn run_tui(cli: &Cli, args: &TuiArgs) -> fleetdeck_tui::Result<()> {
    if args.headless && args.format != "json" {
        return Err(TuiError::UnsupportedFormat(args.format.clone()));
    }

    let config = Config::load_or_default(cli.config.as_deref())?;
    let (api, tenant_id) = build_api(&config, args)?;
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.tui.follow_interval_ms));
    let ctx = SessionContext::new(api, tenant_id, config.tui.clone()).with_reduced_motion(args.no_motion);

    info!(
        headless = args.headless,
        screen = %args.screen,
        tenant = %ctx.tenant_key(),
        client = ctx.api.name(),
        "Starting fleetdeck session"
    );

    if args.headless {
        let options = HeadlessOptions {
            screen: args.screen,
            follow: args.follow,
            interval,
            max_frames: args.max_frames,
        };
        let summary = fleetdeck_tui::run_headless(ctx, options, std::io::stdout()).await?;
        info!(frames = summary.frames, state = %summary.last_state, "Headless run complete");
        return Ok(());
    }

    let exit = fleetdeck_tui::run_interactive(ctx, args.screen).await?;
    if exit == SessionExit::Interrupted {
        info!("Session interrupted");
    }
    exit.into_result()
}

/// Pick the API client. A tenant that cannot be reached still gets a
/// session; it just starts degraded.
fn build_api(
    config: &Config,
    args: &TuiArgs,
) -> fleetdeck_tui::Result<(Arc<dyn FleetApi>, Option<String>)> {
    if args.demo {
        let tenant = args.tenant.clone().unwrap_or_else(|| "demo".to_string());
        return Ok((Arc::new(ScriptedFleetApi::demo()), Some(tenant)));
    }

    match config.resolve_tenant(args.tenant.as_deref())? {
        Some((id, tenant)) => match HttpFleetApi::from_tenant(&id, &tenant) {
            Ok(api) => Ok((Arc::new(api), Some(id))),
            Err(err) => {
                warn!(tenant = %id, error = %err, "API client unavailable, starting degraded");
                Ok((Arc::new(UnavailableFleetApi::new(err)), Some(id)))
            }
        },
        None => {
            warn!("No tenant configured, starting degraded");
            let err = ApiError::Other(
                "No tenant configured; add one to config.yaml or pass --demo".to_string(),
            );
            Ok((Arc::new(UnavailableFleetApi::new(err)), None))
        }
    }
}

fn list_tenants(cli: &Cli) -> fleetdeck_tui::Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    let default = config.resolve_tenant(None)?.map(|(id, _)| id);

    if config.tenants.is_empty() {
        println!("No tenants configured.");
        return Ok(());
    }
    for (id, tenant) in &config.tenants {
        let marker = if default.as_deref() == Some(id.as_str()) { "*" } else { " " };
        println!("{marker} {id:<16} {}  (key: ${})", tenant.base_url, tenant.api_key_env);
    }
    Ok(())
}

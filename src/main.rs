//! WLED Manager - scheduled backups and preset synchronization for WLED controllers.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::Parser;
use console::style;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use wledm::backup::{BackupReport, BackupService};
use wledm::cli::{Cli, Commands, CompletionsArgs, ConfigArgs, ServeArgs};
use wledm::config::{SettingsHub, load_settings};
use wledm::device::WledClient;
use wledm::error::{Result, WledError};
use wledm::health::HealthChecks;
use wledm::sync::{SyncReport, SyncService};
use wledm::{logging, server, service};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    logging::init_logging(cli.use_json(), cli.verbose, cli.quiet);

    if let Err(e) = run(&cli).await {
        output_error(&cli, &e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Serve(args) => cmd_serve(cli, args).await,
        Commands::Backup => cmd_backup(cli).await,
        Commands::Sync => cmd_sync(cli).await,
        Commands::Config(args) => cmd_config(cli, args),
        Commands::Version => {
            cmd_version(cli);
            Ok(())
        }
        Commands::Completions(args) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

async fn cmd_serve(cli: &Cli, args: &ServeArgs) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| WledError::WebServerFailed {
            addr: format!("{}:{}", args.bind, args.port),
            reason: e.to_string(),
        })?;
    let listener = server::bind(addr).await?;

    let cancel = CancellationToken::new();
    service::cancel_on_ctrl_c(cancel.clone());
    service::run(cli.config.clone(), listener, cancel).await
}

/// One-shot passes share the Ctrl-C handling of the daemon.
fn one_shot_cancel() -> CancellationToken {
    let cancel = CancellationToken::new();
    service::cancel_on_ctrl_c(cancel.clone());
    cancel
}

async fn cmd_backup(cli: &Cli) -> Result<()> {
    let hub = SettingsHub::new(load_settings(&cli.config)?);
    let backup = BackupService::new(WledClient::new()?, HealthChecks::new()?, hub.backup());

    let report = backup.run_backup_now(&one_shot_cancel()).await?;
    if cli.use_json() {
        output_json(cli, &report);
    } else {
        print_backup_report(&report);
    }
    Ok(())
}

async fn cmd_sync(cli: &Cli) -> Result<()> {
    let hub = SettingsHub::new(load_settings(&cli.config)?);
    let sync = SyncService::new(WledClient::new()?, hub.sync());

    let report = sync.run_sync_now(&one_shot_cancel()).await?;
    if cli.use_json() {
        output_json(cli, &report);
    } else {
        print_sync_report(&report);
    }
    Ok(())
}

fn cmd_config(cli: &Cli, args: &ConfigArgs) -> Result<()> {
    if args.path {
        if cli.use_json() {
            output_json(cli, &serde_json::json!({ "path": cli.config }));
        } else {
            println!("{}", cli.config.display());
        }
        return Ok(());
    }

    let settings = load_settings(&cli.config)?;
    if cli.use_json() {
        output_json(cli, &settings);
    } else {
        let text = toml::to_string_pretty(&settings)
            .map_err(|e| WledError::Other(format!("Failed to render settings: {e}")))?;
        println!("{} {}", style("#").dim(), style(cli.config.display()).dim());
        print!("{text}");
    }
    Ok(())
}

fn cmd_version(cli: &Cli) {
    if cli.use_json() {
        output_json(
            cli,
            &serde_json::json!({
                "version": build_info::VERSION,
                "git_sha": build_info::git_sha(),
                "git_dirty": build_info::git_dirty() == "true",
                "build_timestamp": build_info::build_timestamp(),
                "rustc_version": build_info::rustc_semver(),
                "target": build_info::target(),
            }),
        );
    } else {
        println!("wledm {}", build_info::VERSION);
        println!(
            "git: {}{}",
            build_info::git_sha(),
            if build_info::git_dirty() == "true" {
                " (dirty)"
            } else {
                ""
            }
        );
        println!("built: {}", build_info::build_timestamp());
        println!("rustc: {}", build_info::rustc_semver());
        println!("target: {}", build_info::target());
    }
}

fn cmd_completions(args: &CompletionsArgs) {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "wledm", &mut io::stdout());
}

// === Output ===

fn print_backup_report(report: &BackupReport) {
    for device in &report.devices {
        match (&device.error, &device.name) {
            (None, Some(name)) => println!("{} {} -> {name}", style("✓").green(), device.address),
            (None, None) => println!("{} {}", style("✓").green(), device.address),
            (Some(error), _) => println!("{} {}: {error}", style("✗").red(), device.address),
        }
    }
    println!(
        "{} backed up, {} failed",
        style(report.succeeded()).bold(),
        style(report.failed()).bold()
    );
}

fn print_sync_report(report: &SyncReport) {
    for rule in &report.rules {
        println!("{}", style(&rule.source).bold());
        if let Some(error) = &rule.error {
            println!("  {} {error}", style("✗").red());
            continue;
        }
        for target in &rule.targets {
            match &target.error {
                None => println!(
                    "  {} {} ({} LEDs)",
                    style("✓").green(),
                    target.address,
                    target.led_count
                ),
                Some(error) => println!("  {} {}: {error}", style("✗").red(), target.address),
            }
        }
    }
    println!(
        "{} synced, {} errors",
        style(report.synced_count()).bold(),
        style(report.error_count()).bold()
    );
}

fn output_json<T: Serialize>(cli: &Cli, data: &T) {
    let json = if cli.use_compact_json() {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{}: {e}", style("Error").red().bold()),
    }
}

fn output_error(cli: &Cli, error: &WledError) {
    if cli.use_json() {
        let json = serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        });
        eprintln!("{json:#}");
    } else {
        eprintln!("{}: {}", style("Error").red().bold(), error);
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {}", style("Hint").yellow(), suggestion);
        }
    }
}

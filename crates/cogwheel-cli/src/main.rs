//! `cogwheel-cli` – runs the demo robot on the cooperative scheduler.
//!
//! 1. Loads `~/.cogwheel/config.toml`, writing the defaults on first run.
//! 2. Initialises logging (and OTLP export when configured).
//! 3. Starts the autonomous routine and drives the scheduler at the
//!    configured period until Ctrl-C or `run_seconds` elapse.
//! 4. Stops every command, turns the motors off and prints tick statistics.

mod config;
mod robot;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use cogwheel_runtime::driver::run_periodic;
use cogwheel_runtime::{CycleStats, LogFormat, init_tracing};

fn main() {
    // Config first: it decides the log format.
    let (cfg, config_note) = load_config();
    let _guard = init_tracing("cogwheel", cfg.log_format);

    print_banner();
    println!("  {config_note}");

    let session = uuid::Uuid::new_v4();
    info!(
        %session,
        period_ms = cfg.period_ms,
        jitter_tolerance_ms = cfg.jitter_tolerance_ms,
        run_seconds = cfg.run_seconds,
        "session started"
    );

    // ── Shutdown flag + Ctrl-C ────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_ctrlc = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping robot …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use run_seconds to stop");
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "could not start tokio runtime");
            std::process::exit(1);
        }
    };

    let stats = runtime.block_on(async {
        let mut robot = robot::Robot::new(cfg.scheduler());
        if let Err(e) = robot.autonomous_init() {
            error!(error = %e, "autonomous start failed");
        }

        if cfg.run_seconds > 0 {
            let flag = Arc::clone(&shutdown);
            let limit = Duration::from_secs(cfg.run_seconds);
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                info!(seconds = limit.as_secs(), "run time elapsed");
                flag.store(true, Ordering::SeqCst);
            });
        }

        let stats = run_periodic(&mut robot.scheduler, Arc::clone(&shutdown)).await;
        robot.shutdown();
        stats
    });

    print_summary(&stats, cfg.log_format);
    println!("{}", "  ✓ Robot stopped.".green());
}

/// Load (or create) the config.  Returns it with a one-line note for the user.
fn load_config() -> (config::Config, String) {
    match config::load() {
        Ok(Some(cfg)) => {
            let note = format!(
                "Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            (cfg, note)
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            let note = match config::save(&cfg) {
                Ok(()) => format!(
                    "{} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => format!("{}: {}", "Error saving config".red(), e),
            };
            config::apply_env_overrides(&mut cfg);
            (cfg, note)
        }
        Err(e) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            (cfg, format!("{}: {} – using defaults", "Config error".red(), e))
        }
    }
}

fn print_summary(stats: &CycleStats, format: LogFormat) {
    if format == LogFormat::Json {
        match serde_json::to_string(stats) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "could not serialise stats"),
        }
        return;
    }
    println!();
    println!("  {}", "Tick statistics".bold());
    println!("    ticks     {}", stats.ticks);
    println!("    average   {:?}", stats.average());
    println!("    min       {:?}", stats.min.unwrap_or_default());
    println!("    max       {:?}", stats.max);
    let overruns = stats.overruns.to_string();
    if stats.overruns > 0 {
        println!("    overruns  {}", overruns.yellow());
    } else {
        println!("    overruns  {}", overruns.green());
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___ ___   __ _ __ __ __ / /  ___ ___ / /"#.bold().cyan());
    println!("{}", r#"  / __/ _ \ / _ `/ |/|/ // _ \/ -_) -_) / "#.bold().cyan());
    println!("{}", r#"  \__/\___/ \_, /|__,__//_//_/\__/\__/_/  "#.bold().cyan());
    println!("{}", r#"           /___/                          "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "cogwheel".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Cooperative command scheduler");
    println!();
}

// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! ipmi-fanctl: polls CPU temperatures over IPMI and drives the chassis
//! fans along an easing curve.

use anyhow::Context;
use clap::Parser;
use ipmi_fan_utility::config::{self, Config};
use ipmi_fan_utility::controller::FanController;
use ipmi_fan_utility::ipmitool::IpmiGateway;
use ipmi_fan_utility::poll_loop::{PollLoop, StopReason};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ipmi-fanctl", about = "IPMI chassis fan controller")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// BMC host name or address. Omit to use the local BMC.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// BMC user name.
    #[arg(short = 'U', long)]
    username: Option<String>,

    /// BMC password.
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Controller name; selects the state file. Defaults to the host.
    #[arg(short, long)]
    name: Option<String>,

    /// Directory for the state file.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Poll interval in seconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Number of samples to average.
    #[arg(long)]
    sample_size: Option<usize>,

    /// Temperature (C) at or below which fans get 0%.
    #[arg(long)]
    ideal_temp: Option<f64>,

    /// Temperature (C) at or above which fans get the maximum duty cycle.
    #[arg(long)]
    max_temp: Option<f64>,

    /// Upper bound on the duty cycle, in percent.
    #[arg(long)]
    max_duty_cycle: Option<u8>,

    /// Easing curve: linear or parabolic.
    #[arg(short, long)]
    easing: Option<String>,

    /// Compute fan speeds without sending them.
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many polls (0 = run until interrupted).
    #[arg(long)]
    count: Option<u64>,

    /// Poll once and exit.
    #[arg(long, conflicts_with = "count")]
    one: bool,

    /// Return fan control to the BMC and exit.
    #[arg(long)]
    dynamic: bool,

    /// Forget cached sensor identities and discover again.
    #[arg(long)]
    rediscover: bool,

    /// Write the effective settings back to the config file and exit.
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    /// Command-line values take precedence over the config file.
    fn apply(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.ipmi.host = Some(host.clone());
        }
        if let Some(user) = &self.username {
            cfg.ipmi.username = Some(user.clone());
        }
        if let Some(pw) = &self.password {
            cfg.ipmi.password = Some(pw.clone());
        }
        if let Some(name) = &self.name {
            cfg.controller.name = Some(name.clone());
        }
        if let Some(dir) = &self.state_dir {
            cfg.controller.state_dir = Some(dir.clone());
        }
        if let Some(secs) = self.interval {
            cfg.control.poll_interval_secs = secs;
        }
        if let Some(n) = self.sample_size {
            cfg.control.sample_size = n;
        }
        if let Some(t) = self.ideal_temp {
            cfg.control.ideal_temp = t;
        }
        if let Some(t) = self.max_temp {
            cfg.control.max_temp = t;
        }
        if let Some(d) = self.max_duty_cycle {
            cfg.control.max_duty_cycle = d;
        }
        if let Some(e) = &self.easing {
            cfg.control.easing = e.clone();
        }
        if self.dry_run {
            cfg.control.dry_run = true;
        }
        if let Some(n) = self.count {
            cfg.control.max_iterations = n;
        }
        if self.one {
            cfg.control.max_iterations = 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(Some(&cli.config));
    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("Could not load config from {}", config_path.display()))?;
    cli.apply(&mut cfg);

    if cli.save_config {
        config::save_config(&config_path, &cfg)
            .with_context(|| format!("Could not write {}", config_path.display()))?;
        return Ok(());
    }

    let gateway = IpmiGateway::new(&cfg.ipmi);
    let controller = FanController::new(gateway, &cfg).context("Invalid configuration")?;

    if cli.dynamic {
        controller
            .restore_dynamic()
            .context("Failed to enable dynamic fan control")?;
        return Ok(());
    }

    log::info!(
        "Controller '{}': {} curve {}-{}C, up to {}%, {} sample(s) every {}s{}",
        cfg.identity(),
        controller.curve().easing,
        controller.curve().ideal_temp,
        controller.curve().max_temp,
        controller.curve().max_duty_cycle,
        cfg.control.sample_size,
        cfg.control.poll_interval_secs,
        if controller.is_dry_run() { " (dry run)" } else { "" },
    );

    let mut state = controller.load_state().context("Could not load controller state")?;
    log::info!("Using state file {}", controller.state_path().display());
    if cli.rediscover {
        log::info!("Discarding cached sensor identities");
        state.sensors = None;
    }

    // Register handlers up front; the loop only yields while sleeping.
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("Received shutdown signal");
        shutdown_signal.notify_one();
    });

    let restore_on_exit = cfg.control.restore_on_exit;
    let poll_loop = PollLoop::new(
        controller,
        cfg.control.poll_interval(),
        cfg.control.max_iterations,
    );

    let stop = poll_loop.run(&mut state, &shutdown).await;

    if matches!(stop, Ok(StopReason::Shutdown(_)))
        && restore_on_exit
        && !poll_loop.controller().is_dry_run()
    {
        if let Err(e) = poll_loop.controller().restore_dynamic() {
            log::error!("Failed to restore dynamic fan control: {e}");
        }
    }

    stop.context("Poll loop stopped")?;
    Ok(())
}

//! knobd CLI - bridges the hardware controller to the UI service.
//!
//! This is the main binary entry point. See the `knobd` library for the
//! core functionality.

use anyhow::Result;
use clap::Parser;
use knobd::{Bridge, Config};
use mimalloc::MiMalloc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

/// Bridge a hardware volume/button controller to the UI service.
#[derive(Parser, Debug)]
#[command(name = "knobd", version, about)]
struct Cli {
    /// UI service URL (overrides config file and KNOBD_SERVER_URL).
    #[arg(long)]
    server_url: Option<String>,

    /// I2C bus number the controller is attached to.
    #[arg(long)]
    bus: Option<u32>,

    /// Controller device address (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_addr)]
    address: Option<u16>,

    /// Bus poll interval in milliseconds.
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Write the effective configuration to the config file and exit.
    #[arg(long)]
    save_config: bool,
}

fn parse_addr(value: &str) -> Result<u16, String> {
    knobd::config::parse_device_addr(value).map_err(|e| e.to_string())
}

/// Overlay CLI flags onto the loaded configuration.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(server_url) = &cli.server_url {
        config.server_url = server_url.clone();
    }
    if let Some(bus) = cli.bus {
        config.i2c_bus = bus;
    }
    if let Some(address) = cli.address {
        config.device_addr = address;
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }
}

#[cfg(target_os = "linux")]
fn open_bus(config: &Config) -> Result<Box<dyn knobd::VolumeBus + Send>> {
    let bus = knobd::bus::I2cBus::open(&config.bus_path(), config.device_addr)?;
    Ok(Box::new(bus))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(_config: &Config) -> Result<Box<dyn knobd::VolumeBus + Send>> {
    anyhow::bail!("the I2C bus backend requires Linux (/dev/i2c-*)")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    apply_cli_overrides(&mut config, &cli);

    if cli.save_config {
        config.save()?;
        println!("Configuration written to {}", Config::config_dir()?.display());
        return Ok(());
    }

    // Set up signal handlers
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;

    log::info!(
        "knobd v{} starting (service {}, device {:#04x} on {})",
        env!("CARGO_PKG_VERSION"),
        config.server_url,
        config.device_addr,
        config.bus_path()
    );

    let bus = open_bus(&config)?;
    let mut bridge = Bridge::new(config, bus);
    bridge.run(&SHUTDOWN_FLAG).await;

    Ok(())
}

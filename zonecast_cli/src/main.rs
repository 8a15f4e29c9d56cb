//! ZoneCast bridge daemon.
//!
//! Starts the two acceptor threads behind `zonecast_core::AudioBridge` and
//! opens a single output and input stream on zone 0 (the default-slot
//! behavior of `num_concurrent_users == 0`), keeping them open until the
//! process receives SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zonecast_core::{AudioBridge, BridgeConfig};

#[derive(Debug, Parser)]
#[command(name = "zonecast", about = "TCP-bridged virtual audio HAL daemon")]
struct Args {
    /// Path to a JSON bridge config file; falls back to compiled-in
    /// defaults overlaid with ZONECAST_* environment variables.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Bus address used for the zone 0 output/input streams this daemon
    /// keeps open for its lifetime.
    #[arg(long, default_value = "_audio_zone_0")]
    bus_address: String,
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signum: libc_shim::c_int) {
    SHUTDOWN.store(true, Ordering::Release);
}

/// Minimal `c_int` alias so the signal handler doesn't need a `libc`
/// dependency of its own; `nix::sys::signal` re-exports the same width.
mod libc_shim {
    pub type c_int = std::os::raw::c_int;
}

fn install_interrupt_handler() {
    use nix::sys::signal::{signal, SigHandler, Signal};
    unsafe {
        let handler = SigHandler::Handler(on_interrupt);
        if let Err(e) = signal(Signal::SIGINT, handler) {
            warn!("failed to install SIGINT handler: {e}");
        }
        if let Err(e) = signal(Signal::SIGTERM, handler) {
            warn!("failed to install SIGTERM handler: {e}");
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = BridgeConfig::load(args.config.as_deref());
    info!(?config, "starting zonecast bridge");

    install_interrupt_handler();

    let bridge = AudioBridge::new(config)?;
    let output = bridge.open_output_stream(&args.bus_address, 48000, 0b11, None)?;
    let input = bridge.open_input_stream(&args.bus_address, 48000, 0b11, None)?;

    while !SHUTDOWN.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutdown signal received, closing streams");
    bridge.close_output_stream(output);
    bridge.close_input_stream(input);
    drop(bridge);

    Ok(())
}

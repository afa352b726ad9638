//! MAME Lamp Bridge CLI
//!
//! Command-line front end for the mame-lamp-core library. It adds:
//! - Configuration from a TOML file and command-line flags
//! - Serial port discovery for the lamp controller
//! - Ctrl+C handling for a clean shutdown
//!
//! Setup: set `output network` in mame.ini, describe the lamps in
//! output_map.json, start a game and run this tool.

use anyhow::{Context, Result};
use clap::Parser;
use mame_lamp_core::{
    Bridge, CancellationToken, MappingCatalog, OutputSink, TcpConnector, WriteSink,
};
use std::path::PathBuf;

mod config;
mod serial;

use config::{AppConfig, Overrides};

/// MAME Lamp Bridge - Drive cabinet lamps from MAME network output
#[derive(Parser, Debug)]
#[command(name = "mame-lamp")]
#[command(about = "Forward MAME network output to a serial lamp controller", long_about = None)]
#[command(version)]
struct Args {
    /// Host running MAME (default: localhost)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// MAME output server port (default: 8000)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Path to the lamp mapping catalog (default: output_map.json)
    #[arg(short, long, value_name = "FILE")]
    map: Option<PathBuf>,

    /// Serial port of the lamp controller (default: first available port)
    #[arg(short, long, value_name = "PORT")]
    serial: Option<String>,

    /// Serial baud rate (default: 115200)
    #[arg(short, long, value_name = "BAUD")]
    baud: Option<u32>,

    /// Don't open a serial port; only log the lamp state
    #[arg(long)]
    dry_run: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delay between connection attempts in milliseconds
    #[arg(long, value_name = "MS")]
    retry_delay_ms: Option<u64>,

    /// Give up after this many connection attempts (default: retry forever)
    #[arg(long, value_name = "COUNT")]
    max_attempts: Option<u32>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            map: self.map.clone(),
            serial_port: self.serial.clone(),
            baud_rate: self.baud,
            retry_delay_ms: self.retry_delay_ms,
            max_attempts: self.max_attempts,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("MAME Lamp Bridge v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using bridge library v{}", mame_lamp_core::VERSION);

    if args.list_ports {
        for port in serial::list_ports()? {
            println!("{}", port);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    config.apply(args.overrides());

    run(&config, args.dry_run)
}

fn run(config: &AppConfig, dry_run: bool) -> Result<()> {
    let catalog = MappingCatalog::load(&config.mapping.file)
        .with_context(|| format!("Failed to load mapping catalog: {:?}", config.mapping.file))?;

    let sink: Box<dyn OutputSink> = if dry_run {
        log::info!("Dry run: lamp bytes are not sent anywhere");
        Box::new(WriteSink::new(std::io::sink()))
    } else {
        Box::new(serial::open_configured(&config.serial)?)
    };

    let cancel = CancellationToken::new();
    ctrlc::set_handler({
        let cancel = cancel.clone();
        move || {
            log::warn!("Closing app");
            cancel.cancel();
        }
    })
    .context("Failed to install Ctrl+C handler")?;

    let bridge_config = &config.bridge;
    let connector = TcpConnector::new(bridge_config.address(), bridge_config.poll_interval());
    let mut bridge = Bridge::new(bridge_config, &catalog, connector, sink, cancel);

    // Stream and serial port are released when `bridge` drops, on every path
    let stats = bridge.run()?;

    log::info!(
        "Processed {} chunks ({} records) since {}; final lamps {}",
        stats.chunks,
        stats.records,
        stats.started_at.format("%Y-%m-%d %H:%M:%S"),
        bridge.machine().register()
    );
    if stats.sink_failures > 0 {
        log::warn!("{} lamp frames could not be delivered", stats.sink_failures);
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

//! `serial_line` command-line tool.
//!
//! # Usage
//!
//! ```bash
//! serial_line ports --json
//! serial_line send /dev/ttyUSB0 "AT" --line --timeout-ms 500
//! serial_line listen /dev/ttyUSB0 --duration-ms 10000 --hex
//! serial_line config init
//! ```

use clap::{Parser, Subcommand};
use serde_json::json;
use serial_line::config::{get_default_config_path, Config, ConfigLoader, LineConfig};
use serial_line::{logging, Handshake, SerialLine, SerialportConnector, TransferError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long one listen read waits before re-checking the deadline.
const LISTEN_SLICE_MS: i64 = 100;

#[derive(Parser, Debug)]
#[command(
    name = "serial_line",
    version,
    about = "Send and receive over a serial line with flow control and timeouts."
)]
struct Cli {
    /// Configuration file (overrides the standard search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports present on this machine
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write text to a port
    Send {
        port: String,
        text: String,
        /// Append the configured new-line string
        #[arg(long)]
        line: bool,
        #[arg(long)]
        handshake: Option<Handshake>,
        #[arg(long)]
        encoding: Option<String>,
        /// Write timeout in milliseconds (-1 = infinite)
        #[arg(long, allow_hyphen_values = true)]
        timeout_ms: Option<i64>,
    },
    /// Print whatever arrives on a port
    Listen {
        port: String,
        #[arg(long, default_value_t = 5000)]
        duration_ms: u64,
        /// Print bytes as hex instead of decoded text
        #[arg(long)]
        hex: bool,
    },
    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write a default configuration file
    Init {
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loader = match cli.config {
        Some(ref path) => ConfigLoader::load_from(path)?,
        None => match ConfigLoader::load() {
            Ok(loader) => loader,
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                ConfigLoader::with_defaults()
            }
        },
    };
    logging::init(&loader.config().logging)?;
    debug!(path = ?loader.config_path, "configuration loaded");

    match cli.command {
        Command::Ports { json } => list_ports(json),
        Command::Send {
            port,
            text,
            line,
            handshake,
            encoding,
            timeout_ms,
        } => {
            let mut config = loader.config().line.clone();
            config.port_name = port;
            if let Some(handshake) = handshake {
                config.handshake = handshake;
            }
            if let Some(encoding) = encoding {
                config.encoding = encoding;
            }
            if let Some(ms) = timeout_ms {
                config.write_timeout_ms = ms;
            }
            send(&config, &text, line)
        }
        Command::Listen {
            port,
            duration_ms,
            hex,
        } => {
            let mut config = loader.config().line.clone();
            config.port_name = port;
            listen(&config, Duration::from_millis(duration_ms), hex)
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(loader.config())?);
                Ok(())
            }
            ConfigAction::Init { path, force } => init_config(path, force),
        },
    }
}

fn list_ports(as_json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ports = serialport::available_ports()?;
    if as_json {
        let port_info: Vec<_> = ports
            .iter()
            .map(|p| {
                let (kind, product) = match p.port_type {
                    serialport::SerialPortType::UsbPort(ref usb) => ("usb", usb.product.clone()),
                    serialport::SerialPortType::PciPort => ("pci", None),
                    serialport::SerialPortType::BluetoothPort => ("bluetooth", None),
                    serialport::SerialPortType::Unknown => ("unknown", None),
                };
                json!({ "port_name": p.port_name, "type": kind, "product": product })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "ports": port_info }))?);
    } else if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        for p in ports {
            println!("{}", p.port_name);
        }
    }
    Ok(())
}

fn open_line(config: &LineConfig) -> Result<SerialLine, Box<dyn std::error::Error>> {
    config.validate()?;
    let line = SerialLine::from_config(config, Arc::new(SerialportConnector))?;
    line.open()?;
    Ok(line)
}

fn send(config: &LineConfig, text: &str, as_line: bool) -> Result<(), Box<dyn std::error::Error>> {
    let line = open_line(config)?;
    if as_line {
        line.write_line(text)?;
    } else {
        line.write_str(text)?;
    }
    line.flush()?;
    let metrics = line.metrics()?;
    line.close()?;
    println!("Sent {} bytes to {}", metrics.bytes_sent, config.port_name);
    Ok(())
}

fn listen(config: &LineConfig, duration: Duration, hex: bool) -> Result<(), Box<dyn std::error::Error>> {
    let line = open_line(config)?;
    line.set_read_timeout(LISTEN_SLICE_MS)?;

    let started = Instant::now();
    let mut buf = [0u8; 256];
    let len = buf.len();
    let mut stdout = std::io::stdout().lock();
    while started.elapsed() < duration {
        let received = if hex {
            line.read_at(&mut buf, 0, len).map(|n| {
                let rendered: Vec<String> = buf[..n].iter().map(|b| format!("{b:02X}")).collect();
                rendered.join(" ") + "\n"
            })
        } else {
            line.read_string(len)
        };
        match received {
            Ok(text) => write!(stdout, "{text}")?,
            Err(e) if e.is_timeout() => continue,
            Err(TransferError::Overrun { buffered, capacity }) => {
                warn!(buffered, capacity, "receive buffer overrun");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        stdout.flush()?;
    }

    line.close()?;
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = path
        .or_else(get_default_config_path)
        .ok_or("no configuration directory available; pass a path")?;
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    let loader = ConfigLoader {
        config_path: Some(path.clone()),
        config: Config::default(),
    };
    loader.save()?;
    println!("Wrote {}", path.display());
    Ok(())
}

//! Configuration for serial lines and logging.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SERIAL_LINE_CONFIG` environment variable (explicit path)
//! 2. `./serial_line.toml` (current directory)
//! 3. The platform config directory (`~/.config/serial-line/serial_line.toml`
//!    on Linux, `%APPDATA%\serial-line\config\serial_line.toml` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `SERIAL_LINE_<SECTION>_<KEY>`
//!
//! Examples:
//! - `SERIAL_LINE_LINE_PORT_NAME=/dev/ttyUSB0`
//! - `SERIAL_LINE_LINE_HANDSHAKE=request_to_send`
//! - `SERIAL_LINE_LINE_READ_TIMEOUT_MS=500`
//! - `SERIAL_LINE_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use serial_line::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Port: {}", config.line.port_name);
//! println!("Baud: {}", config.line.baud_rate);
//! # Ok::<(), serial_line::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigKey, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LineConfig, LogFormat, LoggingConfig};

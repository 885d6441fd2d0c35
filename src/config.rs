//! Bench configuration management.
//!
//! The bench settings name the two instrument endpoints. They are loaded
//! from a TOML file, e.g. `config/bench.toml`:
//!
//! ```toml
//! log_level = "info"
//!
//! [bench.vsa]
//! address = "192.168.200.10"
//! port = 5025
//!
//! [bench.vsg]
//! address = "192.168.200.20"
//! ```
//!
//! `port` defaults to the SCPI raw-socket port when omitted.

use crate::error::{BenchError, BenchResult};
use crate::validation;
use config::Config;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Default SCPI raw-socket port.
pub const SCPI_PORT: u16 = 5025;

/// Network location of one instrument. Immutable after load.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub address: String,
    /// TCP port, SCPI raw socket by default.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

fn default_port() -> u16 {
    SCPI_PORT
}

/// Endpoints of the two bench instruments.
#[derive(Debug, Deserialize, Clone)]
pub struct BenchSettings {
    /// Vector signal analyzer endpoint.
    pub vsa: Endpoint,
    /// Vector signal generator endpoint.
    pub vsg: Endpoint,
}

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Instrument endpoints.
    pub bench: BenchSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Loads and validates settings from a TOML file.
    pub fn from_path(path: &Path) -> BenchResult<Self> {
        let s = Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(BenchError::Config)?;
        let settings: Settings = s.try_deserialize().map_err(BenchError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> BenchResult<()> {
        for (role, endpoint) in [("vsa", &self.bench.vsa), ("vsg", &self.bench.vsg)] {
            validation::is_not_empty(&endpoint.address)
                .map_err(|e| BenchError::Configuration(format!("{role} address: {e}")))?;
            validation::is_valid_port(endpoint.port)
                .map_err(|e| BenchError::Configuration(format!("{role} port: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_endpoints_with_default_port() {
        let file = write_settings(
            "[bench.vsa]\naddress = \"192.168.200.10\"\n\n[bench.vsg]\naddress = \"192.168.200.20\"\nport = 5026\n",
        );
        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.bench.vsa.port, SCPI_PORT);
        assert_eq!(settings.bench.vsg.port, 5026);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn rejects_empty_address() {
        let file = write_settings(
            "[bench.vsa]\naddress = \"\"\n\n[bench.vsg]\naddress = \"192.168.200.20\"\n",
        );
        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, BenchError::Configuration(_)));
    }
}

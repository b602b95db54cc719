//! Configuration for device access and deploys
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, `.json` or `.json5`)
//! 3. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::protocol::frame::MAX_PAYLOAD;
use crate::transport::Route;

/// Files never copied to a device
pub const DEFAULT_DO_NOT_DEPLOY: &[&str] =
	&["System.Threading.Tasks.Extensions.dll", "System.Threading.Tasks.Extensions.pdb", ".DS_Store"];

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Configuration for one device session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// TRANSPORT
	// ========================================================================
	/// Device route (`tcp://host:port`, `serial://<port>` or a bare port name)
	pub route: Option<String>,

	/// Serial baud rate
	pub baud_rate: u32,

	/// Time allowed to open the transport
	pub connect_timeout_ms: u64,

	// ========================================================================
	// PROTOCOL
	// ========================================================================
	/// Wait for each expected device frame of a short exchange
	pub request_timeout_ms: u64,

	/// Wait for each frame of a file listing
	pub file_list_timeout_ms: u64,

	/// Wait for the device to commit a written file
	pub write_timeout_ms: u64,

	/// Wait for a bulk flash erase to finish
	pub erase_timeout_ms: u64,

	/// Bytes per file data frame
	pub chunk_size: usize,

	/// Folder on the device that holds application files
	pub device_root: String,

	// ========================================================================
	// DEPLOY
	// ========================================================================
	/// Pause between upload attempts of one file
	pub retry_delay_ms: u64,

	/// Give up on a file after this many attempts; unbounded when unset
	pub max_upload_attempts: Option<u32>,

	/// File names (glob patterns allowed) never copied to the device
	pub do_not_deploy: Vec<String>,

	/// Deploy `.pdb` debug symbols
	pub include_pdbs: bool,

	/// Prefer post-link (trimmed) build output when it exists
	pub prefer_postlink: bool,

	// ========================================================================
	// OUTPUT & LOGGING
	// ========================================================================
	/// Default log filter when `RUST_LOG` is unset
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			// Transport
			route: None,
			baud_rate: 115_200,
			connect_timeout_ms: 5_000,

			// Protocol
			request_timeout_ms: 5_000,
			file_list_timeout_ms: 30_000,
			write_timeout_ms: 60_000,
			erase_timeout_ms: 200_000,
			chunk_size: 4096,
			device_root: "/meadow0/".to_string(),

			// Deploy
			retry_delay_ms: 100,
			max_upload_attempts: None,
			do_not_deploy: DEFAULT_DO_NOT_DEPLOY.iter().map(|s| s.to_string()).collect(),
			include_pdbs: false,
			prefer_postlink: false,

			// Output
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Load a config file; the extension selects the format
	pub fn load(path: &Path) -> Result<Config, ConfigError> {
		let text = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
		let parse_error =
			|message: String| ConfigError::Parse { path: path.to_path_buf(), message };

		let config: Config = match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
			Some("json") | Some("json5") => {
				json5::from_str(&text).map_err(|e| parse_error(e.to_string()))?
			}
			other => {
				return Err(parse_error(format!(
					"unsupported config format {:?} (expected toml, json or json5)",
					other.unwrap_or("")
				)))
			}
		};
		config.validate()?;
		Ok(config)
	}

	/// Reject values the protocol or engine cannot work with
	pub fn validate(&self) -> Result<(), ConfigError> {
		let timeouts = [
			("connectTimeoutMs", self.connect_timeout_ms),
			("requestTimeoutMs", self.request_timeout_ms),
			("fileListTimeoutMs", self.file_list_timeout_ms),
			("writeTimeoutMs", self.write_timeout_ms),
			("eraseTimeoutMs", self.erase_timeout_ms),
		];
		for (field, value) in timeouts {
			if value == 0 {
				return Err(ConfigError::Invalid { field, message: "must be positive".to_string() });
			}
		}

		if self.chunk_size == 0 || self.chunk_size > MAX_PAYLOAD {
			return Err(ConfigError::Invalid {
				field: "chunkSize",
				message: format!("{} is outside 1..={}", self.chunk_size, MAX_PAYLOAD),
			});
		}
		if self.baud_rate == 0 {
			return Err(ConfigError::Invalid {
				field: "baudRate",
				message: "must be positive".to_string(),
			});
		}
		if self.max_upload_attempts == Some(0) {
			return Err(ConfigError::Invalid {
				field: "maxUploadAttempts",
				message: "must allow at least one attempt".to_string(),
			});
		}
		if self.device_root.is_empty() {
			return Err(ConfigError::Invalid {
				field: "deviceRoot",
				message: "must not be empty".to_string(),
			});
		}
		for pattern in &self.do_not_deploy {
			globset::Glob::new(pattern).map_err(|e| ConfigError::Invalid {
				field: "doNotDeploy",
				message: format!("{}: {}", pattern, e),
			})?;
		}
		if let Some(route) = &self.route {
			route
				.parse::<Route>()
				.map_err(|message| ConfigError::Invalid { field: "route", message })?;
		}
		Ok(())
	}

	/// Parsed route, if one is configured
	pub fn route(&self) -> Result<Option<Route>, ConfigError> {
		match &self.route {
			Some(route) => route
				.parse()
				.map(Some)
				.map_err(|message| ConfigError::Invalid { field: "route", message }),
			None => Ok(None),
		}
	}

	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_millis(self.request_timeout_ms)
	}

	pub fn file_list_timeout(&self) -> Duration {
		Duration::from_millis(self.file_list_timeout_ms)
	}

	pub fn write_timeout(&self) -> Duration {
		Duration::from_millis(self.write_timeout_ms)
	}

	pub fn erase_timeout(&self) -> Duration {
		Duration::from_millis(self.erase_timeout_ms)
	}

	pub fn retry_delay(&self) -> Duration {
		Duration::from_millis(self.retry_delay_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_defaults() {
		let config = Config::default();
		assert_eq!(config.baud_rate, 115_200);
		assert_eq!(config.chunk_size, 4096);
		assert_eq!(config.device_root, "/meadow0/");
		assert_eq!(config.retry_delay(), Duration::from_millis(100));
		assert_eq!(config.max_upload_attempts, None);
		assert!(config.do_not_deploy.iter().any(|p| p == ".DS_Store"));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_load_toml() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("hcomsync.toml");
		std::fs::write(
			&path,
			"route = \"tcp://127.0.0.1:5000\"\nchunkSize = 2048\nmaxUploadAttempts = 5\n",
		)
		.unwrap();

		let config = Config::load(&path).unwrap();
		assert_eq!(config.chunk_size, 2048);
		assert_eq!(config.max_upload_attempts, Some(5));
		assert_eq!(config.route().unwrap(), Some(Route::Tcp { addr: "127.0.0.1:5000".to_string() }));
		// Unset fields keep their defaults
		assert_eq!(config.baud_rate, 115_200);
	}

	#[test]
	fn test_load_json5_with_comments() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("hcomsync.json5");
		std::fs::write(
			&path,
			r#"{
				// serial device on Linux
				route: "/dev/ttyACM0",
				includePdbs: true,
				doNotDeploy: ["*.xml", ".DS_Store"],
			}"#,
		)
		.unwrap();

		let config = Config::load(&path).unwrap();
		assert!(config.include_pdbs);
		assert_eq!(config.do_not_deploy, vec!["*.xml".to_string(), ".DS_Store".to_string()]);
		assert_eq!(config.route().unwrap(), Some(Route::Serial { port: "/dev/ttyACM0".to_string() }));
	}

	#[test]
	fn test_load_rejects_unknown_format() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("hcomsync.yaml");
		std::fs::write(&path, "route: x").unwrap();
		assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
	}

	#[test]
	fn test_load_missing_file() {
		let dir = TempDir::new().unwrap();
		assert!(matches!(
			Config::load(&dir.path().join("absent.toml")),
			Err(ConfigError::Read { .. })
		));
	}

	#[test]
	fn test_validate_rejects_bad_values() {
		let config = Config { chunk_size: 0, ..Config::default() };
		assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "chunkSize", .. })));

		let config = Config { chunk_size: MAX_PAYLOAD + 1, ..Config::default() };
		assert!(config.validate().is_err());

		let config = Config { request_timeout_ms: 0, ..Config::default() };
		assert!(matches!(
			config.validate(),
			Err(ConfigError::Invalid { field: "requestTimeoutMs", .. })
		));

		let config = Config { max_upload_attempts: Some(0), ..Config::default() };
		assert!(config.validate().is_err());

		let config = Config { do_not_deploy: vec!["[unclosed".to_string()], ..Config::default() };
		assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "doNotDeploy", .. })));

		let config = Config { route: Some("tcp://nohost".to_string()), ..Config::default() };
		assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "route", .. })));
	}
}

// vim: ts=4

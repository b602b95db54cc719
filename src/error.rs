//! Error types for deploy operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::protocol::HcomError;

/// Main error type for deploy/sync operations
#[derive(Debug)]
pub enum DeployError {
	/// Protocol failure outside a more specific step
	Hcom(HcomError),

	/// Device file listing failed
	Listing(HcomError),

	/// Deleting a device file failed
	Delete { file: String, source: HcomError },

	/// Connection lost while uploading a file
	Upload { file: String, source: HcomError },

	/// Reading or changing the runtime state failed
	Runtime { action: &'static str, source: HcomError },

	/// Scanning a local directory failed
	Scan { path: PathBuf, source: io::Error },

	/// Invalid configuration
	Config(ConfigError),

	/// Operation cancelled through its cancellation token
	Cancelled,

	/// I/O error
	Io(io::Error),
}

impl DeployError {
	/// Protocol error underneath, if any
	pub fn hcom(&self) -> Option<&HcomError> {
		match self {
			DeployError::Hcom(e) | DeployError::Listing(e) => Some(e),
			DeployError::Delete { source, .. }
			| DeployError::Upload { source, .. }
			| DeployError::Runtime { source, .. } => Some(source),
			_ => None,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, DeployError::Cancelled)
			|| matches!(self.hcom(), Some(HcomError::Cancelled))
	}
}

impl fmt::Display for DeployError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeployError::Hcom(e) => write!(f, "{}", e),
			DeployError::Listing(e) => write!(f, "Failed to list device files: {}", e),
			DeployError::Delete { file, source } => {
				write!(f, "Failed to delete {} from device: {}", file, source)
			}
			DeployError::Upload { file, source } => {
				write!(f, "Failed to upload {}: {}", file, source)
			}
			DeployError::Runtime { action, source } => {
				write!(f, "Failed to {} runtime: {}", action, source)
			}
			DeployError::Scan { path, source } => {
				write!(f, "Failed to scan {}: {}", path.display(), source)
			}
			DeployError::Config(e) => write!(f, "{}", e),
			DeployError::Cancelled => write!(f, "Deploy cancelled"),
			DeployError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for DeployError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			DeployError::Hcom(e) | DeployError::Listing(e) => Some(e),
			DeployError::Delete { source, .. }
			| DeployError::Upload { source, .. }
			| DeployError::Runtime { source, .. } => Some(source),
			DeployError::Scan { source, .. } => Some(source),
			DeployError::Config(e) => Some(e),
			DeployError::Io(e) => Some(e),
			DeployError::Cancelled => None,
		}
	}
}

impl From<HcomError> for DeployError {
	fn from(e: HcomError) -> Self {
		match e {
			HcomError::Cancelled => DeployError::Cancelled,
			other => DeployError::Hcom(other),
		}
	}
}

impl From<io::Error> for DeployError {
	fn from(e: io::Error) -> Self {
		DeployError::Io(e)
	}
}

impl From<ConfigError> for DeployError {
	fn from(e: ConfigError) -> Self {
		DeployError::Config(e)
	}
}

/// Configuration loading and validation errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: PathBuf, source: io::Error },

	/// Config file could not be parsed
	Parse { path: PathBuf, message: String },

	/// A value is out of range or inconsistent
	Invalid { field: &'static str, message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "Failed to read config {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Failed to parse config {}: {}", path.display(), message)
			}
			ConfigError::Invalid { field, message } => {
				write!(f, "Invalid configuration: {}: {}", field, message)
			}
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ConfigError::Read { source, .. } => Some(source),
			_ => None,
		}
	}
}


// vim: ts=4

//! Protocol error types
//!
//! Every failure the frame codec, the link and the protocol client can report.
//! Decode failures are always surfaced to the caller of the pending exchange.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Protocol error type
#[derive(Debug)]
pub enum HcomError {
	/// Frame bytes do not match the header (length, version, COBS stuffing)
	MalformedFrame(String),

	/// Packed code does not map to a known category/subtype combination
	UnknownMessageCode(u16),

	/// No response within the configured window
	Timeout { operation: &'static str, window: Duration },

	/// Transport severed while the operation was in flight
	ConnectionLost { operation: &'static str },

	/// Operation attempted outside the `Connected` state
	NotConnected,

	/// Device explicitly reported a failure
	DeviceError { operation: &'static str, message: String },

	/// Local file referenced by a write does not exist
	LocalFileMissing(PathBuf),

	/// Operation was cancelled through its cancellation token
	Cancelled,

	/// Device answered with a message that does not belong to the exchange
	UnexpectedResponse { operation: &'static str, response: String },

	/// Transport could not be opened
	OpenFailed { route: String, source: io::Error },

	/// Local I/O error
	Io(io::Error),
}

impl HcomError {
	/// Whether the failure means the link is gone and a reconnect is required
	pub fn is_connection_loss(&self) -> bool {
		matches!(self, HcomError::ConnectionLost { .. } | HcomError::NotConnected)
	}
}

impl fmt::Display for HcomError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HcomError::MalformedFrame(reason) => write!(f, "Malformed frame: {}", reason),
			HcomError::UnknownMessageCode(code) => write!(f, "Unknown message code 0x{:04x}", code),
			HcomError::Timeout { operation, window } => {
				write!(f, "{}: no response within {} ms", operation, window.as_millis())
			}
			HcomError::ConnectionLost { operation } => {
				write!(f, "{}: connection lost", operation)
			}
			HcomError::NotConnected => write!(f, "Device is not connected"),
			HcomError::DeviceError { operation, message } => {
				write!(f, "{}: device reported an error: {}", operation, message)
			}
			HcomError::LocalFileMissing(path) => {
				write!(f, "Local file not found: {}", path.display())
			}
			HcomError::Cancelled => write!(f, "Operation cancelled"),
			HcomError::UnexpectedResponse { operation, response } => {
				write!(f, "{}: unexpected response {}", operation, response)
			}
			HcomError::OpenFailed { route, source } => {
				write!(f, "Failed to open {}: {}", route, source)
			}
			HcomError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl std::error::Error for HcomError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			HcomError::OpenFailed { source, .. } => Some(source),
			HcomError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for HcomError {
	fn from(e: io::Error) -> Self {
		HcomError::Io(e)
	}
}

/// Result type for protocol operations
pub type HcomResult<T> = Result<T, HcomError>;


// vim: ts=4

//! Logging prelude module for convenient access to tracing macros.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Uploading {}", name);
//! warn!("Retrying {}", name);
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies (the config
/// `logLevel`, or a level picked from CLI verbosity flags):
///
/// ```bash
/// RUST_LOG=debug hcomsync deploy ./bin
/// RUST_LOG=hcomsync::protocol=trace hcomsync files --crc
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
	// A subscriber may already be installed (tests, embedding applications)
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4

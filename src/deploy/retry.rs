//! Per-file upload retry loop
//!
//! A rejected or failed write is retried after a fixed delay until it
//! succeeds, the caller cancels, or the optional attempt cap is reached. A
//! lost connection ends the loop at once; the client does not reconnect.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::local::LocalFileEntry;
use crate::callbacks::{DeployCallback, DeployEvent};
use crate::protocol::{DeviceConnection, HcomError};

/// How the retry loop behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub delay: Duration,
	/// Unbounded when `None`
	pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { delay: Duration::from_millis(100), max_attempts: None }
	}
}

/// Final outcome for one file
#[derive(Debug)]
pub enum UploadOutcome {
	Uploaded { attempts: u32 },
	/// Local file vanished after planning
	MissingLocal,
	/// Gave up after the attempt cap; carries the last failure
	GaveUp { attempts: u32, last_error: String },
	Cancelled { attempts: u32 },
	/// Link gone; no later attempt can succeed
	ConnectionLost { attempts: u32, error: HcomError },
}

/// Result of a single attempt
enum AttemptOutcome {
	Success,
	RetryableFailure(String),
	MissingLocal,
	Cancelled,
	ConnectionLost(HcomError),
}

async fn attempt(
	conn: &dyn DeviceConnection,
	entry: &LocalFileEntry,
	cancel: &CancellationToken,
) -> AttemptOutcome {
	match conn.write_file(&entry.path, Some(entry.name()), cancel).await {
		Ok(true) => AttemptOutcome::Success,
		Ok(false) => AttemptOutcome::RetryableFailure("device rejected the transfer".to_string()),
		Err(HcomError::Cancelled) => AttemptOutcome::Cancelled,
		Err(HcomError::LocalFileMissing(_)) => AttemptOutcome::MissingLocal,
		Err(e) if e.is_connection_loss() => AttemptOutcome::ConnectionLost(e),
		Err(e) => AttemptOutcome::RetryableFailure(e.to_string()),
	}
}

/// Upload one file, retrying failures
pub async fn upload_with_retry(
	conn: &dyn DeviceConnection,
	entry: &LocalFileEntry,
	policy: RetryPolicy,
	callback: &dyn DeployCallback,
	cancel: &CancellationToken,
) -> UploadOutcome {
	let name = entry.name().to_string();
	let mut attempts = 0u32;
	loop {
		if cancel.is_cancelled() {
			return UploadOutcome::Cancelled { attempts };
		}
		attempts += 1;
		callback.on_event(DeployEvent::Uploading { name: name.clone(), attempt: attempts });

		let reason = match attempt(conn, entry, cancel).await {
			AttemptOutcome::Success => {
				debug!("Uploaded {} after {} attempt(s)", name, attempts);
				callback.on_event(DeployEvent::Uploaded { name, attempts });
				return UploadOutcome::Uploaded { attempts };
			}
			AttemptOutcome::MissingLocal => {
				warn!("Skipping {}: local file missing", name);
				callback.on_event(DeployEvent::MissingLocal { name });
				return UploadOutcome::MissingLocal;
			}
			AttemptOutcome::Cancelled => return UploadOutcome::Cancelled { attempts },
			AttemptOutcome::ConnectionLost(error) => {
				warn!("Abandoning {}: {}", name, error);
				return UploadOutcome::ConnectionLost { attempts, error };
			}
			AttemptOutcome::RetryableFailure(reason) => reason,
		};

		if policy.max_attempts.map_or(false, |max| attempts >= max) {
			warn!("Giving up on {} after {} attempts: {}", name, attempts, reason);
			return UploadOutcome::GaveUp { attempts, last_error: reason };
		}

		warn!("Attempt {} to upload {} failed: {}; retrying", attempts, name, reason);
		callback.on_event(DeployEvent::Retrying { name: name.clone(), attempt: attempts, reason });

		tokio::select! {
			_ = cancel.cancelled() => return UploadOutcome::Cancelled { attempts },
			_ = tokio::time::sleep(policy.delay) => {}
		}
	}
}


// vim: ts=4

//! Callback trait for deploy progress reporting

use std::fmt;

/// Deploy events, in the order a deploy produces them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployEvent {
	/// Plan computed against the device listing
	PlanReady { delete: usize, upload: usize, skip: usize },

	/// Runtime was running and has been disabled for the writes
	RuntimeDisabled,

	/// Deleting a device file that has no local counterpart
	Deleting { name: String },

	/// Device copy already matches by CRC
	Skipped { name: String },

	/// Upload attempt starting
	Uploading { name: String, attempt: u32 },

	/// Upload attempt failed; another follows after the retry delay
	Retrying { name: String, attempt: u32, reason: String },

	/// Upload succeeded
	Uploaded { name: String, attempts: u32 },

	/// Planned file disappeared locally before its upload
	MissingLocal { name: String },

	/// Runtime re-enabled after the writes
	RuntimeRestored,
}

impl fmt::Display for DeployEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeployEvent::PlanReady { delete, upload, skip } => {
				write!(f, "{} to delete, {} to upload, {} unchanged", delete, upload, skip)
			}
			DeployEvent::RuntimeDisabled => write!(f, "Runtime disabled"),
			DeployEvent::Deleting { name } => write!(f, "Deleting {}", name),
			DeployEvent::Skipped { name } => write!(f, "Skipping {}: unchanged", name),
			DeployEvent::Uploading { name, attempt } => {
				if *attempt > 1 {
					write!(f, "Uploading {} (attempt {})", name, attempt)
				} else {
					write!(f, "Uploading {}", name)
				}
			}
			DeployEvent::Retrying { name, attempt, reason } => {
				write!(f, "Attempt {} for {} failed: {}", attempt, name, reason)
			}
			DeployEvent::Uploaded { name, .. } => write!(f, "Uploaded {}", name),
			DeployEvent::MissingLocal { name } => write!(f, "Skipping {}: local file missing", name),
			DeployEvent::RuntimeRestored => write!(f, "Runtime enabled"),
		}
	}
}

/// Trait for receiving deploy events as a unified callback
pub trait DeployCallback: Send + Sync {
	/// Called for all deploy events
	fn on_event(&self, _event: DeployEvent) {}
}

impl<T: Fn(DeployEvent) + Send + Sync> DeployCallback for T {
	fn on_event(&self, event: DeployEvent) {
		self(event);
	}
}

/// Default callback implementation that does nothing
pub struct NoCallbacks;

impl DeployCallback for NoCallbacks {}


// vim: ts=4

//! CRC-based deploy engine
//!
//! Brings the device's application folder in line with a local file set:
//! stale device files are deleted, changed or new files uploaded (with
//! retry), and files whose CRC already matches are left alone. A full deploy
//! suspends the on-device runtime for the duration of the writes.
//!
//! # Example Usage
//!
//! ```ignore
//! use hcomsync::deploy::{Deployer, DeployFilter, generate_deploy_list};
//!
//! let files = generate_deploy_list(&bin_dir, None, &[], &filter).await?;
//! let report = Deployer::new(RetryPolicy::default()).deploy(&client, &files, &cancel).await?;
//! ```

pub mod local;
pub mod plan;
pub mod retry;

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use local::{
	generate_deploy_list, local_file_set, locate_application, AppLocation, DeployFilter,
	LocalFileEntry,
};
pub use plan::{DeployPlan, PlannedUpload, UploadReason};
pub use retry::{upload_with_retry, RetryPolicy, UploadOutcome};

use crate::callbacks::{DeployCallback, DeployEvent, NoCallbacks};
use crate::config::Config;
use crate::device::RuntimeGuard;
use crate::error::DeployError;
use crate::protocol::{DeviceConnection, HcomError};

impl From<&Config> for RetryPolicy {
	fn from(config: &Config) -> Self {
		Self { delay: config.retry_delay(), max_attempts: config.max_upload_attempts }
	}
}

/// What a deploy pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
	pub deleted: Vec<String>,
	pub uploaded: Vec<String>,
	pub skipped: Vec<String>,
	/// Planned files that vanished locally before upload
	pub missing: Vec<String>,
	/// Files abandoned after the attempt cap, with the last failure
	pub failed: Vec<(String, String)>,
	/// Upload attempts across all files
	pub attempts: u32,
	/// Attempts beyond the first, across all files
	pub retries: u32,
}

impl DeployReport {
	pub fn is_success(&self) -> bool {
		self.failed.is_empty()
	}
}

/// Map a protocol failure to the deploy error for its step
fn step_error(e: HcomError, wrap: impl FnOnce(HcomError) -> DeployError) -> DeployError {
	match e {
		HcomError::Cancelled => DeployError::Cancelled,
		other => wrap(other),
	}
}

/// Runs deploy passes against a device
pub struct Deployer {
	policy: RetryPolicy,
	callback: Arc<dyn DeployCallback>,
}

impl Deployer {
	pub fn new(policy: RetryPolicy) -> Self {
		Self { policy, callback: Arc::new(NoCallbacks) }
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(RetryPolicy::from(config))
	}

	pub fn with_callback(mut self, callback: Arc<dyn DeployCallback>) -> Self {
		self.callback = callback;
		self
	}

	pub fn policy(&self) -> RetryPolicy {
		self.policy
	}

	/// One sync pass: list, plan, delete, upload
	///
	/// Listing and delete failures abort the pass; upload failures are
	/// retried per the policy, except a lost connection, which aborts too.
	pub async fn sync_files(
		&self,
		conn: &dyn DeviceConnection,
		local: &[LocalFileEntry],
		cancel: &CancellationToken,
	) -> Result<DeployReport, DeployError> {
		let device = conn
			.get_file_list(true, cancel)
			.await
			.map_err(|e| step_error(e, DeployError::Listing))?;
		let plan = DeployPlan::compute(local, &device);
		info!(
			"Deploy plan: {} to delete, {} to upload, {} unchanged",
			plan.to_delete.len(),
			plan.to_upload.len(),
			plan.skip.len()
		);
		self.callback.on_event(DeployEvent::PlanReady {
			delete: plan.to_delete.len(),
			upload: plan.to_upload.len(),
			skip: plan.skip.len(),
		});

		let mut report = DeployReport::default();

		for file in &plan.to_delete {
			self.callback.on_event(DeployEvent::Deleting { name: file.name.clone() });
			conn.delete_file(&file.name, cancel).await.map_err(|e| {
				step_error(e, |source| DeployError::Delete { file: file.name.clone(), source })
			})?;
			report.deleted.push(file.name.clone());
		}

		for entry in &plan.skip {
			self.callback.on_event(DeployEvent::Skipped { name: entry.name().to_string() });
			report.skipped.push(entry.name().to_string());
		}

		for upload in &plan.to_upload {
			let name = upload.entry.name().to_string();
			info!("Uploading {} ({})", name, upload.reason);
			let outcome =
				upload_with_retry(conn, &upload.entry, self.policy, self.callback.as_ref(), cancel)
					.await;
			match outcome {
				UploadOutcome::Uploaded { attempts } => {
					report.attempts += attempts;
					report.retries += attempts - 1;
					report.uploaded.push(name);
				}
				UploadOutcome::MissingLocal => report.missing.push(name),
				UploadOutcome::GaveUp { attempts, last_error } => {
					report.attempts += attempts;
					report.retries += attempts - 1;
					report.failed.push((name, last_error));
				}
				UploadOutcome::Cancelled { .. } => return Err(DeployError::Cancelled),
				UploadOutcome::ConnectionLost { error, .. } => {
					return Err(DeployError::Upload { file: name, source: error })
				}
			}
		}

		Ok(report)
	}

	/// Full deploy: suspend the runtime, sync, restore the runtime
	///
	/// The runtime is restored on every path, cancellation and failure
	/// included.
	pub async fn deploy(
		&self,
		conn: &dyn DeviceConnection,
		local: &[LocalFileEntry],
		cancel: &CancellationToken,
	) -> Result<DeployReport, DeployError> {
		let guard = RuntimeGuard::suspend(conn, cancel).await.map_err(|e| {
			step_error(e, |source| DeployError::Runtime { action: "disable", source })
		})?;
		if guard.was_enabled() {
			self.callback.on_event(DeployEvent::RuntimeDisabled);
		}

		let result = self.sync_files(conn, local, cancel).await;

		let was_enabled = guard.was_enabled();
		match guard.restore(conn).await {
			Ok(()) if was_enabled => self.callback.on_event(DeployEvent::RuntimeRestored),
			Ok(()) => {}
			Err(source) => {
				error!("Failed to re-enable runtime: {}", source);
				if result.is_ok() {
					return Err(DeployError::Runtime { action: "enable", source });
				}
			}
		}

		if let Ok(report) = &result {
			if !report.is_success() {
				warn!("{} file(s) could not be uploaded", report.failed.len());
			}
		}
		result
	}

	/// Deploy an application build: collect its files and run [`deploy`](Self::deploy)
	pub async fn deploy_application(
		&self,
		conn: &dyn DeviceConnection,
		app: &AppLocation,
		additional_dir: Option<&Path>,
		dependencies: &[PathBuf],
		filter: &DeployFilter,
		cancel: &CancellationToken,
	) -> Result<DeployReport, DeployError> {
		let filter = filter.clone().with_pdbs(filter.include_pdbs() || app.include_pdbs);
		let files =
			generate_deploy_list(&app.binary_dir, additional_dir, dependencies, &filter).await?;
		info!("Deploying {} files from {}", files.len(), app.binary_dir.display());
		self.deploy(conn, &files, cancel).await
	}
}

// vim: ts=4

//! Device operations the deploy engine needs
//!
//! Implemented by [`HcomClient`](super::HcomClient); tests substitute scripted
//! devices.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::error::HcomResult;
use crate::device::{DeviceFileInfo, DeviceInfo};

/// Core trait for talking to one device
#[async_trait]
pub trait DeviceConnection: Send + Sync {
	/// Query device information
	async fn get_device_info(&self, cancel: &CancellationToken) -> HcomResult<DeviceInfo>;

	/// List files on the device, optionally with per-file CRCs
	async fn get_file_list(
		&self,
		include_crc: bool,
		cancel: &CancellationToken,
	) -> HcomResult<Vec<DeviceFileInfo>>;

	/// Upload one local file
	///
	/// Returns `Ok(false)` when the device rejected the transfer, so callers
	/// may retry. `target_name` defaults to the local file name.
	async fn write_file(
		&self,
		local_path: &Path,
		target_name: Option<&str>,
		cancel: &CancellationToken,
	) -> HcomResult<bool>;

	/// Delete one file by name; deleting an absent file is not an error
	async fn delete_file(&self, name: &str, cancel: &CancellationToken) -> HcomResult<()>;

	async fn is_runtime_enabled(&self, cancel: &CancellationToken) -> HcomResult<bool>;

	async fn runtime_enable(&self, cancel: &CancellationToken) -> HcomResult<()>;

	async fn runtime_disable(&self, cancel: &CancellationToken) -> HcomResult<()>;
}

// vim: ts=4

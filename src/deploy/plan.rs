//! Deploy plan: what to delete, upload and skip
//!
//! Pure function of the local file set and the device listing. Files are
//! compared by bare file name; the device keeps no folders for applications.

use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use super::local::LocalFileEntry;
use crate::crc;
use crate::device::DeviceFileInfo;

/// Why a file is uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadReason {
	/// Not on the device
	New,
	/// On the device with a different CRC
	Changed { device_crc: u32 },
	/// On the device without a reported CRC
	Unverified,
}

impl fmt::Display for UploadReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			UploadReason::New => write!(f, "new"),
			UploadReason::Changed { device_crc } => {
				write!(f, "changed (device {})", crc::format_hex_crc(*device_crc))
			}
			UploadReason::Unverified => write!(f, "no device CRC"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
	pub entry: LocalFileEntry,
	pub reason: UploadReason,
}

/// Result of comparing local files with the device
///
/// Every local file lands in exactly one of `to_upload` and `skip`;
/// `to_delete` holds device files with no local counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployPlan {
	pub to_delete: Vec<DeviceFileInfo>,
	pub to_upload: Vec<PlannedUpload>,
	pub skip: Vec<LocalFileEntry>,
}

impl DeployPlan {
	pub fn compute(local: &[LocalFileEntry], device: &[DeviceFileInfo]) -> Self {
		let local_names: HashSet<&str> = local.iter().map(|e| e.name()).collect();
		let device_by_name: HashMap<&str, &DeviceFileInfo> =
			device.iter().map(|f| (f.file_name(), f)).collect();

		let to_delete: Vec<DeviceFileInfo> = device
			.iter()
			.filter(|f| !local_names.contains(f.file_name()))
			.cloned()
			.collect();

		let mut to_upload = Vec::new();
		let mut skip = Vec::new();
		for entry in local {
			let reason = match device_by_name.get(entry.name()) {
				None => Some(UploadReason::New),
				Some(DeviceFileInfo { crc: None, .. }) => Some(UploadReason::Unverified),
				Some(DeviceFileInfo { crc: Some(device_crc), .. }) if *device_crc == entry.crc => None,
				Some(DeviceFileInfo { crc: Some(device_crc), .. }) => {
					debug!(
						"{}: local {} != device {}",
						entry.name(),
						crc::format_hex_crc(entry.crc),
						crc::format_hex_crc(*device_crc)
					);
					Some(UploadReason::Changed { device_crc: *device_crc })
				}
			};
			match reason {
				Some(reason) => to_upload.push(PlannedUpload { entry: entry.clone(), reason }),
				None => {
					info!("Skipping {}: unchanged", entry.name());
					skip.push(entry.clone());
				}
			}
		}

		Self { to_delete, to_upload, skip }
	}

	/// Nothing to do: device already matches the local set
	pub fn is_empty(&self) -> bool {
		self.to_delete.is_empty() && self.to_upload.is_empty()
	}
}


// vim: ts=4

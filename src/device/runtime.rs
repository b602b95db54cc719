//! Runtime suspension around file writes
//!
//! The on-device runtime must not be executing while its files change. A
//! [`RuntimeGuard`] records whether the runtime was enabled, disables it, and
//! restores the prior state afterwards, whatever the outcome of the writes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::{DeviceConnection, HcomResult};

/// Upper bound for the restore exchange, which runs even after cancellation
const RESTORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Prior runtime state, captured before writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the runtime stays disabled unless restore() is called"]
pub struct RuntimeGuard {
	was_enabled: bool,
}

impl RuntimeGuard {
	/// Read the runtime state and disable the runtime if it is running
	pub async fn suspend(
		conn: &dyn DeviceConnection,
		cancel: &CancellationToken,
	) -> HcomResult<Self> {
		let was_enabled = conn.is_runtime_enabled(cancel).await?;
		if was_enabled {
			info!("Disabling runtime for file writes");
			conn.runtime_disable(cancel).await?;
		} else {
			debug!("Runtime already disabled");
		}
		Ok(Self { was_enabled })
	}

	pub fn was_enabled(&self) -> bool {
		self.was_enabled
	}

	/// Re-enable the runtime if it was enabled before [`suspend`](Self::suspend)
	///
	/// Uses its own cancellation token so a cancelled deploy still leaves the
	/// device as it found it.
	pub async fn restore(self, conn: &dyn DeviceConnection) -> HcomResult<()> {
		if !self.was_enabled {
			return Ok(());
		}
		info!("Re-enabling runtime");
		let token = CancellationToken::new();
		let restore = conn.runtime_enable(&token);
		match tokio::time::timeout(RESTORE_TIMEOUT, restore).await {
			Ok(result) => result,
			Err(_) => Err(crate::protocol::HcomError::Timeout {
				operation: "runtime-enable",
				window: RESTORE_TIMEOUT,
			}),
		}
	}
}

// vim: ts=4

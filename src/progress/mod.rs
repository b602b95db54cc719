//! Progress display for the CLI
//!
//! Renders device events (write progress, device output) and deploy events
//! on stderr.

pub mod constants;

use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::callbacks::{DeployCallback, DeployEvent};
use crate::device::{DeviceEvent, MessageKind};

/// Progress display constants
pub use constants::*;

/// `Writing <file>: NN%` with a bar
pub fn format_write_progress(file_name: &str, completed: u64, total: u64) -> String {
	let ratio = if total > 0 { (completed as f64 / total as f64).clamp(0.0, 1.0) } else { 1.0 };
	let filled = (ratio * PROGRESS_BAR_WIDTH as f64) as usize;
	format!(
		"Writing {}: {:>3.0}% [{}{}] {:.1}/{:.1} kB",
		file_name,
		ratio * 100.0,
		"=".repeat(filled),
		" ".repeat(PROGRESS_BAR_WIDTH - filled),
		completed as f64 / BYTES_PER_KB,
		total as f64 / BYTES_PER_KB
	)
}

/// CLI progress display
pub struct CliProgress {
	last_update: Mutex<Instant>,
	show_trace: bool,
}

impl CliProgress {
	pub fn new(show_trace: bool) -> Self {
		Self { last_update: Mutex::new(Instant::now()), show_trace }
	}

	/// Render one device event
	pub fn on_device_event(&self, event: &DeviceEvent) {
		match event {
			DeviceEvent::FileWriteProgress { file_name, completed, total } => {
				let done = completed >= total;
				// Throttle intermediate updates; always draw the first and last
				if *completed > 0 && !done {
					let mut last = self.last_update.lock().unwrap_or_else(|e| e.into_inner());
					if last.elapsed().as_millis() < UPDATE_THROTTLE_MS {
						return;
					}
					*last = Instant::now();
				}
				let line = format_write_progress(file_name, *completed, *total);
				let mut stderr = std::io::stderr();
				let _ = write!(stderr, "\r{}", line);
				if done {
					let _ = writeln!(stderr);
				}
				let _ = stderr.flush();
			}
			DeviceEvent::DeviceMessage { kind, text } => match kind {
				MessageKind::Trace if !self.show_trace => {}
				MessageKind::Stdout => println!("{}", text.trim_end()),
				MessageKind::Reconnect => info!("Device requested reconnect: {}", text.trim_end()),
				_ => eprintln!("{}", text.trim_end()),
			},
			DeviceEvent::StateChanged(state) => info!("Device {}", state),
		}
	}

	/// Render device events until the bus closes
	pub fn spawn_device_renderer(
		self: std::sync::Arc<Self>,
		mut events: broadcast::Receiver<DeviceEvent>,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			loop {
				match events.recv().await {
					Ok(event) => self.on_device_event(&event),
					Err(broadcast::error::RecvError::Lagged(n)) => {
						warn!("Progress display skipped {} events", n)
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}
		})
	}
}

impl Default for CliProgress {
	fn default() -> Self {
		Self::new(false)
	}
}

impl DeployCallback for CliProgress {
	fn on_event(&self, event: DeployEvent) {
		match &event {
			// Retries are already logged at warn level
			DeployEvent::Retrying { .. } => {}
			DeployEvent::Uploading { attempt: 1, .. } => {}
			_ => info!("{}", event),
		}
	}
}


// vim: ts=4

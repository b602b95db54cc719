//! Connection lifecycle and runtime state of one device, plus its event bus

use std::fmt;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::protocol::HcomError;

/// Capacity of the device event bus; slow subscribers lag instead of blocking
const EVENT_CAPACITY: usize = 256;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
	Disconnecting,
}

impl ConnectionState {
	/// Whether an explicit transition to `next` is allowed
	///
	/// Transport loss is handled separately and may force `Disconnected` from
	/// any state.
	pub fn can_transition_to(self, next: ConnectionState) -> bool {
		use ConnectionState::*;
		matches!(
			(self, next),
			(Disconnected, Connecting)
				| (Connecting, Connected)
				| (Connecting, Disconnected)
				| (Connected, Disconnecting)
				| (Disconnecting, Disconnected)
		)
	}
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ConnectionState::Disconnected => "disconnected",
			ConnectionState::Connecting => "connecting",
			ConnectionState::Connected => "connected",
			ConnectionState::Disconnecting => "disconnecting",
		};
		f.write_str(name)
	}
}

/// Runtime state mirrored from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
	Enabled,
	Disabled,
}

impl RuntimeState {
	pub fn from_enabled(enabled: bool) -> Self {
		if enabled {
			RuntimeState::Enabled
		} else {
			RuntimeState::Disabled
		}
	}

	pub fn is_enabled(self) -> bool {
		self == RuntimeState::Enabled
	}
}

/// Kind of an unsolicited device message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	Information,
	Trace,
	Stdout,
	Stderr,
	Reconnect,
}

/// Events published by a device connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
	/// Connection lifecycle changed
	StateChanged(ConnectionState),

	/// Unsolicited message from the device (trace, log, runtime output)
	DeviceMessage { kind: MessageKind, text: String },

	/// File write progress
	FileWriteProgress { file_name: String, completed: u64, total: u64 },
}

/// State model of one device connection
///
/// Owns the connection state, the mirrored runtime state and the event bus.
pub struct DeviceState {
	connection: watch::Sender<ConnectionState>,
	runtime: watch::Sender<Option<RuntimeState>>,
	events: broadcast::Sender<DeviceEvent>,
}

impl DeviceState {
	pub fn new() -> Self {
		let (connection, _) = watch::channel(ConnectionState::Disconnected);
		let (runtime, _) = watch::channel(None);
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self { connection, runtime, events }
	}

	pub fn connection(&self) -> ConnectionState {
		*self.connection.borrow()
	}

	pub fn is_connected(&self) -> bool {
		self.connection() == ConnectionState::Connected
	}

	/// Fail fast unless the connection is usable
	pub fn ensure_connected(&self) -> Result<(), HcomError> {
		if self.is_connected() {
			Ok(())
		} else {
			Err(HcomError::NotConnected)
		}
	}

	/// Explicit transition requested by connect/disconnect
	pub fn transition(&self, next: ConnectionState) -> bool {
		let changed = self.connection.send_if_modified(|state| {
			if state.can_transition_to(next) {
				*state = next;
				true
			} else {
				false
			}
		});
		if changed {
			debug!("Connection state -> {}", next);
			self.publish(DeviceEvent::StateChanged(next));
		}
		changed
	}

	/// Transport reported the link gone
	pub fn mark_disconnected(&self) {
		let changed = self.connection.send_if_modified(|state| {
			if *state == ConnectionState::Disconnected {
				false
			} else {
				*state = ConnectionState::Disconnected;
				true
			}
		});
		if changed {
			debug!("Connection state -> {}", ConnectionState::Disconnected);
			self.publish(DeviceEvent::StateChanged(ConnectionState::Disconnected));
		}
	}

	/// Watch connection state changes
	pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
		self.connection.subscribe()
	}

	/// Last runtime state read from or set on the device
	pub fn runtime(&self) -> Option<RuntimeState> {
		*self.runtime.borrow()
	}

	pub fn set_runtime(&self, state: RuntimeState) {
		self.runtime.send_replace(Some(state));
	}

	pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
		self.events.subscribe()
	}

	/// Publish an event; having no subscribers is not an error
	pub fn publish(&self, event: DeviceEvent) {
		let _ = self.events.send(event);
	}
}

impl Default for DeviceState {
	fn default() -> Self {
		Self::new()
	}
}


// vim: ts=4

//! Device model: reported information, connection/runtime state, event bus

pub mod info;
pub mod runtime;
pub mod state;

pub use info::{DeviceFileInfo, DeviceInfo, UNKNOWN_MAC_ADDRESS};
pub use runtime::RuntimeGuard;
pub use state::{ConnectionState, DeviceEvent, DeviceState, MessageKind, RuntimeState};

// vim: ts=4

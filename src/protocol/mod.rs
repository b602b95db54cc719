//! HCOM protocol layer
//!
//! Frame codec, message codes and the request/response client for one device.
//! The deploy engine depends only on the [`DeviceConnection`] trait, never on
//! the client directly.
//!
//! # Example Usage
//!
//! ```ignore
//! use hcomsync::protocol::{HcomClient, DeviceConnection};
//!
//! let client = HcomClient::connect(&route, &config).await?;
//! let files = client.get_file_list(true, &cancel).await?;
//! ```

pub mod client;
pub mod codes;
pub mod error;
pub mod frame;
pub mod reader;
pub mod traits;

/// Protocol version carried in every frame header
pub const PROTOCOL_VERSION: u16 = 0x0007;

// Re-export public API
pub use client::HcomClient;
pub use codes::{Category, RequestType, ResponseType};
pub use error::{HcomError, HcomResult};
pub use frame::{FileStartInfo, Frame, FrameHeader, Request, RequestBody, Response};
pub use traits::DeviceConnection;

// vim: ts=4

//! # hcomsync - HCOM device client and CRC-based deploy engine
//!
//! Talks to an embedded device over a serial or TCP link using the HCOM
//! frame protocol, and brings the device's application folder in line with
//! a local build: only files whose CRC differs are transferred, stale files
//! are removed, and the on-device runtime is paused while files change.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hcomsync::{Config, Deployer, HcomClient, Route};
//! use hcomsync::deploy::{generate_deploy_list, locate_application, DeployFilter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let route: Route = "/dev/ttyACM0".parse()?;
//!     let client = HcomClient::connect(&route, &config).await?;
//!
//!     let app = locate_application("./bin".as_ref(), false)?;
//!     let filter = DeployFilter::from_config(&config)?;
//!     let files = generate_deploy_list(&app.binary_dir, None, &[], &filter).await?;
//!
//!     let cancel = CancellationToken::new();
//!     let report = Deployer::from_config(&config).deploy(&client, &files, &cancel).await?;
//!     println!("Uploaded {} files", report.uploaded.len());
//!     Ok(())
//! }
//! ```

pub mod callbacks;
pub mod config;
pub mod crc;
pub mod deploy;
pub mod device;
pub mod error;
pub mod logging;
pub mod progress;
pub mod protocol;
pub mod transport;

// Re-export commonly used types and functions
pub use callbacks::{DeployCallback, DeployEvent};
pub use config::Config;
pub use deploy::{DeployReport, Deployer};
pub use device::{ConnectionState, DeviceEvent, DeviceFileInfo, DeviceInfo};
pub use error::{ConfigError, DeployError};
pub use protocol::{DeviceConnection, HcomClient, HcomError};
pub use transport::Route;

// vim: ts=4

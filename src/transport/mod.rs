//! Transport: how frame bytes reach the device
//!
//! A [`Route`] names the device (serial port or TCP endpoint); a [`Link`] is
//! the opened duplex byte channel with link framing applied in both
//! directions.

pub mod cobs;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

pub use cobs::LinkCodec;

use crate::config::Config;
use crate::protocol::{HcomError, HcomResult};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Inbound half of a link
pub type LinkReader = FramedRead<BoxedReader, LinkCodec>;

/// Outbound half of a link
pub type LinkWriter = FramedWrite<BoxedWriter, LinkCodec>;

/// Device address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
	/// Serial port, e.g. `/dev/ttyACM0` or `COM3`
	Serial { port: String },
	/// TCP endpoint, `host:port`
	Tcp { addr: String },
}

impl FromStr for Route {
	type Err = String;

	/// Accepts `tcp://host:port`, `serial://<port>`, a bare socket address, or
	/// a bare serial port name
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() {
			return Err("empty route".to_string());
		}
		if let Some(addr) = s.strip_prefix("tcp://") {
			if addr.is_empty() || !addr.contains(':') {
				return Err(format!("TCP route '{}' needs host:port", s));
			}
			return Ok(Route::Tcp { addr: addr.to_string() });
		}
		if let Some(port) = s.strip_prefix("serial://") {
			if port.is_empty() {
				return Err(format!("serial route '{}' has no port", s));
			}
			return Ok(Route::Serial { port: port.to_string() });
		}
		if s.parse::<SocketAddr>().is_ok() {
			return Ok(Route::Tcp { addr: s.to_string() });
		}
		Ok(Route::Serial { port: s.to_string() })
	}
}

impl fmt::Display for Route {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Route::Serial { port } => write!(f, "serial://{}", port),
			Route::Tcp { addr } => write!(f, "tcp://{}", addr),
		}
	}
}

/// Opened, framed duplex channel to a device
pub struct Link {
	pub reader: LinkReader,
	pub writer: LinkWriter,
	pub label: String,
}

impl Link {
	/// Wrap any duplex byte stream (serial port, socket, in-memory pipe)
	pub fn from_stream<S>(stream: S, label: impl Into<String>) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (read_half, write_half) = tokio::io::split(stream);
		let reader: BoxedReader = Box::new(read_half);
		let writer: BoxedWriter = Box::new(write_half);
		Self {
			reader: FramedRead::new(reader, LinkCodec::new()),
			writer: FramedWrite::new(writer, LinkCodec::new()),
			label: label.into(),
		}
	}

	/// Open the transport a route names
	pub async fn open(route: &Route, config: &Config) -> HcomResult<Self> {
		debug!("Opening {}", route);
		let link = match route {
			Route::Tcp { addr } => {
				let window = config.connect_timeout();
				let stream = tokio::time::timeout(window, TcpStream::connect(addr.as_str()))
					.await
					.map_err(|_| HcomError::Timeout { operation: "connect", window })?
					.map_err(|source| HcomError::OpenFailed { route: route.to_string(), source })?;
				stream.set_nodelay(true)?;
				Link::from_stream(stream, route.to_string())
			}
			Route::Serial { port } => open_serial(route, port, config)?,
		};
		info!("Opened {}", link.label);
		Ok(link)
	}
}

#[cfg(feature = "serial")]
fn open_serial(route: &Route, port: &str, config: &Config) -> HcomResult<Link> {
	use tokio_serial::SerialPortBuilderExt;

	let stream = tokio_serial::new(port, config.baud_rate)
		.timeout(config.request_timeout())
		.open_native_async()
		.map_err(|e| HcomError::OpenFailed { route: route.to_string(), source: io::Error::from(e) })?;
	Ok(Link::from_stream(stream, route.to_string()))
}

#[cfg(not(feature = "serial"))]
fn open_serial(route: &Route, _port: &str, _config: &Config) -> HcomResult<Link> {
	Err(HcomError::OpenFailed {
		route: route.to_string(),
		source: io::Error::new(io::ErrorKind::Unsupported, "built without serial support"),
	})
}


// vim: ts=4

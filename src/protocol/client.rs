//! HCOM protocol client
//!
//! One client per device link. Requests are serialized: an exchange holds the
//! channel lock from the first request frame until its final response, so at
//! most one request is in flight and responses are correlated by order.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::sync::{broadcast, mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codes::RequestType;
use super::error::{HcomError, HcomResult};
use super::frame::{FileStartInfo, Request, Response, MAX_PAYLOAD};
use super::reader::{self, ResponseReceiver};
use super::traits::DeviceConnection;
use crate::config::Config;
use crate::crc;
use crate::device::{
	ConnectionState, DeviceEvent, DeviceFileInfo, DeviceInfo, DeviceState, RuntimeState,
};
use crate::transport::{Link, LinkWriter, Route};

/// Timeouts and sizes the client needs, taken from [`Config`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
	pub request_timeout: Duration,
	pub file_list_timeout: Duration,
	pub write_timeout: Duration,
	pub erase_timeout: Duration,
	pub chunk_size: usize,
	pub device_root: String,
}

impl From<&Config> for ClientOptions {
	/// The chunk size is clamped to what one frame can carry
	fn from(config: &Config) -> Self {
		let chunk_size = config.chunk_size.clamp(1, MAX_PAYLOAD);
		if chunk_size != config.chunk_size {
			warn!("Chunk size {} out of range, using {}", config.chunk_size, chunk_size);
		}
		Self {
			request_timeout: config.request_timeout(),
			file_list_timeout: config.file_list_timeout(),
			write_timeout: config.write_timeout(),
			erase_timeout: config.erase_timeout(),
			chunk_size,
			device_root: config.device_root.clone(),
		}
	}
}

struct Channel {
	writer: LinkWriter,
	inbound: ResponseReceiver,
	next_seq: u16,
}

impl Channel {
	/// Discard responses left behind by a timed-out or cancelled exchange
	fn drain_stale(&mut self) {
		loop {
			match self.inbound.try_recv() {
				Ok(Ok(response)) => debug!("Discarding stale {:?}", response.response_type()),
				Ok(Err(e)) => debug!("Discarding stale error: {}", e),
				Err(_) => break,
			}
		}
	}
}

/// One request/response exchange, holding the channel for its duration
struct Exchange<'a> {
	channel: MutexGuard<'a, Channel>,
	state: &'a DeviceState,
	cancel: &'a CancellationToken,
	operation: &'static str,
	send_window: Duration,
}

impl Exchange<'_> {
	async fn send(&mut self, request: Request) -> HcomResult<()> {
		if self.cancel.is_cancelled() {
			return Err(HcomError::Cancelled);
		}
		let seq = self.channel.next_seq;
		self.channel.next_seq = seq.wrapping_add(1);
		debug!("{}: -> {:?} #{}", self.operation, request.kind(), seq);

		let frame = request.to_frame(seq);
		let window = self.send_window;
		match tokio::time::timeout(window, self.channel.writer.send(frame)).await {
			Err(_) => Err(HcomError::Timeout { operation: self.operation, window }),
			Ok(Ok(())) => Ok(()),
			Ok(Err(HcomError::Io(e))) => {
				warn!("{}: link write failed: {}", self.operation, e);
				self.state.mark_disconnected();
				Err(HcomError::ConnectionLost { operation: self.operation })
			}
			Ok(Err(e)) => Err(e),
		}
	}

	/// Send even after cancellation; used for best-effort abort frames
	async fn send_unchecked(&mut self, request: Request) -> HcomResult<()> {
		let seq = self.channel.next_seq;
		self.channel.next_seq = seq.wrapping_add(1);
		let window = self.send_window;
		tokio::time::timeout(window, self.channel.writer.send(request.to_frame(seq)))
			.await
			.map_err(|_| HcomError::Timeout { operation: self.operation, window })?
	}

	/// Wait for the next correlated response
	async fn recv(&mut self, window: Duration) -> HcomResult<Response> {
		let operation = self.operation;
		let cancel = self.cancel;
		let inbound = &mut self.channel.inbound;
		let item = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(HcomError::Cancelled),
			item = tokio::time::timeout(window, inbound.recv()) => item,
		};
		match item {
			Err(_) => Err(HcomError::Timeout { operation, window }),
			Ok(None) => {
				self.state.mark_disconnected();
				Err(HcomError::ConnectionLost { operation })
			}
			Ok(Some(response)) => {
				let response = response?;
				debug!("{}: <- {:?}", operation, response.response_type());
				Ok(response)
			}
		}
	}

	/// Non-blocking check for a response that arrived mid-transfer
	fn try_next(&mut self) -> Option<HcomResult<Response>> {
		match self.channel.inbound.try_recv() {
			Ok(item) => Some(item),
			Err(mpsc::error::TryRecvError::Empty) => None,
			Err(mpsc::error::TryRecvError::Disconnected) => {
				self.state.mark_disconnected();
				Some(Err(HcomError::ConnectionLost { operation: self.operation }))
			}
		}
	}

	/// Wait for an acknowledgement, skipping intermediate acceptances when
	/// `until_concluded` is set
	async fn acknowledged(&mut self, window: Duration, until_concluded: bool) -> HcomResult<()> {
		loop {
			match self.recv(window).await? {
				Response::Concluded(_) => return Ok(()),
				Response::Accepted(_) if !until_concluded => return Ok(()),
				Response::Accepted(_) => continue,
				other => return Err(unexpected(self.operation, other)),
			}
		}
	}
}

/// Map a response that does not belong to the exchange to an error
fn unexpected(operation: &'static str, response: Response) -> HcomError {
	match response {
		Response::Error(message) | Response::Rejected(message) | Response::FileStartFail(message) => {
			HcomError::DeviceError { operation, message }
		}
		other => HcomError::UnexpectedResponse {
			operation,
			response: format!("{:?}", other.response_type()),
		},
	}
}

/// Protocol client for one connected device
pub struct HcomClient {
	state: Arc<DeviceState>,
	channel: Mutex<Channel>,
	reader: StdMutex<Option<JoinHandle<()>>>,
	options: ClientOptions,
	label: String,
}

impl HcomClient {
	/// Open the route and start talking to the device
	pub async fn connect(route: &Route, config: &Config) -> HcomResult<Self> {
		let state = Arc::new(DeviceState::new());
		state.transition(ConnectionState::Connecting);
		match Link::open(route, config).await {
			Ok(link) => Ok(Self::start(link, state, ClientOptions::from(config))),
			Err(e) => {
				state.mark_disconnected();
				Err(e)
			}
		}
	}

	/// Use an already opened link
	pub fn attach(link: Link, config: &Config) -> Self {
		let state = Arc::new(DeviceState::new());
		state.transition(ConnectionState::Connecting);
		Self::start(link, state, ClientOptions::from(config))
	}

	fn start(link: Link, state: Arc<DeviceState>, options: ClientOptions) -> Self {
		let Link { reader: link_reader, writer, label } = link;
		let (responses, inbound) = mpsc::unbounded_channel();
		let handle = reader::spawn(link_reader, state.clone(), responses);
		state.transition(ConnectionState::Connected);
		info!("Connected to {}", label);

		Self {
			state,
			channel: Mutex::new(Channel { writer, inbound, next_seq: 0 }),
			reader: StdMutex::new(Some(handle)),
			options,
			label,
		}
	}

	/// Close the link; pending exchanges fail with `ConnectionLost`
	pub async fn disconnect(&self) {
		self.state.transition(ConnectionState::Disconnecting);
		self.stop_reader();
		let mut channel = self.channel.lock().await;
		if let Err(e) = channel.writer.close().await {
			debug!("Closing {}: {}", self.label, e);
		}
		self.state.mark_disconnected();
		info!("Disconnected from {}", self.label);
	}

	fn stop_reader(&self) {
		if let Ok(mut reader) = self.reader.lock() {
			if let Some(handle) = reader.take() {
				handle.abort();
			}
		}
	}

	pub fn label(&self) -> &str {
		&self.label
	}

	pub fn state(&self) -> &DeviceState {
		&self.state
	}

	pub fn connection_state(&self) -> ConnectionState {
		self.state.connection()
	}

	/// Subscribe to state changes, device messages and write progress
	pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
		self.state.subscribe()
	}

	pub fn options(&self) -> &ClientOptions {
		&self.options
	}

	async fn begin<'a>(
		&'a self,
		operation: &'static str,
		cancel: &'a CancellationToken,
	) -> HcomResult<Exchange<'a>> {
		self.state.ensure_connected()?;
		let mut channel = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(HcomError::Cancelled),
			guard = self.channel.lock() => guard,
		};
		// The link may have dropped while queued behind another exchange
		self.state.ensure_connected()?;
		channel.drain_stale();
		Ok(Exchange {
			channel,
			state: &self.state,
			cancel,
			operation,
			send_window: self.options.request_timeout,
		})
	}

	/// Send a header-only command and wait for its acknowledgement
	async fn command(
		&self,
		operation: &'static str,
		request: Request,
		window: Duration,
		cancel: &CancellationToken,
	) -> HcomResult<()> {
		let mut exchange = self.begin(operation, cancel).await?;
		exchange.send(request).await?;
		exchange.acknowledged(window, false).await
	}

	pub async fn get_device_info(&self, cancel: &CancellationToken) -> HcomResult<DeviceInfo> {
		let mut exchange = self.begin("get-device-info", cancel).await?;
		exchange.send(Request::new(RequestType::GetDeviceInformation)).await?;
		match exchange.recv(self.options.request_timeout).await? {
			Response::DeviceInfo(info) => Ok(info),
			other => Err(unexpected("get-device-info", other)),
		}
	}

	/// List the device root; a listing cut short is never returned
	pub async fn get_file_list(
		&self,
		include_crc: bool,
		cancel: &CancellationToken,
	) -> HcomResult<Vec<DeviceFileInfo>> {
		let operation = "get-file-list";
		let kind =
			if include_crc { RequestType::ListFilesWithCrc } else { RequestType::ListFiles };
		let mut exchange = self.begin(operation, cancel).await?;
		exchange.send(Request::text(kind, self.options.device_root.as_str())).await?;

		let mut files = Vec::new();
		loop {
			match exchange.recv(self.options.file_list_timeout).await? {
				Response::ListHeader(_) => {}
				Response::ListMember(entry) | Response::CrcListMember(entry) => files.push(entry),
				Response::Concluded(_) => break,
				other => return Err(unexpected(operation, other)),
			}
		}
		debug!("{}: {} files", operation, files.len());
		Ok(files)
	}

	/// Upload one file
	///
	/// `Ok(false)` means the device declined or aborted the transfer. A
	/// cancelled write is abandoned without the end-of-transfer marker.
	pub async fn write_file(
		&self,
		local_path: &Path,
		target_name: Option<&str>,
		cancel: &CancellationToken,
	) -> HcomResult<bool> {
		let operation = "write-file";
		let data = match tokio::fs::read(local_path).await {
			Ok(data) => data,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				return Err(HcomError::LocalFileMissing(local_path.to_path_buf()))
			}
			Err(e) => return Err(HcomError::Io(e)),
		};
		let name = match target_name {
			Some(name) => name.to_string(),
			None => local_path
				.file_name()
				.map(|n| n.to_string_lossy().into_owned())
				.ok_or_else(|| HcomError::LocalFileMissing(local_path.to_path_buf()))?,
		};
		let size = u32::try_from(data.len()).map_err(|_| {
			HcomError::Io(io::Error::new(
				io::ErrorKind::InvalidInput,
				format!("{} is too large to transfer", local_path.display()),
			))
		})?;
		let crc = crc::crc32(&data);
		let total = data.len() as u64;

		let mut exchange = self.begin(operation, cancel).await?;
		exchange
			.send(Request::file_start(
				RequestType::StartFileTransfer,
				FileStartInfo { size, crc, address: 0, name: name.clone() },
			))
			.await?;
		match exchange.recv(self.options.request_timeout).await? {
			Response::FileStartOkay(_) | Response::Accepted(_) => {}
			Response::FileStartFail(message) | Response::Rejected(message) => {
				warn!("{}: device declined {}: {}", operation, name, message);
				return Ok(false);
			}
			other => return Err(unexpected(operation, other)),
		}

		self.publish_progress(&name, 0, total);
		let mut completed = 0u64;
		for chunk in data.chunks(self.options.chunk_size) {
			if cancel.is_cancelled() {
				warn!("{}: abandoning {} at {}/{} bytes", operation, name, completed, total);
				return Err(HcomError::Cancelled);
			}
			exchange
				.send(Request::binary(RequestType::UploadingFileData, Bytes::copy_from_slice(chunk)))
				.await?;
			completed += chunk.len() as u64;
			self.publish_progress(&name, completed, total);

			if let Some(response) = exchange.try_next() {
				match response? {
					Response::Rejected(message) | Response::Error(message) => {
						warn!("{}: device aborted {}: {}", operation, name, message);
						return Ok(false);
					}
					other => debug!("{}: ignoring {:?} mid-transfer", operation, other.response_type()),
				}
			}
		}

		exchange.send(Request::new(RequestType::EndFileTransfer)).await?;
		loop {
			match exchange.recv(self.options.write_timeout).await? {
				Response::Concluded(_) => {
					debug!("{}: {} ({} bytes, crc {})", operation, name, total, crc::format_hex_crc(crc));
					return Ok(true);
				}
				Response::Accepted(_) => {}
				Response::Rejected(message) => {
					warn!("{}: device rejected {}: {}", operation, name, message);
					return Ok(false);
				}
				other => return Err(unexpected(operation, other)),
			}
		}
	}

	fn publish_progress(&self, file_name: &str, completed: u64, total: u64) {
		self.state.publish(DeviceEvent::FileWriteProgress {
			file_name: file_name.to_string(),
			completed,
			total,
		});
	}

	/// Download one device file to `local_path`, returning its size
	pub async fn read_file(
		&self,
		name: &str,
		local_path: &Path,
		cancel: &CancellationToken,
	) -> HcomResult<u64> {
		let operation = "read-file";
		let mut exchange = self.begin(operation, cancel).await?;
		exchange.send(Request::text(RequestType::UploadFileInit, name)).await?;
		match exchange.recv(self.options.request_timeout).await? {
			Response::FileStartOkay(_) | Response::Accepted(_) => {}
			other => return Err(unexpected(operation, other)),
		}

		exchange.send(Request::new(RequestType::UploadStartDataSend)).await?;
		let mut data = Vec::new();
		loop {
			let response = match exchange.recv(self.options.request_timeout).await {
				Ok(response) => response,
				Err(HcomError::Cancelled) => {
					let abort = Request::new(RequestType::UploadAbortDataSend);
					if let Err(e) = exchange.send_unchecked(abort).await {
						debug!("{}: abort not sent: {}", operation, e);
					}
					return Err(HcomError::Cancelled);
				}
				Err(e) => return Err(e),
			};
			match response {
				Response::FileData(chunk) => data.extend_from_slice(&chunk),
				Response::Concluded(_) => break,
				other => return Err(unexpected(operation, other)),
			}
		}
		drop(exchange);

		tokio::fs::write(local_path, &data).await?;
		debug!("{}: {} -> {} ({} bytes)", operation, name, local_path.display(), data.len());
		Ok(data.len() as u64)
	}

	pub async fn delete_file(&self, name: &str, cancel: &CancellationToken) -> HcomResult<()> {
		let request = Request::file_start(
			RequestType::DeleteFileByName,
			FileStartInfo { size: 0, crc: 0, address: 0, name: name.to_string() },
		);
		self.command("delete-file", request, self.options.request_timeout, cancel).await
	}

	/// Erase the whole flash; progress arrives as information messages
	pub async fn erase_flash(&self, cancel: &CancellationToken) -> HcomResult<()> {
		let mut exchange = self.begin("erase-flash", cancel).await?;
		exchange.send(Request::new(RequestType::BulkFlashErase)).await?;
		exchange.acknowledged(self.options.erase_timeout, true).await
	}

	pub async fn is_runtime_enabled(&self, cancel: &CancellationToken) -> HcomResult<bool> {
		let mut exchange = self.begin("runtime-state", cancel).await?;
		exchange.send(Request::new(RequestType::RuntimeState)).await?;
		match exchange.recv(self.options.request_timeout).await? {
			Response::RuntimeState(enabled) => {
				self.state.set_runtime(RuntimeState::from_enabled(enabled));
				Ok(enabled)
			}
			other => Err(unexpected("runtime-state", other)),
		}
	}

	pub async fn runtime_enable(&self, cancel: &CancellationToken) -> HcomResult<()> {
		let request = Request::new(RequestType::RuntimeEnable);
		self.command("runtime-enable", request, self.options.request_timeout, cancel).await?;
		self.state.set_runtime(RuntimeState::Enabled);
		Ok(())
	}

	pub async fn runtime_disable(&self, cancel: &CancellationToken) -> HcomResult<()> {
		let request = Request::new(RequestType::RuntimeDisable);
		self.command("runtime-disable", request, self.options.request_timeout, cancel).await?;
		self.state.set_runtime(RuntimeState::Disabled);
		Ok(())
	}

	pub async fn restart_device(&self, cancel: &CancellationToken) -> HcomResult<()> {
		let request = Request::new(RequestType::RestartPrimaryMcu);
		self.command("restart", request, self.options.request_timeout, cancel).await
	}

	pub async fn set_trace_level(&self, level: u16, cancel: &CancellationToken) -> HcomResult<()> {
		let request = Request::new(RequestType::ChangeTraceLevel).with_extra(level);
		self.command("trace-level", request, self.options.request_timeout, cancel).await
	}

	/// Route device trace output to the host (or stop doing so)
	pub async fn trace_to_host(&self, enabled: bool, cancel: &CancellationToken) -> HcomResult<()> {
		let kind = if enabled { RequestType::SendTraceToHost } else { RequestType::NoTraceToHost };
		self.command("trace-to-host", Request::new(kind), self.options.request_timeout, cancel).await
	}
}

impl Drop for HcomClient {
	fn drop(&mut self) {
		self.stop_reader();
	}
}

#[async_trait]
impl DeviceConnection for HcomClient {
	async fn get_device_info(&self, cancel: &CancellationToken) -> HcomResult<DeviceInfo> {
		HcomClient::get_device_info(self, cancel).await
	}

	async fn get_file_list(
		&self,
		include_crc: bool,
		cancel: &CancellationToken,
	) -> HcomResult<Vec<DeviceFileInfo>> {
		HcomClient::get_file_list(self, include_crc, cancel).await
	}

	async fn write_file(
		&self,
		local_path: &Path,
		target_name: Option<&str>,
		cancel: &CancellationToken,
	) -> HcomResult<bool> {
		HcomClient::write_file(self, local_path, target_name, cancel).await
	}

	async fn delete_file(&self, name: &str, cancel: &CancellationToken) -> HcomResult<()> {
		HcomClient::delete_file(self, name, cancel).await
	}

	async fn is_runtime_enabled(&self, cancel: &CancellationToken) -> HcomResult<bool> {
		HcomClient::is_runtime_enabled(self, cancel).await
	}

	async fn runtime_enable(&self, cancel: &CancellationToken) -> HcomResult<()> {
		HcomClient::runtime_enable(self, cancel).await
	}

	async fn runtime_disable(&self, cancel: &CancellationToken) -> HcomResult<()> {
		HcomClient::runtime_disable(self, cancel).await
	}
}

// vim: ts=4

#![allow(dead_code)]

//! Simulated device for integration tests
//!
//! Serves the HCOM protocol over an in-memory duplex pipe, through the same
//! link framing and frame codec the host uses.

use futures::{SinkExt, StreamExt};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use hcomsync::config::Config;
use hcomsync::crc::crc32;
use hcomsync::device::{DeviceFileInfo, DeviceInfo};
use hcomsync::protocol::frame::MAX_PAYLOAD;
use hcomsync::protocol::{HcomClient, Request, RequestBody, RequestType, Response};
use hcomsync::transport::Link;

/// Device-side state the tests inspect and script
#[derive(Debug, Default)]
pub struct DeviceModel {
	pub files: BTreeMap<String, Vec<u8>>,
	pub runtime_enabled: bool,
	pub info: DeviceInfo,

	/// Reject this many upcoming writes at end of transfer
	pub reject_writes: u32,
	/// Reject the next transfer after its first data chunk
	pub reject_mid_stream: bool,
	/// Drop the link instead of answering an end of transfer
	pub hangup_on_write: bool,
	/// Cancel the token once this many data bytes have arrived
	pub cancel_after_bytes: Option<(usize, CancellationToken)>,
	/// Never send file data for reads
	pub stall_reads: bool,
	/// Answer deletes with an error
	pub fail_deletes: bool,
	/// Drop the link after the first listing entry
	pub disconnect_during_list: bool,
	/// Never answer
	pub silent: bool,
	/// Trace message sent ahead of every listing
	pub trace_before_list: Option<String>,

	pub requests: Vec<RequestType>,
	pub writes: u32,
	pub writes_while_running: u32,
}

impl DeviceModel {
	pub fn count(&self, kind: RequestType) -> usize {
		self.requests.iter().filter(|k| **k == kind).count()
	}
}

enum Action {
	Reply(Response),
	Hangup,
}

struct PendingUpload {
	name: String,
	crc: u32,
	data: Vec<u8>,
}

#[derive(Default)]
struct Session {
	upload: Option<PendingUpload>,
	/// Transfer refused mid-stream; its end marker gets no answer
	aborted: bool,
	received: usize,
	read_target: Option<String>,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
	model: Arc<Mutex<DeviceModel>>,
}

impl FakeDevice {
	pub fn new() -> Self {
		let device = Self::default();
		{
			let mut model = device.model();
			model.runtime_enabled = true;
			model.info = DeviceInfo::parse(
				"Product: Meadow F7 Micro\nModel: F7Micro\nOSVersion: 1.9.0.0\nMonoVersion: 1.9.0.0\nSerialNo: 3450591F3436\n",
			);
		}
		device
	}

	pub fn with_files(files: &[(&str, &[u8])]) -> Self {
		let device = Self::new();
		{
			let mut model = device.model();
			for (name, data) in files {
				model.files.insert(name.to_string(), data.to_vec());
			}
		}
		device
	}

	pub fn model(&self) -> MutexGuard<'_, DeviceModel> {
		self.model.lock().unwrap()
	}

	pub fn file_names(&self) -> Vec<String> {
		self.model().files.keys().cloned().collect()
	}

	pub fn file(&self, name: &str) -> Option<Vec<u8>> {
		self.model().files.get(name).cloned()
	}

	/// Start serving and return a client attached to the other end
	pub fn connect(&self, config: &Config) -> HcomClient {
		let (host_io, device_io) = tokio::io::duplex(64 * 1024);
		let link = Link::from_stream(device_io, "fake-device");
		tokio::spawn(serve(self.model.clone(), link));
		HcomClient::attach(Link::from_stream(host_io, "fake"), config)
	}

	/// Accept one TCP connection on a loopback port and serve it
	pub async fn listen_tcp(&self) -> SocketAddr {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let model = self.model.clone();
		tokio::spawn(async move {
			if let Ok((stream, _)) = listener.accept().await {
				serve(model, Link::from_stream(stream, "fake-tcp")).await;
			}
		});
		addr
	}
}

/// Short timeouts, small chunks
pub fn test_config() -> Config {
	Config {
		request_timeout_ms: 1_000,
		file_list_timeout_ms: 1_000,
		write_timeout_ms: 1_000,
		erase_timeout_ms: 1_000,
		chunk_size: 64,
		retry_delay_ms: 5,
		..Config::default()
	}
}

async fn serve(model: Arc<Mutex<DeviceModel>>, link: Link) {
	let Link { mut reader, mut writer, .. } = link;
	let mut session = Session::default();

	while let Some(item) = reader.next().await {
		let frame = match item {
			Ok(Ok(frame)) => frame,
			Ok(Err(_)) => continue,
			Err(_) => return,
		};
		let seq = frame.header.seq;
		let Ok(request) = Request::from_frame(&frame) else {
			continue;
		};

		let actions = {
			let mut model = model.lock().unwrap();
			handle(&mut model, &mut session, request)
		};
		for action in actions {
			match action {
				Action::Reply(response) => {
					if writer.send(response.to_frame(seq)).await.is_err() {
						return;
					}
				}
				Action::Hangup => return,
			}
		}
	}
}

fn ok() -> Vec<Action> {
	vec![Action::Reply(Response::Concluded(String::new()))]
}

fn accepted() -> Vec<Action> {
	vec![Action::Reply(Response::Accepted(String::new()))]
}

fn handle(model: &mut DeviceModel, session: &mut Session, request: Request) -> Vec<Action> {
	use Action::Reply;

	model.requests.push(request.kind());
	if model.silent {
		return Vec::new();
	}

	match (request.kind(), request.body()) {
		(RequestType::GetDeviceInformation, _) => vec![Reply(Response::DeviceInfo(model.info.clone()))],

		(RequestType::ListFiles | RequestType::ListFilesWithCrc, _) => {
			let with_crc = request.kind() == RequestType::ListFilesWithCrc;
			let mut actions = Vec::new();
			if let Some(text) = &model.trace_before_list {
				actions.push(Reply(Response::Trace(text.clone())));
			}
			actions.push(Reply(Response::ListHeader("Directory listing".to_string())));
			for (name, data) in &model.files {
				if with_crc {
					let entry = DeviceFileInfo::new(name.clone(), Some(crc32(data)));
					actions.push(Reply(Response::CrcListMember(entry)));
				} else {
					actions.push(Reply(Response::ListMember(DeviceFileInfo::new(name.clone(), None))));
				}
				if model.disconnect_during_list {
					actions.push(Action::Hangup);
					return actions;
				}
			}
			actions.extend(ok());
			actions
		}

		(RequestType::StartFileTransfer, RequestBody::FileStart(info)) => {
			session.upload =
				Some(PendingUpload { name: info.name.clone(), crc: info.crc, data: Vec::new() });
			session.aborted = false;
			vec![Reply(Response::FileStartOkay(String::new()))]
		}

		(RequestType::UploadingFileData, RequestBody::Binary(data)) => {
			session.received += data.len();
			if let Some((limit, token)) = &model.cancel_after_bytes {
				if session.received >= *limit {
					token.cancel();
				}
			}
			if model.reject_mid_stream && session.upload.is_some() {
				model.reject_mid_stream = false;
				session.upload = None;
				session.aborted = true;
				return vec![Reply(Response::Rejected("out of flash space".to_string()))];
			}
			if let Some(upload) = session.upload.as_mut() {
				upload.data.extend_from_slice(data);
			}
			Vec::new()
		}

		(RequestType::EndFileTransfer, _) => {
			if std::mem::take(&mut session.aborted) {
				return Vec::new();
			}
			model.writes += 1;
			if model.hangup_on_write {
				return vec![Action::Hangup];
			}
			if model.runtime_enabled {
				model.writes_while_running += 1;
			}
			let Some(upload) = session.upload.take() else {
				return vec![Reply(Response::Error("no transfer in progress".to_string()))];
			};
			if model.reject_writes > 0 {
				model.reject_writes -= 1;
				return vec![Reply(Response::Rejected("flash write failed".to_string()))];
			}
			if crc32(&upload.data) != upload.crc {
				return vec![Reply(Response::Rejected("crc mismatch".to_string()))];
			}
			model.files.insert(upload.name, upload.data);
			ok()
		}

		(RequestType::DeleteFileByName, RequestBody::FileStart(info)) => {
			if model.fail_deletes {
				return vec![Reply(Response::Error("file system locked".to_string()))];
			}
			model.files.remove(&info.name);
			ok()
		}

		(RequestType::UploadFileInit, RequestBody::Text(name)) => {
			if model.files.contains_key(name) {
				session.read_target = Some(name.clone());
				vec![Reply(Response::FileStartOkay(String::new()))]
			} else {
				vec![Reply(Response::FileStartFail(format!("{} not found", name)))]
			}
		}

		(RequestType::UploadStartDataSend, _) if model.stall_reads => Vec::new(),
		(RequestType::UploadAbortDataSend, _) => {
			session.read_target = None;
			Vec::new()
		}
		(RequestType::UploadStartDataSend, _) => {
			let data = session
				.read_target
				.take()
				.and_then(|name| model.files.get(&name).cloned())
				.unwrap_or_default();
			let mut actions: Vec<Action> = data
				.chunks(MAX_PAYLOAD)
				.map(|chunk| Reply(Response::FileData(bytes::Bytes::copy_from_slice(chunk))))
				.collect();
			actions.extend(ok());
			actions
		}

		(RequestType::RuntimeState, _) => vec![Reply(Response::RuntimeState(model.runtime_enabled))],
		(RequestType::RuntimeEnable, _) => {
			model.runtime_enabled = true;
			accepted()
		}
		(RequestType::RuntimeDisable, _) => {
			model.runtime_enabled = false;
			accepted()
		}

		(RequestType::BulkFlashErase, _) => {
			model.files.clear();
			let mut actions = vec![
				Reply(Response::Accepted(String::new())),
				Reply(Response::Information("Bulk erase started".to_string())),
			];
			actions.extend(ok());
			actions
		}

		(RequestType::SendTraceToHost, _) => {
			let mut actions = accepted();
			actions.push(Reply(Response::Trace("trace output enabled".to_string())));
			actions
		}
		(RequestType::RestartPrimaryMcu | RequestType::ChangeTraceLevel | RequestType::NoTraceToHost, _) => {
			accepted()
		}

		_ => vec![Reply(Response::Error(format!("unsupported request {:?}", request.kind())))],
	}
}

// vim: ts=4

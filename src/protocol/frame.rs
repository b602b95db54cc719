//! Frame codec
//!
//! Bijective mapping between typed requests/responses and frame bytes.
//!
//! ```text
//! ┌──────────────┬──────────────┬───────────┬────────────┬─────────────────────┐
//! │ Sequence (2) │ Version (2)  │ Code (2)  │ Extra (2)  │ Payload Length (4)  │
//! ├──────────────┴──────────────┴───────────┴────────────┴─────────────────────┤
//! │ Payload: nothing | file-start metadata + name | text | binary blob         │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. A frame never spans more than one link
//! frame; splitting large transfers into chunks is the client's job.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codes::{Category, RequestType, ResponseType};
use super::error::{HcomError, HcomResult};
use super::PROTOCOL_VERSION;
use crate::device::{DeviceFileInfo, DeviceInfo, MessageKind};

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 12;

/// File-start metadata size (size, crc, address), before the file name
pub const FILE_START_LEN: usize = 12;

/// Largest payload a single frame may carry
pub const MAX_PAYLOAD: usize = 8192;

/// Frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
	pub seq: u16,
	pub version: u16,
	pub code: u16,
	pub extra: u16,
	pub payload_len: u32,
}

/// One decoded frame: header plus raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub header: FrameHeader,
	pub payload: Bytes,
}

impl Frame {
	pub fn new(seq: u16, code: u16, extra: u16, payload: Bytes) -> Self {
		let header = FrameHeader {
			seq,
			version: PROTOCOL_VERSION,
			code,
			extra,
			payload_len: payload.len() as u32,
		};
		Self { header, payload }
	}

	pub fn encode(&self) -> Bytes {
		let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
		buf.put_u16_le(self.header.seq);
		buf.put_u16_le(self.header.version);
		buf.put_u16_le(self.header.code);
		buf.put_u16_le(self.header.extra);
		buf.put_u32_le(self.payload.len() as u32);
		buf.put_slice(&self.payload);
		buf.freeze()
	}

	pub fn decode(data: &[u8]) -> HcomResult<Self> {
		if data.len() < HEADER_LEN {
			return Err(HcomError::MalformedFrame(format!(
				"{} bytes is shorter than the {}-byte header",
				data.len(),
				HEADER_LEN
			)));
		}

		let mut buf = data;
		let header = FrameHeader {
			seq: buf.get_u16_le(),
			version: buf.get_u16_le(),
			code: buf.get_u16_le(),
			extra: buf.get_u16_le(),
			payload_len: buf.get_u32_le(),
		};

		if header.version != PROTOCOL_VERSION {
			return Err(HcomError::MalformedFrame(format!(
				"protocol version {} (expected {})",
				header.version, PROTOCOL_VERSION
			)));
		}
		if header.payload_len as usize != buf.len() {
			return Err(HcomError::MalformedFrame(format!(
				"header announces {} payload bytes, frame carries {}",
				header.payload_len,
				buf.len()
			)));
		}
		if buf.len() > MAX_PAYLOAD {
			return Err(HcomError::MalformedFrame(format!(
				"payload of {} bytes exceeds {}",
				buf.len(),
				MAX_PAYLOAD
			)));
		}

		Ok(Self { header, payload: Bytes::copy_from_slice(buf) })
	}

	fn text(&self) -> HcomResult<String> {
		let text = std::str::from_utf8(&self.payload).map_err(|e| {
			HcomError::MalformedFrame(format!("text payload is not UTF-8: {}", e))
		})?;
		Ok(text.trim_end_matches('\0').to_string())
	}
}

/// Metadata carried by a file-start frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStartInfo {
	pub size: u32,
	pub crc: u32,
	pub address: u32,
	pub name: String,
}

/// Request payload, shaped by the request category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
	None,
	Text(String),
	Binary(Bytes),
	FileStart(FileStartInfo),
}

/// Host → device request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
	kind: RequestType,
	extra: u16,
	body: RequestBody,
}

impl Request {
	/// Header-only request
	pub fn new(kind: RequestType) -> Self {
		debug_assert_eq!(kind.category(), Category::HeaderOnly);
		Self { kind, extra: 0, body: RequestBody::None }
	}

	pub fn text(kind: RequestType, text: impl Into<String>) -> Self {
		debug_assert_eq!(kind.category(), Category::SimpleText);
		Self { kind, extra: 0, body: RequestBody::Text(text.into()) }
	}

	pub fn binary(kind: RequestType, data: Bytes) -> Self {
		debug_assert_eq!(kind.category(), Category::SimpleBinary);
		Self { kind, extra: 0, body: RequestBody::Binary(data) }
	}

	pub fn file_start(kind: RequestType, info: FileStartInfo) -> Self {
		debug_assert_eq!(kind.category(), Category::FileStart);
		Self { kind, extra: 0, body: RequestBody::FileStart(info) }
	}

	pub fn with_extra(mut self, extra: u16) -> Self {
		self.extra = extra;
		self
	}

	pub fn kind(&self) -> RequestType {
		self.kind
	}

	pub fn category(&self) -> Category {
		self.kind.category()
	}

	pub fn subtype(&self) -> u8 {
		self.kind.subtype()
	}

	pub fn extra(&self) -> u16 {
		self.extra
	}

	pub fn body(&self) -> &RequestBody {
		&self.body
	}

	pub fn to_frame(&self, seq: u16) -> Frame {
		let payload = match &self.body {
			RequestBody::None => Bytes::new(),
			RequestBody::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
			RequestBody::Binary(data) => data.clone(),
			RequestBody::FileStart(info) => {
				let mut buf = BytesMut::with_capacity(FILE_START_LEN + info.name.len());
				buf.put_u32_le(info.size);
				buf.put_u32_le(info.crc);
				buf.put_u32_le(info.address);
				buf.put_slice(info.name.as_bytes());
				buf.freeze()
			}
		};
		Frame::new(seq, self.kind.code(), self.extra, payload)
	}

	pub fn from_frame(frame: &Frame) -> HcomResult<Self> {
		let kind = RequestType::from_code(frame.header.code)?;
		let body = match kind.category() {
			Category::HeaderOnly => {
				if !frame.payload.is_empty() {
					return Err(HcomError::MalformedFrame(format!(
						"header-only request {:?} carries {} payload bytes",
						kind,
						frame.payload.len()
					)));
				}
				RequestBody::None
			}
			Category::SimpleText => RequestBody::Text(frame.text()?),
			Category::SimpleBinary => RequestBody::Binary(frame.payload.clone()),
			Category::FileStart => {
				if frame.payload.len() < FILE_START_LEN {
					return Err(HcomError::MalformedFrame(format!(
						"file-start payload of {} bytes is shorter than its metadata",
						frame.payload.len()
					)));
				}
				let mut buf = &frame.payload[..];
				let size = buf.get_u32_le();
				let crc = buf.get_u32_le();
				let address = buf.get_u32_le();
				let name = std::str::from_utf8(buf)
					.map_err(|e| {
						HcomError::MalformedFrame(format!("file name is not UTF-8: {}", e))
					})?
					.trim_end_matches('\0')
					.to_string();
				RequestBody::FileStart(FileStartInfo { size, crc, address, name })
			}
			Category::Undefined => return Err(HcomError::UnknownMessageCode(frame.header.code)),
		};
		Ok(Self { kind, extra: frame.header.extra, body })
	}
}

/// Device → host message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	Rejected(String),
	Accepted(String),
	Concluded(String),
	Error(String),
	Information(String),
	ListHeader(String),
	ListMember(DeviceFileInfo),
	CrcListMember(DeviceFileInfo),
	Stdout(String),
	DeviceInfo(DeviceInfo),
	Trace(String),
	Reconnect(String),
	Stderr(String),
	FileStartOkay(String),
	FileStartFail(String),
	RuntimeState(bool),
	FileData(Bytes),
}

impl Response {
	pub fn response_type(&self) -> ResponseType {
		match self {
			Response::Rejected(_) => ResponseType::TextRejected,
			Response::Accepted(_) => ResponseType::TextAccepted,
			Response::Concluded(_) => ResponseType::TextConcluded,
			Response::Error(_) => ResponseType::TextError,
			Response::Information(_) => ResponseType::TextInformation,
			Response::ListHeader(_) => ResponseType::TextListHeader,
			Response::ListMember(_) => ResponseType::TextListMember,
			Response::CrcListMember(_) => ResponseType::TextCrcListMember,
			Response::Stdout(_) => ResponseType::TextRuntimeStdout,
			Response::DeviceInfo(_) => ResponseType::TextDeviceInfo,
			Response::Trace(_) => ResponseType::TextTrace,
			Response::Reconnect(_) => ResponseType::TextReconnect,
			Response::Stderr(_) => ResponseType::TextRuntimeStderr,
			Response::FileStartOkay(_) => ResponseType::FileStartOkay,
			Response::FileStartFail(_) => ResponseType::FileStartFail,
			Response::RuntimeState(_) => ResponseType::RuntimeState,
			Response::FileData(_) => ResponseType::FileData,
		}
	}

	/// Unsolicited device output, routed to the event bus instead of the
	/// pending exchange
	pub fn notification(&self) -> Option<(MessageKind, &str)> {
		match self {
			Response::Information(text) => Some((MessageKind::Information, text.as_str())),
			Response::Trace(text) => Some((MessageKind::Trace, text.as_str())),
			Response::Stdout(text) => Some((MessageKind::Stdout, text.as_str())),
			Response::Stderr(text) => Some((MessageKind::Stderr, text.as_str())),
			Response::Reconnect(text) => Some((MessageKind::Reconnect, text.as_str())),
			_ => None,
		}
	}

	pub fn to_frame(&self, seq: u16) -> Frame {
		let text = |s: &str| Bytes::copy_from_slice(s.as_bytes());
		let (extra, payload) = match self {
			Response::Rejected(s)
			| Response::Accepted(s)
			| Response::Concluded(s)
			| Response::Error(s)
			| Response::Information(s)
			| Response::ListHeader(s)
			| Response::Stdout(s)
			| Response::Trace(s)
			| Response::Reconnect(s)
			| Response::Stderr(s)
			| Response::FileStartOkay(s)
			| Response::FileStartFail(s) => (0, text(s)),
			Response::ListMember(entry) => (0, text(&entry.name)),
			Response::CrcListMember(entry) => (0, text(&entry.to_wire_text())),
			Response::DeviceInfo(info) => (0, text(&info.to_wire_text())),
			Response::RuntimeState(enabled) => (u16::from(*enabled), Bytes::new()),
			Response::FileData(data) => (0, data.clone()),
		};
		Frame::new(seq, self.response_type().code(), extra, payload)
	}

	pub fn from_frame(frame: &Frame) -> HcomResult<Self> {
		let kind = ResponseType::from_code(frame.header.code)?;
		let response = match kind {
			ResponseType::RuntimeState => Response::RuntimeState(frame.header.extra != 0),
			ResponseType::FileData => Response::FileData(frame.payload.clone()),
			ResponseType::TextRejected => Response::Rejected(frame.text()?),
			ResponseType::TextAccepted => Response::Accepted(frame.text()?),
			ResponseType::TextConcluded => Response::Concluded(frame.text()?),
			ResponseType::TextError => Response::Error(frame.text()?),
			ResponseType::TextInformation => Response::Information(frame.text()?),
			ResponseType::TextListHeader => Response::ListHeader(frame.text()?),
			ResponseType::TextListMember => {
				Response::ListMember(DeviceFileInfo::new(frame.text()?.trim(), None))
			}
			ResponseType::TextCrcListMember => {
				let text = frame.text()?;
				let entry = DeviceFileInfo::parse(&text).ok_or_else(|| {
					HcomError::MalformedFrame(format!("bad CRC in listing entry '{}'", text))
				})?;
				Response::CrcListMember(entry)
			}
			ResponseType::TextRuntimeStdout => Response::Stdout(frame.text()?),
			ResponseType::TextDeviceInfo => Response::DeviceInfo(DeviceInfo::parse(&frame.text()?)),
			ResponseType::TextTrace => Response::Trace(frame.text()?),
			ResponseType::TextReconnect => Response::Reconnect(frame.text()?),
			ResponseType::TextRuntimeStderr => Response::Stderr(frame.text()?),
			ResponseType::FileStartOkay => Response::FileStartOkay(frame.text()?),
			ResponseType::FileStartFail => Response::FileStartFail(frame.text()?),
		};
		Ok(response)
	}
}


// vim: ts=4

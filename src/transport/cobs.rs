//! Link framing: COBS byte stuffing with a `0x00` frame delimiter
//!
//! Consistent Overhead Byte Stuffing removes every zero byte from a frame so
//! that a single zero can terminate it. A receiver that joins mid-stream, or
//! loses bytes to line noise, resynchronises at the next delimiter.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::protocol::frame::{Frame, HEADER_LEN, MAX_PAYLOAD};
use crate::protocol::{HcomError, HcomResult};

/// Frame delimiter on the wire
pub const DELIMITER: u8 = 0x00;

/// Longest COBS block: code byte 0xff followed by 254 data bytes
const MAX_BLOCK: usize = 0xfe;

/// Largest encoded frame accepted, delimiter excluded
pub const MAX_ENCODED_LEN: usize = max_encoded_len(HEADER_LEN + MAX_PAYLOAD);

/// Worst-case COBS size for `len` raw bytes
pub const fn max_encoded_len(len: usize) -> usize {
	len + len / MAX_BLOCK + 1
}

/// Append the COBS encoding of `data` to `out` (no delimiter)
pub fn cobs_encode(data: &[u8], out: &mut BytesMut) {
	out.reserve(max_encoded_len(data.len()));
	let mut code_pos = out.len();
	out.put_u8(0);
	let mut code: u8 = 1;
	for &byte in data {
		if byte == 0 {
			out[code_pos] = code;
			code_pos = out.len();
			out.put_u8(0);
			code = 1;
		} else {
			out.put_u8(byte);
			code += 1;
			if code == 0xff {
				out[code_pos] = code;
				code_pos = out.len();
				out.put_u8(0);
				code = 1;
			}
		}
	}
	out[code_pos] = code;
}

/// Decode one COBS block sequence; `None` on invalid stuffing
pub fn cobs_decode(data: &[u8]) -> Option<Vec<u8>> {
	let mut out = Vec::with_capacity(data.len());
	let mut i = 0;
	while i < data.len() {
		let code = data[i] as usize;
		if code == 0 {
			return None;
		}
		i += 1;
		let end = i + code - 1;
		if end > data.len() {
			return None;
		}
		out.extend_from_slice(&data[i..end]);
		i = end;
		if code < 0xff && i < data.len() {
			out.push(0);
		}
	}
	Some(out)
}

/// Tokio codec turning a byte stream into HCOM frames
///
/// Per-frame decode failures are yielded as `Err` items so that one bad frame
/// does not end the stream; only I/O errors terminate it.
#[derive(Debug, Default)]
pub struct LinkCodec {
	discarding: bool,
}

impl LinkCodec {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Decoder for LinkCodec {
	type Item = HcomResult<Frame>;
	type Error = HcomError;

	fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		loop {
			let Some(pos) = src.iter().position(|b| *b == DELIMITER) else {
				if src.len() > MAX_ENCODED_LEN {
					src.clear();
					if !self.discarding {
						self.discarding = true;
						return Ok(Some(Err(HcomError::MalformedFrame(format!(
							"no delimiter within {} bytes",
							MAX_ENCODED_LEN
						)))));
					}
				}
				return Ok(None);
			};

			let chunk = src.split_to(pos + 1);
			if self.discarding {
				// Tail of an oversized frame
				self.discarding = false;
				continue;
			}

			let encoded = &chunk[..pos];
			if encoded.is_empty() {
				continue;
			}
			if encoded.len() > MAX_ENCODED_LEN {
				return Ok(Some(Err(HcomError::MalformedFrame(format!(
					"encoded frame of {} bytes exceeds {}",
					encoded.len(),
					MAX_ENCODED_LEN
				)))));
			}

			let Some(raw) = cobs_decode(encoded) else {
				return Ok(Some(Err(HcomError::MalformedFrame("invalid COBS stuffing".to_string()))));
			};
			trace!("<- {}", hex::encode(&raw));
			return Ok(Some(Frame::decode(&raw)));
		}
	}

	fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
		match self.decode(src)? {
			Some(item) => Ok(Some(item)),
			None => {
				if !src.is_empty() {
					trace!("Dropping {} undelimited bytes at end of stream", src.len());
					src.clear();
				}
				Ok(None)
			}
		}
	}
}

impl Encoder<Frame> for LinkCodec {
	type Error = HcomError;

	fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
		if item.payload.len() > MAX_PAYLOAD {
			return Err(HcomError::MalformedFrame(format!(
				"payload of {} bytes exceeds {}",
				item.payload.len(),
				MAX_PAYLOAD
			)));
		}
		let raw = item.encode();
		trace!("-> {}", hex::encode(&raw));
		cobs_encode(&raw, dst);
		dst.put_u8(DELIMITER);
		Ok(())
	}
}


// vim: ts=4

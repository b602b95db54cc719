//! CRC-32 helpers
//!
//! Standard IEEE 802.3 CRC-32, computed over whole file contents with a fresh
//! state per computation.

use std::io;
use std::path::Path;

/// CRC-32 of a byte slice
pub fn crc32(data: &[u8]) -> u32 {
	let mut hasher = crc32fast::Hasher::new();
	hasher.update(data);
	hasher.finalize()
}

/// Read a whole file and return its CRC-32
pub async fn file_crc(path: &Path) -> io::Result<u32> {
	let data = tokio::fs::read(path).await?;
	Ok(crc32(&data))
}

/// Parse a device-reported CRC such as `0x1a2b3c4d`
///
/// The `0x` prefix is optional; the value is unsigned hex.
pub fn parse_hex_crc(text: &str) -> Option<u32> {
	let digits = text
		.trim()
		.strip_prefix("0x")
		.or_else(|| text.trim().strip_prefix("0X"))
		.unwrap_or_else(|| text.trim());
	if digits.is_empty() || digits.len() > 8 {
		return None;
	}
	u32::from_str_radix(digits, 16).ok()
}

/// Format a CRC the way the device reports it
pub fn format_hex_crc(crc: u32) -> String {
	format!("0x{:08x}", crc)
}


// vim: ts=4

//! Device-reported data: information fields and file listing entries

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::crc;
use crate::protocol::PROTOCOL_VERSION;

/// Literal a device reports for a MAC address it does not know
pub const UNKNOWN_MAC_ADDRESS: &str = "00:00:00:00:00:00";

/// Device information as a flat key/value set
///
/// Key names come from firmware and are matched exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceInfo {
	properties: BTreeMap<String, String>,
}

impl DeviceInfo {
	pub fn new(properties: BTreeMap<String, String>) -> Self {
		Self { properties }
	}

	/// Parse the device-info text: one `Key: Value` pair per line
	pub fn parse(text: &str) -> Self {
		let properties = text
			.lines()
			.filter_map(|line| {
				let (key, value) = line.split_once(':')?;
				let key = key.trim();
				if key.is_empty() {
					return None;
				}
				Some((key.to_string(), value.trim().to_string()))
			})
			.collect();
		Self { properties }
	}

	/// Render back to the wire text form
	pub fn to_wire_text(&self) -> String {
		self.properties.iter().map(|(k, v)| format!("{}: {}\n", k, v)).collect()
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.properties.get(key).map(|s| s.as_str())
	}

	pub fn properties(&self) -> &BTreeMap<String, String> {
		&self.properties
	}

	pub fn product(&self) -> Option<&str> {
		self.get("Product")
	}

	pub fn model(&self) -> Option<&str> {
		self.get("Model")
	}

	pub fn processor_type(&self) -> Option<&str> {
		self.get("ProcessorType")
	}

	pub fn coprocessor_type(&self) -> Option<&str> {
		self.get("CoprocessorType")
	}

	pub fn os_version(&self) -> Option<&str> {
		self.get("OSVersion")
	}

	pub fn coprocessor_os_version(&self) -> Option<&str> {
		self.get("CoprocessorVersion")
	}

	pub fn processor_id(&self) -> Option<&str> {
		self.get("ProcessorId")
	}

	pub fn hardware_version(&self) -> Option<&str> {
		self.get("Hardware")
	}

	pub fn device_name(&self) -> Option<&str> {
		self.get("DeviceName")
	}

	/// Version of the on-device runtime
	pub fn runtime_version(&self) -> Option<&str> {
		self.get("MonoVersion")
	}

	pub fn serial_number(&self) -> Option<&str> {
		self.get("SerialNo")
	}

	/// WiFi MAC address, absent when the device reports the unknown address
	pub fn mac_address(&self) -> Option<&str> {
		known_mac(self.get("WiFiMAC"))
	}

	/// Soft-AP MAC address, absent when the device reports the unknown address
	pub fn soft_ap_mac_address(&self) -> Option<&str> {
		known_mac(self.get("SoftAPMac"))
	}
}

fn known_mac(value: Option<&str>) -> Option<&str> {
	value.filter(|mac| !mac.is_empty() && *mac != UNKNOWN_MAC_ADDRESS)
}

impl fmt::Display for DeviceInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let board = [
			("Product", self.product()),
			("Model", self.model()),
			("Hardware version", self.hardware_version()),
			("Device name", self.device_name()),
		];
		let hardware = [
			("Processor type", self.processor_type()),
			("ID", self.processor_id()),
			("Serial number", self.serial_number()),
			("Coprocessor type", self.coprocessor_type()),
			("WiFi", self.mac_address()),
			("AP", self.soft_ap_mac_address()),
		];
		let protocol = PROTOCOL_VERSION.to_string();
		let firmware = [
			("OS", self.os_version()),
			("Runtime", self.runtime_version()),
			("Coprocessor", self.coprocessor_os_version()),
			("Protocol", Some(protocol.as_str())),
		];

		for (section, values) in [
			("Device Information", &board[..]),
			("Hardware Information", &hardware[..]),
			("Firmware Information", &firmware[..]),
		] {
			if values.iter().all(|(_, v)| v.is_none()) {
				continue;
			}
			writeln!(f, "{}", section)?;
			for (label, value) in values {
				if let Some(value) = value {
					writeln!(f, "\t{}: {}", label, value)?;
				}
			}
		}
		Ok(())
	}
}

/// A file resident on the device, as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFileInfo {
	pub name: String,
	pub crc: Option<u32>,
}

impl DeviceFileInfo {
	pub fn new(name: impl Into<String>, crc: Option<u32>) -> Self {
		Self { name: name.into(), crc }
	}

	/// Parse a listing line: `<name>` or `<name> 0x<crc>`
	///
	/// Returns `None` when the trailing token carries a `0x` prefix but is not
	/// valid hex.
	pub fn parse(text: &str) -> Option<Self> {
		let text = text.trim_end_matches(['\r', '\n', '\0']).trim();
		if let Some((name, token)) = text.rsplit_once(char::is_whitespace) {
			if token.starts_with("0x") || token.starts_with("0X") {
				let crc = crc::parse_hex_crc(token)?;
				return Some(Self::new(name.trim_end(), Some(crc)));
			}
		}
		Some(Self::new(text, None))
	}

	/// Render as a listing line
	pub fn to_wire_text(&self) -> String {
		match self.crc {
			Some(crc) => format!("{} {}", self.name, crc::format_hex_crc(crc)),
			None => self.name.clone(),
		}
	}

	/// Comparison key: the bare file name, directory components stripped
	pub fn file_name(&self) -> &str {
		Path::new(&self.name).file_name().and_then(|n| n.to_str()).unwrap_or(&self.name)
	}
}


// vim: ts=4

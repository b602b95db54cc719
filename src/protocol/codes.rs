//! HCOM message codes
//!
//! A message code is a 16-bit value: the subtype in the low byte, bitwise-ORed
//! with the category mask in the high byte. The numeric values are shared with
//! device firmware and must not change.

use super::error::{HcomError, HcomResult};

const CATEGORY_MASK: u16 = 0xff00;
const SUBTYPE_MASK: u16 = 0x00ff;

/// Frame category, selecting the payload layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Category {
	Undefined = 0x0000,
	HeaderOnly = 0x0100,
	FileStart = 0x0200,
	SimpleText = 0x0300,
	SimpleBinary = 0x0400,
}

impl Category {
	/// Extract the category from a packed code
	pub fn from_code(code: u16) -> HcomResult<Self> {
		match code & CATEGORY_MASK {
			0x0000 => Ok(Category::Undefined),
			0x0100 => Ok(Category::HeaderOnly),
			0x0200 => Ok(Category::FileStart),
			0x0300 => Ok(Category::SimpleText),
			0x0400 => Ok(Category::SimpleBinary),
			_ => Err(HcomError::UnknownMessageCode(code)),
		}
	}

	pub fn mask(self) -> u16 {
		self as u16
	}
}

/// Subtype part of a packed code
pub fn subtype(code: u16) -> u8 {
	(code & SUBTYPE_MASK) as u8
}

macro_rules! message_codes {
	(
		$(#[$meta:meta])*
		$name:ident {
			$($variant:ident = $sub:literal | $cat:ident,)+
		}
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
		#[repr(u16)]
		pub enum $name {
			$($variant = $sub | (Category::$cat as u16),)+
		}

		impl $name {
			/// Look up a packed code
			pub fn from_code(code: u16) -> HcomResult<Self> {
				match code {
					$(c if c == $name::$variant as u16 => Ok($name::$variant),)+
					_ => Err(HcomError::UnknownMessageCode(code)),
				}
			}

			/// Packed 16-bit wire value
			pub fn code(self) -> u16 {
				self as u16
			}

			pub fn category(self) -> Category {
				match self {
					$($name::$variant => Category::$cat,)+
				}
			}

			pub fn subtype(self) -> u8 {
				subtype(self.code())
			}
		}
	};
}

message_codes! {
	/// Messages sent from host to device
	RequestType {
		ChangeTraceLevel = 0x02 | HeaderOnly,
		FormatFlashFileSystem = 0x03 | HeaderOnly,
		EndFileTransfer = 0x04 | HeaderOnly,
		RestartPrimaryMcu = 0x05 | HeaderOnly,
		BulkFlashErase = 0x0a | HeaderOnly,
		RuntimeDisable = 0x0f | HeaderOnly,
		RuntimeEnable = 0x10 | HeaderOnly,
		RuntimeState = 0x11 | HeaderOnly,
		GetDeviceInformation = 0x12 | HeaderOnly,
		NoTraceToHost = 0x14 | HeaderOnly,
		SendTraceToHost = 0x15 | HeaderOnly,
		UploadStartDataSend = 0x21 | HeaderOnly,
		UploadAbortDataSend = 0x22 | HeaderOnly,
		StartFileTransfer = 0x01 | FileStart,
		DeleteFileByName = 0x02 | FileStart,
		UploadFileInit = 0x01 | SimpleText,
		ListFiles = 0x06 | SimpleText,
		ListFilesWithCrc = 0x07 | SimpleText,
		UploadingFileData = 0x03 | SimpleBinary,
	}
}

message_codes! {
	/// Messages sent from device to host
	ResponseType {
		RuntimeState = 0x01 | HeaderOnly,
		TextRejected = 0x01 | SimpleText,
		TextAccepted = 0x02 | SimpleText,
		TextConcluded = 0x03 | SimpleText,
		TextError = 0x04 | SimpleText,
		TextInformation = 0x05 | SimpleText,
		TextListHeader = 0x06 | SimpleText,
		TextListMember = 0x07 | SimpleText,
		TextCrcListMember = 0x08 | SimpleText,
		TextRuntimeStdout = 0x09 | SimpleText,
		TextDeviceInfo = 0x0a | SimpleText,
		TextTrace = 0x0b | SimpleText,
		TextReconnect = 0x0c | SimpleText,
		TextRuntimeStderr = 0x0d | SimpleText,
		FileStartOkay = 0x0e | SimpleText,
		FileStartFail = 0x0f | SimpleText,
		FileData = 0x01 | SimpleBinary,
	}
}


// vim: ts=4

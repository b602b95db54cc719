//! Inbound reader task
//!
//! Owns the inbound half of the link for the lifetime of a connection.
//! Unsolicited device output goes to the event bus; everything else, decode
//! failures included, goes to the pending exchange in arrival order.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::error::HcomResult;
use super::frame::Response;
use crate::device::{DeviceEvent, DeviceState};
use crate::transport::LinkReader;

/// Sender side of the correlated response queue
pub type ResponseSender = mpsc::UnboundedSender<HcomResult<Response>>;

/// Receiver side of the correlated response queue
pub type ResponseReceiver = mpsc::UnboundedReceiver<HcomResult<Response>>;

/// Start the reader; it ends when the link closes or the receiver is dropped
pub fn spawn(reader: LinkReader, state: Arc<DeviceState>, responses: ResponseSender) -> JoinHandle<()> {
	tokio::spawn(run(reader, state, responses))
}

async fn run(mut reader: LinkReader, state: Arc<DeviceState>, responses: ResponseSender) {
	while let Some(item) = reader.next().await {
		let decoded = match item {
			Ok(frame) => frame.and_then(|frame| Response::from_frame(&frame)),
			Err(e) => {
				warn!("Link read failed: {}", e);
				break;
			}
		};

		match decoded {
			Ok(response) => {
				if let Some((kind, text)) = response.notification() {
					trace!("Device {:?}: {}", kind, text);
					state.publish(DeviceEvent::DeviceMessage { kind, text: text.to_string() });
					continue;
				}
				trace!("Response {:?}", response.response_type());
				if responses.send(Ok(response)).is_err() {
					break;
				}
			}
			Err(e) => {
				warn!("Bad inbound frame: {}", e);
				if responses.send(Err(e)).is_err() {
					break;
				}
			}
		}
	}

	debug!("Reader stopped");
	state.mark_disconnected();
}

// vim: ts=4

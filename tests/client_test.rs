mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{test_config, FakeDevice};
use hcomsync::config::Config;
use hcomsync::crc::crc32;
use hcomsync::device::{ConnectionState, DeviceEvent, MessageKind, RuntimeState};
use hcomsync::protocol::frame::MAX_PAYLOAD;
use hcomsync::protocol::{HcomError, RequestType};

/// Wait for the first event matching `pred`
async fn next_event(
	events: &mut tokio::sync::broadcast::Receiver<DeviceEvent>,
	pred: impl Fn(&DeviceEvent) -> bool,
) -> DeviceEvent {
	tokio::time::timeout(Duration::from_secs(2), async {
		loop {
			match events.recv().await {
				Ok(event) if pred(&event) => return event,
				Ok(_) => continue,
				Err(e) => panic!("event bus closed: {}", e),
			}
		}
	})
	.await
	.expect("event not published")
}

#[tokio::test]
async fn test_device_info() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	assert_eq!(client.connection_state(), ConnectionState::Connected);

	let info = client.get_device_info(&CancellationToken::new()).await.unwrap();
	assert_eq!(info.product(), Some("Meadow F7 Micro"));
	assert_eq!(info.os_version(), Some("1.9.0.0"));
	assert_eq!(info.serial_number(), Some("3450591F3436"));
}

#[tokio::test]
async fn test_file_list_with_and_without_crc() {
	let device = FakeDevice::with_files(&[("App.dll", b"app"), ("Meadow.dll", b"meadow")]);
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	let plain = client.get_file_list(false, &cancel).await.unwrap();
	let names: Vec<_> = plain.iter().map(|f| f.name.as_str()).collect();
	assert_eq!(names, vec!["App.dll", "Meadow.dll"]);
	assert!(plain.iter().all(|f| f.crc.is_none()));

	let with_crc = client.get_file_list(true, &cancel).await.unwrap();
	assert_eq!(with_crc.len(), 2);
	assert_eq!(with_crc[0].crc, Some(crc32(b"app")));
	assert_eq!(with_crc[1].crc, Some(crc32(b"meadow")));
}

#[tokio::test]
async fn test_empty_file_list() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let files = client.get_file_list(true, &CancellationToken::new()).await.unwrap();
	assert!(files.is_empty());
}

#[tokio::test]
async fn test_write_file_then_list_reports_crc() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	// Several chunks at the test chunk size
	let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
	std::fs::write(&path, &data).unwrap();

	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	assert!(client.write_file(&path, None, &cancel).await.unwrap());
	assert_eq!(device.file("App.dll"), Some(data.clone()));

	let files = client.get_file_list(true, &cancel).await.unwrap();
	assert_eq!(files.len(), 1);
	assert_eq!(files[0].crc, Some(crc32(&data)));
	assert_eq!(device.model().count(RequestType::UploadingFileData), 16);
}

#[tokio::test]
async fn test_write_file_uses_target_name() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("build-output.bin");
	std::fs::write(&path, b"payload").unwrap();

	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	assert!(client
		.write_file(&path, Some("firmware.bin"), &CancellationToken::new())
		.await
		.unwrap());
	assert_eq!(device.file_names(), vec!["firmware.bin".to_string()]);
}

#[tokio::test]
async fn test_write_file_publishes_progress() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("data.json");
	std::fs::write(&path, vec![7u8; 200]).unwrap();

	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let mut events = client.subscribe();

	assert!(client.write_file(&path, None, &CancellationToken::new()).await.unwrap());

	let done = next_event(&mut events, |e| {
		matches!(e, DeviceEvent::FileWriteProgress { completed, total, .. } if completed == total)
	})
	.await;
	assert_eq!(
		done,
		DeviceEvent::FileWriteProgress { file_name: "data.json".to_string(), completed: 200, total: 200 }
	);
}

#[tokio::test]
async fn test_rejected_write_returns_false() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	std::fs::write(&path, b"app").unwrap();

	let device = FakeDevice::new();
	device.model().reject_writes = 1;
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	assert!(!client.write_file(&path, None, &cancel).await.unwrap());
	assert!(device.file("App.dll").is_none());

	// The connection stays usable
	assert!(client.write_file(&path, None, &cancel).await.unwrap());
	assert_eq!(device.file("App.dll"), Some(b"app".to_vec()));
}

#[tokio::test]
async fn test_oversize_chunk_size_is_clamped() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	let data: Vec<u8> = (0..20_000u32).map(|i| (i % 13) as u8).collect();
	std::fs::write(&path, &data).unwrap();

	let device = FakeDevice::new();
	let config = Config { chunk_size: 16_384, ..test_config() };
	let client = device.connect(&config);
	assert_eq!(client.options().chunk_size, MAX_PAYLOAD);

	assert!(client.write_file(&path, None, &CancellationToken::new()).await.unwrap());
	assert_eq!(device.file("App.dll"), Some(data));
	assert_eq!(device.model().count(RequestType::UploadingFileData), 3);
	assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_rejection_mid_stream_returns_false() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	std::fs::write(&path, vec![3u8; 1000]).unwrap();

	let device = FakeDevice::new();
	device.model().reject_mid_stream = true;
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	assert!(!client.write_file(&path, None, &cancel).await.unwrap());
	assert!(device.file("App.dll").is_none());

	// Nothing stale is left behind for the next transfer
	assert!(client.write_file(&path, None, &cancel).await.unwrap());
	assert_eq!(device.file("App.dll"), Some(vec![3u8; 1000]));
}

#[tokio::test]
async fn test_cancel_mid_write_abandons_transfer() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	// Far more than the pipe buffers, so the writer has to wait on the device
	std::fs::write(&path, vec![0x5au8; 256 * 1024]).unwrap();

	let device = FakeDevice::new();
	let cancel = CancellationToken::new();
	device.model().cancel_after_bytes = Some((1024, cancel.clone()));
	let client = device.connect(&test_config());

	let err = client.write_file(&path, None, &cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::Cancelled));

	// Everything sent before this request has reached the device
	client.get_device_info(&CancellationToken::new()).await.unwrap();
	let model = device.model();
	assert_eq!(model.count(RequestType::EndFileTransfer), 0);
	assert!(model.count(RequestType::UploadingFileData) < 256 * 1024 / 64);
	assert!(model.files.is_empty());
}

#[tokio::test]
async fn test_cancel_read_sends_abort() {
	let device = FakeDevice::with_files(&[("log.txt", b"device log")]);
	device.model().stall_reads = true;
	let client = device.connect(&test_config());
	let dir = tempfile::tempdir().unwrap();
	let dest = dir.path().join("log.txt");
	let cancel = CancellationToken::new();

	let canceller = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		canceller.cancel();
	});
	let err = client.read_file("log.txt", &dest, &cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::Cancelled));
	assert!(!dest.exists());

	client.get_device_info(&CancellationToken::new()).await.unwrap();
	assert_eq!(device.model().count(RequestType::UploadAbortDataSend), 1);
}

#[tokio::test]
async fn test_write_missing_local_file() {
	let dir = tempfile::tempdir().unwrap();
	let device = FakeDevice::new();
	let client = device.connect(&test_config());

	let err = client
		.write_file(&dir.path().join("gone.dll"), None, &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, HcomError::LocalFileMissing(_)));
	assert_eq!(device.model().count(RequestType::StartFileTransfer), 0);
}

#[tokio::test]
async fn test_delete_file() {
	let device = FakeDevice::with_files(&[("App.dll", b"app"), ("Old.dll", b"old")]);
	let client = device.connect(&test_config());

	client.delete_file("Old.dll", &CancellationToken::new()).await.unwrap();
	assert_eq!(device.file_names(), vec!["App.dll".to_string()]);
}

#[tokio::test]
async fn test_delete_failure_is_device_error() {
	let device = FakeDevice::with_files(&[("App.dll", b"app")]);
	device.model().fail_deletes = true;
	let client = device.connect(&test_config());

	let err = client.delete_file("App.dll", &CancellationToken::new()).await.unwrap_err();
	match err {
		HcomError::DeviceError { operation, message } => {
			assert_eq!(operation, "delete-file");
			assert_eq!(message, "file system locked");
		}
		other => panic!("unexpected error: {}", other),
	}
}

#[tokio::test]
async fn test_read_file() {
	let data: Vec<u8> = (0..20_000u32).map(|i| (i % 7) as u8).collect();
	let device = FakeDevice::with_files(&[("log.txt", data.as_slice())]);
	let client = device.connect(&test_config());
	let dir = tempfile::tempdir().unwrap();
	let dest = dir.path().join("log.txt");

	let size = client.read_file("log.txt", &dest, &CancellationToken::new()).await.unwrap();
	assert_eq!(size, data.len() as u64);
	assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[tokio::test]
async fn test_read_missing_file() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let dir = tempfile::tempdir().unwrap();

	let err = client
		.read_file("nope.txt", &dir.path().join("nope.txt"), &CancellationToken::new())
		.await
		.unwrap_err();
	assert!(matches!(err, HcomError::DeviceError { .. }));
}

#[tokio::test]
async fn test_runtime_control() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	assert!(client.is_runtime_enabled(&cancel).await.unwrap());
	assert_eq!(client.state().runtime(), Some(RuntimeState::Enabled));

	client.runtime_disable(&cancel).await.unwrap();
	assert!(!device.model().runtime_enabled);
	assert!(!client.is_runtime_enabled(&cancel).await.unwrap());
	assert_eq!(client.state().runtime(), Some(RuntimeState::Disabled));

	client.runtime_enable(&cancel).await.unwrap();
	assert!(device.model().runtime_enabled);
	assert_eq!(client.state().runtime(), Some(RuntimeState::Enabled));
}

#[tokio::test]
async fn test_erase_flash() {
	let device = FakeDevice::with_files(&[("App.dll", b"app")]);
	let client = device.connect(&test_config());
	let mut events = client.subscribe();

	client.erase_flash(&CancellationToken::new()).await.unwrap();
	assert!(device.file_names().is_empty());

	let message = next_event(&mut events, |e| matches!(e, DeviceEvent::DeviceMessage { .. })).await;
	assert_eq!(
		message,
		DeviceEvent::DeviceMessage {
			kind: MessageKind::Information,
			text: "Bulk erase started".to_string()
		}
	);
}

#[tokio::test]
async fn test_simple_commands() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	client.restart_device(&cancel).await.unwrap();
	client.set_trace_level(3, &cancel).await.unwrap();
	client.trace_to_host(false, &cancel).await.unwrap();

	let model = device.model();
	assert_eq!(model.count(RequestType::RestartPrimaryMcu), 1);
	assert_eq!(model.count(RequestType::ChangeTraceLevel), 1);
	assert_eq!(model.count(RequestType::NoTraceToHost), 1);
}

#[tokio::test]
async fn test_notifications_go_to_event_bus() {
	let device = FakeDevice::with_files(&[("App.dll", b"app")]);
	device.model().trace_before_list = Some("hello from the device".to_string());
	let client = device.connect(&test_config());
	let mut events = client.subscribe();

	// The trace message is interleaved with the listing but not part of it
	let files = client.get_file_list(true, &CancellationToken::new()).await.unwrap();
	assert_eq!(files.len(), 1);

	let message = next_event(&mut events, |e| matches!(e, DeviceEvent::DeviceMessage { .. })).await;
	assert_eq!(
		message,
		DeviceEvent::DeviceMessage { kind: MessageKind::Trace, text: "hello from the device".to_string() }
	);
}

#[tokio::test]
async fn test_trace_to_host_streams_trace() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let mut events = client.subscribe();

	client.trace_to_host(true, &CancellationToken::new()).await.unwrap();
	let message = next_event(&mut events, |e| matches!(e, DeviceEvent::DeviceMessage { .. })).await;
	assert!(matches!(message, DeviceEvent::DeviceMessage { kind: MessageKind::Trace, .. }));
}

#[tokio::test]
async fn test_disconnect_mid_listing() {
	let device = FakeDevice::with_files(&[("App.dll", b"app"), ("Meadow.dll", b"meadow")]);
	device.model().disconnect_during_list = true;
	let client = device.connect(&test_config());
	let mut states = client.state().watch_connection();
	let cancel = CancellationToken::new();

	let err = client.get_file_list(true, &cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::ConnectionLost { operation: "get-file-list" }));
	assert!(err.is_connection_loss());

	tokio::time::timeout(
		Duration::from_secs(2),
		states.wait_for(|state| *state == ConnectionState::Disconnected),
	)
	.await
	.unwrap()
	.unwrap();

	let err = client.get_device_info(&cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::NotConnected));
}

#[tokio::test]
async fn test_timeout_when_device_is_silent() {
	let device = FakeDevice::new();
	device.model().silent = true;
	let config = Config { request_timeout_ms: 100, ..test_config() };
	let client = device.connect(&config);
	let cancel = CancellationToken::new();

	let err = client.get_device_info(&cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::Timeout { operation: "get-device-info", .. }));

	// A timeout does not drop the connection
	assert_eq!(client.connection_state(), ConnectionState::Connected);
	device.model().silent = false;
	assert!(client.get_device_info(&cancel).await.is_ok());
}

#[tokio::test]
async fn test_cancel_pending_request() {
	let device = FakeDevice::new();
	device.model().silent = true;
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();

	let canceller = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		canceller.cancel();
	});
	let err = client.get_file_list(true, &cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::Cancelled));
	assert_eq!(client.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_cancelled_token_sends_nothing() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("App.dll");
	std::fs::write(&path, b"app").unwrap();

	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	let cancel = CancellationToken::new();
	cancel.cancel();

	let err = client.write_file(&path, None, &cancel).await.unwrap_err();
	assert!(matches!(err, HcomError::Cancelled));
	assert!(device.model().requests.is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
	let device = FakeDevice::with_files(&[("App.dll", b"app"), ("Meadow.dll", b"meadow")]);
	let client = Arc::new(device.connect(&test_config()));

	let tasks: Vec<_> = (0..8)
		.map(|i| {
			let client = client.clone();
			tokio::spawn(async move {
				let cancel = CancellationToken::new();
				if i % 2 == 0 {
					client.get_file_list(true, &cancel).await.map(|files| files.len())
				} else {
					client.get_device_info(&cancel).await.map(|info| info.properties().len())
				}
			})
		})
		.collect();

	for (i, task) in tasks.into_iter().enumerate() {
		let count = task.await.unwrap().unwrap();
		if i % 2 == 0 {
			assert_eq!(count, 2);
		} else {
			assert_eq!(count, 5);
		}
	}
}

#[tokio::test]
async fn test_disconnect_by_host() {
	let device = FakeDevice::new();
	let client = device.connect(&test_config());
	client.disconnect().await;

	assert_eq!(client.connection_state(), ConnectionState::Disconnected);
	let err = client.get_device_info(&CancellationToken::new()).await.unwrap_err();
	assert!(matches!(err, HcomError::NotConnected));
}

// vim: ts=4

//! Integration tests for the serial link over in-memory ports

use std::sync::Arc;
use std::time::Duration;

use scope_rig::error::RigError;
use scope_rig::serial::mock::MockPorts;
use scope_rig::serial::{OpticalChannel, SerialEvent, SerialLink, SerialSettings};
use tokio::sync::mpsc::UnboundedReceiver;

const PORT: &str = "/dev/ttyUSB0";

fn link_with(ports: &MockPorts) -> (SerialLink, UnboundedReceiver<SerialEvent>) {
    let settings = SerialSettings {
        read_timeout: Duration::from_millis(10),
        ..SerialSettings::default()
    };
    SerialLink::new(Arc::new(ports.clone()), settings)
}

fn selector_ports() -> MockPorts {
    MockPorts::new()
        .with_port(PORT, "Filter wheel controller")
        .with_port("/dev/ttyACM0", "")
}

// =============================================================================
// Connection
// =============================================================================

#[test]
fn test_ports_are_listed() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    let listed = link.list_ports().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].name, "ttyUSB0");
    assert_eq!(listed[0].label(), "ttyUSB0  Filter wheel controller");
    assert_eq!(listed[1].label(), "ttyACM0");
    assert_eq!(link.status(), "Disconnected");
}

#[test]
fn test_open_by_name_or_location() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    link.open(Some("ttyUSB0")).unwrap();
    assert!(link.is_connected());
    assert_eq!(link.status(), "Connected: ttyUSB0");
    assert_eq!(ports.control_lines(PORT), (true, true));
    assert_eq!(ports.baud_rate(PORT), Some(115_200));

    link.open(Some("/dev/ttyACM0")).unwrap();
    assert_eq!(link.status(), "Connected: ttyACM0");

    link.close();
    assert!(!link.is_connected());
    assert_eq!(link.status(), "Disconnected");
}

#[test]
fn test_open_without_selection() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    assert!(link.open(None).is_err());
    assert_eq!(link.status(), "No port selected");
    assert!(link.open(Some("")).is_err());
    assert!(!link.is_connected());
}

#[test]
fn test_open_failure_reports_reason() {
    let ports = selector_ports().failing_open(PORT, "Permission denied");
    let (link, _events) = link_with(&ports);

    let err = link.open(Some(PORT)).unwrap_err();
    assert!(matches!(err, RigError::SerialOpenFailed { .. }));
    assert_eq!(link.status(), "Connection failed: Permission denied");
    assert!(!link.is_connected());
}

#[test]
fn test_unknown_port_is_opened_as_path() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    assert!(link.open(Some("/dev/ttyS9")).is_err());
    assert!(link.status().starts_with("Connection failed: "));
}

#[test]
fn test_close_is_idempotent() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    link.close();
    link.open(Some(PORT)).unwrap();
    link.close();
    link.close();
    assert_eq!(link.status(), "Disconnected");
}

// =============================================================================
// Writes
// =============================================================================

#[test]
fn test_select_channel_writes_command() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);
    link.open(Some(PORT)).unwrap();

    assert_eq!(link.select_channel(OpticalChannel::Gfp).unwrap(), 8);
    assert_eq!(ports.written(PORT), b"CHAN:1\r\n");
    assert_eq!(link.status(), "Sent 8B: CHAN:1\\r\\n");

    link.select_channel(OpticalChannel::Trans).unwrap();
    assert_eq!(ports.written(PORT), b"CHAN:1\r\nCHAN:4\r\n");
}

#[test]
fn test_write_while_disconnected() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);

    let err = link.select_channel(OpticalChannel::Dapi).unwrap_err();
    assert!(matches!(err, RigError::SerialPortNotConnected));
    assert_eq!(link.status(), "Not connected, cannot send");
    assert!(ports.written(PORT).is_empty());
}

#[test]
fn test_write_failure_keeps_port_open() {
    let ports = selector_ports().failing_writes(PORT);
    let (link, _events) = link_with(&ports);
    link.open(Some(PORT)).unwrap();

    let err = link.write(b"CHAN:0\r\n").unwrap_err();
    assert!(matches!(err, RigError::SerialWriteFailed(_)));
    assert_eq!(link.status(), "Send failed");
    assert!(link.is_connected());
}

#[test]
fn test_long_payload_is_truncated_in_status() {
    let ports = selector_ports();
    let (link, _events) = link_with(&ports);
    link.open(Some(PORT)).unwrap();

    let payload = [b'Z'; 30];
    assert_eq!(link.write(&payload).unwrap(), 30);
    assert_eq!(link.status(), format!("Sent 30B: {}...", "Z".repeat(21)));
    assert_eq!(ports.written(PORT).len(), 30);
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_incoming_bytes_become_events() {
    let ports = selector_ports();
    let (link, mut events) = link_with(&ports);
    link.open(Some(PORT)).unwrap();

    ports.inject(PORT, b"OK CHAN 1\r\n");

    let mut received = Vec::new();
    while received.len() < 11 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for serial data")
            .expect("event channel closed");
        let SerialEvent::DataReceived(bytes) = event;
        received.extend(bytes);
    }
    assert_eq!(received, b"OK CHAN 1\r\n");

    link.close();
}

//! The reader's main-loop glue: owns the transport, scanner, shared-ring,
//! and IPC channel, and implements §4.7's classification table.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::device::state::{Mode, StreamStatus};
use crate::frame::{self, Frame};
use crate::ipc::{IpcChannel, IpcMessage, PayloadValue};
use crate::protocol::{self, CommandId};
use crate::scanner::RxScanner;
use crate::shared_ring::SharedRing;
use crate::transport::Transport;

/// What the reader currently believes about the device it's talking to.
/// Shared with the IPC callback as a read-only snapshot (§5: "the IPC
/// callback receives an `Arc<Mutex<ReaderMirror>>` snapshot handle it may
/// read").
#[derive(Clone, Debug)]
pub struct ReaderMirror {
    pub transport_kind: String,
    pub transport_target: String,
    pub device_connected: bool,
    pub device_unique_id: u64,
    pub mode: Mode,
    pub stream: StreamStatus,
}

impl ReaderMirror {
    pub fn new(transport_kind: impl Into<String>, transport_target: impl Into<String>) -> Self {
        ReaderMirror {
            transport_kind: transport_kind.into(),
            transport_target: transport_target.into(),
            device_connected: false,
            device_unique_id: 0,
            mode: Mode::Continuous,
            stream: StreamStatus::Stopped,
        }
    }
}

/// A request the IPC callback handed off to the main loop; the callback
/// itself never mutates orchestrator state directly (§5).
#[derive(Clone, Debug, PartialEq)]
pub enum InboundIpcCommand {
    ForwardToDevice { command_id: u8, data: Vec<u8> },
    SetReaderMode { mode: String, target: String },
    RequestReaderStatus,
}

/// Translate one received `IpcMessage` into an `InboundIpcCommand`, if it
/// is one of the three the consumer may send (§4.7). Anything else (and
/// any message the reader itself emits, like `READER_STATUS_UPDATE`) is
/// ignored.
fn parse_inbound(msg: &IpcMessage) -> Option<InboundIpcCommand> {
    let json = match &msg.payload {
        Some(PayloadValue::Json(value)) => value.clone(),
        Some(PayloadValue::Str(s)) => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        None => serde_json::Value::Null,
    };

    match msg.message_type.as_str() {
        "FORWARD_TO_DEVICE" => {
            let command_id = json.get("command_id")?.as_u64()? as u8;
            let data: Vec<u8> = match json.get("data") {
                Some(serde_json::Value::Array(items)) => items.iter().filter_map(|v| v.as_u64()).map(|v| v as u8).collect(),
                Some(serde_json::Value::String(encoded)) => crate::ipc::decode_base64(encoded).ok()?,
                _ => Vec::new(),
            };
            Some(InboundIpcCommand::ForwardToDevice { command_id, data })
        }
        "SET_READER_MODE" => {
            let mode = json.get("mode")?.as_str()?.to_string();
            let target = json.get("target").and_then(|v| v.as_str()).unwrap_or("").to_string();
            Some(InboundIpcCommand::SetReaderMode { mode, target })
        }
        "REQUEST_READER_STATUS" => Some(InboundIpcCommand::RequestReaderStatus),
        _ => None,
    }
}

/// Owns one transport connection, its scanner, a shared-ring handle, and
/// an IPC channel, and ties them together per §4.7's routing table.
pub struct Orchestrator<T: Transport, R: SharedRing> {
    transport: T,
    scanner: RxScanner,
    ring: R,
    ipc: IpcChannel,
    mirror: Arc<Mutex<ReaderMirror>>,
    inbound_rx: mpsc::Receiver<InboundIpcCommand>,
    seq: u8,
}

impl<T: Transport, R: SharedRing> Orchestrator<T, R> {
    pub fn new(transport: T, ring: R, ipc_path: impl AsRef<std::path::Path>, mirror: ReaderMirror) -> std::io::Result<Self> {
        let mirror = Arc::new(Mutex::new(mirror));
        let (inbound_tx, inbound_rx) = mpsc::channel();

        let ipc = IpcChannel::bind(ipc_path, move |msg| {
            if let Some(command) = parse_inbound(&msg) {
                let _ = inbound_tx.send(command);
            }
        })?;

        Ok(Orchestrator { transport, scanner: RxScanner::new(), ring, ipc, mirror, inbound_rx, seq: 0 })
    }

    pub fn mirror_handle(&self) -> Arc<Mutex<ReaderMirror>> {
        self.mirror.clone()
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// Assemble and write one outbound protocol command. Never retried
    /// (§4.7): failures are logged and the caller moves on.
    pub fn issue_command(&mut self, cmd: u8, payload: &[u8]) {
        let seq = self.next_seq();
        match frame::build(cmd, seq, payload) {
            Ok(bytes) => {
                if let Err(e) = self.transport.write(&bytes) {
                    warn!(error = %e, "failed to write outbound frame");
                }
            }
            Err(e) => warn!(error = %e, "failed to build outbound frame"),
        }
    }

    fn send_ipc(&self, message_type: &str, payload: serde_json::Value) {
        let msg = IpcMessage::new(message_type).with_json_payload(payload);
        self.ipc.send(&msg);
    }

    /// One iteration: drain available transport bytes into the scanner,
    /// route every complete frame, then drain pending inbound IPC
    /// commands. Returns the number of frames routed, for tests.
    pub fn poll(&mut self) -> std::io::Result<usize> {
        let mut buf = [0u8; 4096];
        let n = self.transport.read(&mut buf)?;
        if n > 0 {
            self.scanner.feed(&buf[..n]);
        }

        let mut routed = Vec::new();
        self.scanner.try_extract(|frame| routed.push(frame));
        let count = routed.len();
        for frame in routed {
            self.route(frame);
        }

        while let Ok(command) = self.inbound_rx.try_recv() {
            self.handle_inbound(command);
        }

        Ok(count)
    }

    fn handle_inbound(&mut self, command: InboundIpcCommand) {
        match command {
            InboundIpcCommand::ForwardToDevice { command_id, data } => {
                self.issue_command(command_id, &data);
            }
            InboundIpcCommand::SetReaderMode { mode, target } => {
                // Switching the live transport connection is out of scope
                // here (§2.1: transports are an external collaborator);
                // the orchestrator only records the requested target so
                // `REQUEST_READER_STATUS` reflects it.
                let mut mirror = self.mirror.lock().unwrap();
                mirror.transport_kind = mode;
                mirror.transport_target = target;
                info!("reader mode change requested");
            }
            InboundIpcCommand::RequestReaderStatus => {
                let mirror = self.mirror.lock().unwrap().clone();
                self.send_ipc(
                    "READER_STATUS_UPDATE",
                    serde_json::json!({
                        "transport_kind": mirror.transport_kind,
                        "transport_target": mirror.transport_target,
                        "device_connected": mirror.device_connected,
                        "device_unique_id": mirror.device_unique_id,
                        "mode": format!("{:?}", mirror.mode),
                        "stream": format!("{:?}", mirror.stream),
                    }),
                );
            }
        }
    }

    fn route(&mut self, frame: Frame) {
        match CommandId::from_code(frame.cmd) {
            CommandId::DataPacket => {
                let timestamp_ms = protocol::decode_data_packet_header(&frame.payload).map(|(ts, _, _, _)| ts).unwrap_or(0);
                if let Err(e) = self.ring.write(timestamp_ms, frame.seq as u16, &frame.payload) {
                    warn!(error = %e, "failed to write sample packet to shared ring");
                }
            }
            CommandId::Pong => {
                let Some(id_bytes) = frame.payload.get(..8) else {
                    warn!(len = frame.payload.len(), "malformed PONG payload, expected 8 bytes");
                    return;
                };
                let device_unique_id = u64::from_le_bytes(id_bytes.try_into().unwrap());
                {
                    let mut mirror = self.mirror.lock().unwrap();
                    mirror.device_connected = true;
                    mirror.device_unique_id = device_unique_id;
                }
                self.send_ipc("DEVICE_FRAME_RECEIVED", serde_json::json!({"cmd": "PONG", "device_unique_id": device_unique_id}));
            }
            CommandId::DeviceInfoResponse => {
                if let Some((version, fw_version, channels)) = protocol::decode_device_info(&frame.payload) {
                    let channel_json: Vec<_> = channels
                        .iter()
                        .map(|c| serde_json::json!({"id": c.id, "max_rate_hz": c.max_rate_hz, "name": c.name}))
                        .collect();
                    self.send_ipc("DEVICE_FRAME_RECEIVED", serde_json::json!({"cmd": "DEVICE_INFO_RESPONSE", "protocol_version": version, "fw_version": fw_version, "channels": channel_json}));
                }
            }
            CommandId::StatusResponse => {
                if frame.payload.len() >= 2 {
                    let mode = if frame.payload[0] == 1 { Mode::Trigger } else { Mode::Continuous };
                    let stream = if frame.payload[1] == 1 { StreamStatus::Running } else { StreamStatus::Stopped };
                    {
                        let mut mirror = self.mirror.lock().unwrap();
                        mirror.mode = mode;
                        mirror.stream = stream;
                    }
                }
                self.send_ipc("DEVICE_FRAME_RECEIVED", serde_json::json!({"cmd": "STATUS_RESPONSE", "payload_base64": crate::ipc::encode_base64(&frame.payload)}));
            }
            CommandId::EventTriggered => {
                self.send_ipc("DEVICE_FRAME_RECEIVED", serde_json::json!({"cmd": "EVENT_TRIGGERED", "payload_base64": crate::ipc::encode_base64(&frame.payload)}));
                info!("EVENT_TRIGGERED observed, auto-issuing REQUEST_BUFFERED_DATA");
                self.issue_command(CommandId::RequestBufferedData.code(), &[]);
            }
            cmd @ (CommandId::BufferTransferComplete | CommandId::Ack | CommandId::Nack) => {
                self.send_ipc("COMMAND_RESPONSE", serde_json::json!({"cmd": cmd.to_string(), "payload_base64": crate::ipc::encode_base64(&frame.payload)}));
            }
            CommandId::LogMessage => match protocol::decode_log_message(&frame.payload) {
                Some((level, text)) => self.send_ipc("DEVICE_LOG_RECEIVED", serde_json::json!({"level": level, "message": text})),
                None => warn!("malformed LOG_MESSAGE payload"),
            },
            other => {
                self.send_ipc("DEVICE_FRAME_RECEIVED", serde_json::json!({"cmd": other.to_string(), "payload_base64": crate::ipc::encode_base64(&frame.payload)}));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_ring::InMemoryRing;
    use crate::transport::ChannelTransport;

    fn socket_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("adc-bridge-orch-test-{name}-{}.sock", std::process::id()))
    }

    #[test]
    fn data_packet_goes_to_ring_not_ipc() {
        let (mut device_end, reader_transport) = ChannelTransport::pair();
        let mirror = ReaderMirror::new("channel", "test");
        let mut orch = Orchestrator::new(reader_transport, InMemoryRing::new(), socket_path("ring"), mirror).unwrap();

        let payload = protocol::encode_data_packet(10, 0x0001, 2, &[vec![1i16, 2i16]]);
        let frame_bytes = frame::build(CommandId::DataPacket.code(), 0, &payload).unwrap();
        device_end.write(&frame_bytes).unwrap();

        let routed = orch.poll().unwrap();
        assert_eq!(routed, 1);
        assert_eq!(orch.ring.packet_count(), 1);
    }

    #[test]
    fn pong_updates_mirror() {
        let (mut device_end, reader_transport) = ChannelTransport::pair();
        let mirror = ReaderMirror::new("channel", "test");
        let mut orch = Orchestrator::new(reader_transport, InMemoryRing::new(), socket_path("pong"), mirror).unwrap();
        let handle = orch.mirror_handle();

        let frame_bytes = frame::build(CommandId::Pong.code(), 0, &0x11223344_AABBCCDDu64.to_le_bytes()).unwrap();
        device_end.write(&frame_bytes).unwrap();
        orch.poll().unwrap();

        let snapshot = handle.lock().unwrap();
        assert!(snapshot.device_connected);
        assert_eq!(snapshot.device_unique_id, 0x11223344_AABBCCDD);
    }

    #[test]
    fn short_pong_payload_is_skipped_not_panicked() {
        let (mut device_end, reader_transport) = ChannelTransport::pair();
        let mirror = ReaderMirror::new("channel", "test");
        let mut orch = Orchestrator::new(reader_transport, InMemoryRing::new(), socket_path("short-pong"), mirror).unwrap();
        let handle = orch.mirror_handle();

        let frame_bytes = frame::build(CommandId::Pong.code(), 0, &[1, 2, 3]).unwrap();
        device_end.write(&frame_bytes).unwrap();
        let routed = orch.poll().unwrap();

        assert_eq!(routed, 1);
        assert!(!handle.lock().unwrap().device_connected);
    }

    #[test]
    fn forward_to_device_issues_command() {
        let (mut device_end, reader_transport) = ChannelTransport::pair();
        let mirror = ReaderMirror::new("channel", "test");
        let mut orch = Orchestrator::new(reader_transport, InMemoryRing::new(), socket_path("fwd"), mirror).unwrap();

        orch.handle_inbound(InboundIpcCommand::ForwardToDevice { command_id: CommandId::Ping.code(), data: vec![] });

        let mut buf = [0u8; 64];
        let n = device_end.read(&mut buf).unwrap();
        let frame = frame::parse(&buf[..n]).unwrap();
        assert_eq!(frame.cmd, CommandId::Ping.code());
    }
}

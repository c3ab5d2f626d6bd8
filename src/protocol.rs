//! Command IDs, NACK reason codes, and the payload encodings shared by the
//! device-side dispatcher (C3), the data generator (C4), and the reader
//! orchestrator (C7).

use std::fmt;

/// Command and response identifiers. Three bands: system control
/// (0x01-0x0F, responses 0x80-OR'd), mode/stream control (0x10-0x1F, ACK
/// 0x90 / NACK 0x91), data plane (0x40-0x4F), and logging (0xE0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandId {
    Ping,
    Pong,
    GetStatus,
    StatusResponse,
    GetDeviceInfo,
    DeviceInfoResponse,
    SetModeContinuous,
    SetModeTrigger,
    StartStream,
    StopStream,
    ConfigureStream,
    Ack,
    Nack,
    DataPacket,
    EventTriggered,
    RequestBufferedData,
    BufferTransferComplete,
    LogMessage,
    /// Any command ID not in the table above.
    Unknown(u8),
}

use CommandId::*;

impl CommandId {
    pub fn code(self) -> u8 {
        match self {
            Ping => 0x01,
            Pong => 0x81,
            GetStatus => 0x02,
            StatusResponse => 0x82,
            GetDeviceInfo => 0x03,
            DeviceInfoResponse => 0x83,
            SetModeContinuous => 0x10,
            SetModeTrigger => 0x11,
            StartStream => 0x12,
            StopStream => 0x13,
            ConfigureStream => 0x14,
            Ack => 0x90,
            Nack => 0x91,
            DataPacket => 0x40,
            EventTriggered => 0x41,
            RequestBufferedData => 0x42,
            BufferTransferComplete => 0x4F,
            LogMessage => 0xE0,
            Unknown(code) => code,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x01 => Ping,
            0x81 => Pong,
            0x02 => GetStatus,
            0x82 => StatusResponse,
            0x03 => GetDeviceInfo,
            0x83 => DeviceInfoResponse,
            0x10 => SetModeContinuous,
            0x11 => SetModeTrigger,
            0x12 => StartStream,
            0x13 => StopStream,
            0x14 => ConfigureStream,
            0x90 => Ack,
            0x91 => Nack,
            0x40 => DataPacket,
            0x41 => EventTriggered,
            0x42 => RequestBufferedData,
            0x4F => BufferTransferComplete,
            0xE0 => LogMessage,
            other => Unknown(other),
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Ping => "PING",
            Pong => "PONG",
            GetStatus => "GET_STATUS",
            StatusResponse => "STATUS_RESPONSE",
            GetDeviceInfo => "GET_DEVICE_INFO",
            DeviceInfoResponse => "DEVICE_INFO_RESPONSE",
            SetModeContinuous => "SET_MODE_CONTINUOUS",
            SetModeTrigger => "SET_MODE_TRIGGER",
            StartStream => "START_STREAM",
            StopStream => "STOP_STREAM",
            ConfigureStream => "CONFIGURE_STREAM",
            Ack => "ACK",
            Nack => "NACK",
            DataPacket => "DATA_PACKET",
            EventTriggered => "EVENT_TRIGGERED",
            RequestBufferedData => "REQUEST_BUFFERED_DATA",
            BufferTransferComplete => "BUFFER_TRANSFER_COMPLETE",
            LogMessage => "LOG_MESSAGE",
            Unknown(code) => return write!(f, "UNKNOWN({code:#04x})"),
        };
        f.write_str(name)
    }
}

/// Two-byte NACK reason: `[category, detail]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NackReason {
    pub category: u8,
    pub detail: u8,
}

impl NackReason {
    pub const MALFORMED_PAYLOAD: NackReason = NackReason { category: 0x01, detail: 0x01 };
    pub const INVALID_CHANNEL_CONFIG: NackReason = NackReason { category: 0x01, detail: 0x02 };
    pub const NOT_IN_TRIGGER_MODE: NackReason = NackReason { category: 0x02, detail: 0x01 };
    pub const NO_TRIGGER_OCCURRED: NackReason = NackReason { category: 0x02, detail: 0x02 };
    pub const UNSUPPORTED_COMMAND: NackReason = NackReason { category: 0x05, detail: 0x00 };

    pub fn to_bytes(self) -> [u8; 2] {
        [self.category, self.detail]
    }
}

pub const MAX_CHANNELS: usize = 4;
pub const PROTOCOL_VERSION: u8 = 6;
pub const DATA_SEND_INTERVAL_MS: u32 = 10;

/// Sample format bitmask: int16 or int32, matching the device-info wire
/// encoding and `CONFIGURE_STREAM`'s `format` byte.
pub const FORMAT_INT16: u16 = 0x0001;
pub const FORMAT_INT32: u16 = 0x0002;

/// One requested channel configuration from a `CONFIGURE_STREAM` payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfigRequest {
    pub channel: u8,
    pub rate_hz: u32,
    pub format: u8,
}

/// Parse the `CONFIGURE_STREAM` payload `[n, {ch, rate_le, format}*n]`.
/// Returns `None` if the payload is malformed (too short for its declared
/// count, or empty).
pub fn parse_configure_stream(payload: &[u8]) -> Option<Vec<ChannelConfigRequest>> {
    if payload.is_empty() {
        return None;
    }
    let n = payload[0] as usize;
    let mut out = Vec::with_capacity(n);
    let mut offset = 1usize;
    for _ in 0..n {
        if offset + 6 > payload.len() {
            return None;
        }
        let channel = payload[offset];
        let rate_hz = u32::from_le_bytes(payload[offset + 1..offset + 5].try_into().unwrap());
        let format = payload[offset + 5];
        out.push(ChannelConfigRequest { channel, rate_hz, format });
        offset += 6;
    }
    Some(out)
}

/// Encode a `STATUS_RESPONSE` payload.
pub fn encode_status(mode_trigger: bool, stream_running: bool, error_flag: bool, error_code: u8) -> [u8; 8] {
    [
        mode_trigger as u8,
        stream_running as u8,
        error_flag as u8,
        error_code,
        0,
        0,
        0,
        0,
    ]
}

/// One channel summary as carried by `DEVICE_INFO_RESPONSE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfoChannel {
    pub id: u8,
    pub max_rate_hz: u32,
    pub supported_formats_mask: u16,
    pub name: String,
}

/// Encode a `DEVICE_INFO_RESPONSE` payload:
/// `[protocol_version, fw_version_le, num_channels, {id, max_rate_le, formats_le, name_len, name}*]`.
pub fn encode_device_info(fw_version: u16, channels: &[DeviceInfoChannel]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + channels.len() * 16);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&fw_version.to_le_bytes());
    out.push(channels.len() as u8);
    for ch in channels {
        out.push(ch.id);
        out.extend_from_slice(&ch.max_rate_hz.to_le_bytes());
        out.extend_from_slice(&ch.supported_formats_mask.to_le_bytes());
        let name_bytes = ch.name.as_bytes();
        let name_len = name_bytes.len().min(u8::MAX as usize);
        out.push(name_len as u8);
        out.extend_from_slice(&name_bytes[..name_len]);
    }
    out
}

/// Decode a `DEVICE_INFO_RESPONSE` payload. Returns `(protocol_version, fw_version, channels)`.
pub fn decode_device_info(payload: &[u8]) -> Option<(u8, u16, Vec<DeviceInfoChannel>)> {
    if payload.len() < 4 {
        return None;
    }
    let protocol_version = payload[0];
    let fw_version = u16::from_le_bytes([payload[1], payload[2]]);
    let num_channels = payload[3] as usize;
    let mut offset = 4usize;
    let mut channels = Vec::with_capacity(num_channels);
    for _ in 0..num_channels {
        if offset + 7 > payload.len() {
            return None;
        }
        let id = payload[offset];
        let max_rate_hz = u32::from_le_bytes(payload[offset + 1..offset + 5].try_into().unwrap());
        let supported_formats_mask = u16::from_le_bytes([payload[offset + 5], payload[offset + 6]]);
        let name_len = payload[offset + 7] as usize;
        offset += 8;
        if offset + name_len > payload.len() {
            return None;
        }
        let name = String::from_utf8_lossy(&payload[offset..offset + name_len]).into_owned();
        offset += name_len;
        channels.push(DeviceInfoChannel { id, max_rate_hz, supported_formats_mask, name });
    }
    Some((protocol_version, fw_version, channels))
}

/// Encode a `DATA_PACKET` payload: non-interleaved samples per enabled
/// channel in ascending id order.
pub fn encode_data_packet(timestamp_ms: u32, channel_mask: u16, sample_count: u16, samples_per_channel: &[Vec<i16>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + samples_per_channel.len() * sample_count as usize * 2);
    out.extend_from_slice(&timestamp_ms.to_le_bytes());
    out.extend_from_slice(&channel_mask.to_le_bytes());
    out.extend_from_slice(&sample_count.to_le_bytes());
    for samples in samples_per_channel {
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }
    out
}

/// Decode a `DATA_PACKET` payload's fixed header plus the raw sample bytes
/// that follow it (caller demultiplexes per-channel using `channel_mask`
/// and `sample_count`).
pub fn decode_data_packet_header(payload: &[u8]) -> Option<(u32, u16, u16, &[u8])> {
    if payload.len() < 8 {
        return None;
    }
    let timestamp_ms = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let channel_mask = u16::from_le_bytes([payload[4], payload[5]]);
    let sample_count = u16::from_le_bytes([payload[6], payload[7]]);
    Some((timestamp_ms, channel_mask, sample_count, &payload[8..]))
}

/// Encode an `EVENT_TRIGGERED` payload.
pub fn encode_event_triggered(timestamp_ms: u32, channel: u16, pre_samples: u32, post_samples: u32) -> [u8; 14] {
    let mut out = [0u8; 14];
    out[0..4].copy_from_slice(&timestamp_ms.to_le_bytes());
    out[4..6].copy_from_slice(&channel.to_le_bytes());
    out[6..10].copy_from_slice(&pre_samples.to_le_bytes());
    out[10..14].copy_from_slice(&post_samples.to_le_bytes());
    out
}

/// Decode an `EVENT_TRIGGERED` payload. Returns `(timestamp_ms, channel, pre_samples, post_samples)`.
pub fn decode_event_triggered(payload: &[u8]) -> Option<(u32, u16, u32, u32)> {
    if payload.len() < 14 {
        return None;
    }
    let timestamp_ms = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let channel = u16::from_le_bytes([payload[4], payload[5]]);
    let pre_samples = u32::from_le_bytes(payload[6..10].try_into().unwrap());
    let post_samples = u32::from_le_bytes(payload[10..14].try_into().unwrap());
    Some((timestamp_ms, channel, pre_samples, post_samples))
}

/// Encode a `LOG_MESSAGE` payload: `[level, len, bytes]`. `message` is
/// truncated to 255 bytes, matching the `u8` length prefix.
pub fn encode_log_message(level: u8, message: &str) -> Vec<u8> {
    let bytes = message.as_bytes();
    let len = bytes.len().min(u8::MAX as usize);
    let mut payload = Vec::with_capacity(2 + len);
    payload.push(level);
    payload.push(len as u8);
    payload.extend_from_slice(&bytes[..len]);
    payload
}

/// Decode a `LOG_MESSAGE` payload: `[level, len, bytes]`.
pub fn decode_log_message(payload: &[u8]) -> Option<(u8, String)> {
    if payload.len() < 2 {
        return None;
    }
    let level = payload[0];
    let len = payload[1] as usize;
    let text = payload.get(2..2 + len)?;
    Some((level, String::from_utf8_lossy(text).into_owned()))
}

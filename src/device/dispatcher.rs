//! Command dispatcher (C3): processes one `(cmd, seq, payload)` triple
//! atomically against `DeviceState` and produces zero or more outbound
//! frame descriptors. Never fails outward — every rejection becomes a
//! `NACK` frame, per §7's propagation policy.

use tracing::{info, warn};

use super::state::{DeviceState, Mode, StreamStatus};
use crate::protocol::{self, CommandId, DeviceInfoChannel, NackReason};

/// One outbound frame the dispatcher wants sent, before sequencing: `(cmd,
/// payload)`. The caller (the simulator's main loop) assigns the sequence
/// number from `DeviceState::next_seq` when it actually frames and writes
/// these.
pub struct Outbound {
    pub cmd: CommandId,
    pub payload: Vec<u8>,
}

impl Outbound {
    fn new(cmd: CommandId, payload: impl Into<Vec<u8>>) -> Self {
        Outbound { cmd, payload: payload.into() }
    }

    fn ack() -> Self {
        Outbound::new(CommandId::Ack, [])
    }

    fn nack(reason: NackReason) -> Self {
        Outbound::new(CommandId::Nack, reason.to_bytes())
    }

    fn log(level: u8, message: &str) -> Self {
        Outbound::new(CommandId::LogMessage, protocol::encode_log_message(level, message))
    }
}

/// Handle one incoming command. `incoming_seq` is unused for response
/// framing (responses get their own sequence number from the device's
/// counter, per §4.3) but is accepted for symmetry with the wire handler.
pub fn handle_command(state: &mut DeviceState, cmd: CommandId, _incoming_seq: u8, payload: &[u8]) -> Vec<Outbound> {
    match cmd {
        CommandId::Ping => {
            vec![Outbound::new(CommandId::Pong, state.device_unique_id.to_le_bytes())]
        }

        CommandId::GetStatus => {
            let status = protocol::encode_status(state.mode == Mode::Trigger, state.stream == StreamStatus::Running, state.error_flag, state.error_code);
            vec![Outbound::new(CommandId::StatusResponse, status)]
        }

        CommandId::GetDeviceInfo => {
            let channels: Vec<DeviceInfoChannel> = state
                .channels
                .iter()
                .map(|c| DeviceInfoChannel { id: c.id, max_rate_hz: c.max_rate_hz, supported_formats_mask: c.supported_formats_mask, name: c.name.clone() })
                .collect();
            let payload = protocol::encode_device_info(state.fw_version, &channels);
            vec![Outbound::new(CommandId::DeviceInfoResponse, payload)]
        }

        CommandId::SetModeContinuous => {
            state.mode = Mode::Continuous;
            state.trigger.armed = false;
            info!("switched to continuous mode");
            vec![Outbound::ack(), Outbound::log(1, "Switched to continuous mode")]
        }

        CommandId::SetModeTrigger => {
            state.mode = Mode::Trigger;
            state.trigger.armed = true;
            state.trigger.occurred = false;
            info!("switched to trigger mode");
            vec![Outbound::ack(), Outbound::log(1, "Switched to trigger mode")]
        }

        CommandId::StartStream => {
            state.stream = StreamStatus::Running;
            state.timestamp_ms = 0;
            info!("stream started");
            vec![Outbound::ack(), Outbound::log(1, "Stream started")]
        }

        CommandId::StopStream => {
            state.stream = StreamStatus::Stopped;
            info!("stream stopped");
            vec![Outbound::ack(), Outbound::log(1, "Stream stopped")]
        }

        CommandId::ConfigureStream => match protocol::parse_configure_stream(payload) {
            None => vec![Outbound::nack(NackReason::MALFORMED_PAYLOAD)],
            Some(requests) => {
                let num_channels = state.channels.len();
                let valid = requests.iter().all(|req| {
                    (req.channel as usize) < num_channels
                        && state
                            .channels
                            .get(req.channel as usize)
                            .map(|ch| req.rate_hz <= ch.max_rate_hz && (req.format == 0 || (req.format as u16 & ch.supported_formats_mask) != 0))
                            .unwrap_or(false)
                });

                if !valid {
                    warn!("CONFIGURE_STREAM rejected: invalid channel configuration");
                    return vec![Outbound::nack(NackReason::INVALID_CHANNEL_CONFIG)];
                }

                // Atomic acceptance: only commit once every request validated.
                for req in &requests {
                    let channel = &mut state.channels[req.channel as usize];
                    channel.enabled = req.rate_hz > 0;
                    channel.current_rate_hz = req.rate_hz;
                    channel.current_format = req.format;
                }
                info!(count = requests.len(), "stream configured");
                vec![Outbound::ack(), Outbound::log(1, "Stream configured")]
            }
        },

        CommandId::RequestBufferedData => {
            if state.mode != Mode::Trigger {
                return vec![Outbound::nack(NackReason::NOT_IN_TRIGGER_MODE)];
            }
            if !state.trigger.occurred {
                return vec![Outbound::nack(NackReason::NO_TRIGGER_OCCURRED)];
            }
            // The actual replay (packets_to_send DATA_PACKETs followed by
            // BUFFER_TRANSFER_COMPLETE) is driven by the trigger scheduler
            // on subsequent ticks (§4.4); here we only acknowledge the
            // request, matching §4.3's "ACK and hand off to C4".
            vec![Outbound::ack()]
        }

        CommandId::Unknown(_) => {
            warn!(cmd = %cmd, "unsupported command");
            vec![Outbound::nack(NackReason::UNSUPPORTED_COMMAND)]
        }

        // Responses and data-plane IDs are never sent *to* the dispatcher;
        // receiving one here means the payload was misrouted upstream.
        _ => vec![Outbound::nack(NackReason::UNSUPPORTED_COMMAND)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> DeviceState {
        DeviceState::new(0x11223344_AABBCCDD)
    }

    #[test]
    fn ping_replies_with_device_id() {
        let mut state = fresh_state();
        let out = handle_command(&mut state, CommandId::Ping, 0, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cmd, CommandId::Pong);
        assert_eq!(out[0].payload, 0x11223344_AABBCCDDu64.to_le_bytes());
    }

    #[test]
    fn configure_stream_atomic_on_failure() {
        let mut state = fresh_state();
        // channel 0 at a valid rate, channel 9 (out of range) invalid.
        let mut payload = vec![2u8];
        payload.extend_from_slice(&[0, 0x10, 0x27, 0, 0, 0x01]);
        payload.extend_from_slice(&[9, 0x10, 0x27, 0, 0, 0x01]);

        let before = state.channels.clone();
        let out = handle_command(&mut state, CommandId::ConfigureStream, 0, &payload);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cmd, CommandId::Nack);
        assert_eq!(out[0].payload, NackReason::INVALID_CHANNEL_CONFIG.to_bytes());
        assert_eq!(state.channels, before, "no channel should have been modified");
    }

    #[test]
    fn configure_stream_accepts_valid_config() {
        let mut state = fresh_state();
        let mut payload = vec![1u8];
        payload.extend_from_slice(&[0, 0x10, 0x27, 0, 0, 0x01]);
        let out = handle_command(&mut state, CommandId::ConfigureStream, 0, &payload);
        assert_eq!(out[0].cmd, CommandId::Ack);
        assert!(state.channels[0].enabled);
        assert_eq!(state.channels[0].current_rate_hz, 10_000);
    }

    #[test]
    fn request_buffered_data_requires_trigger_mode() {
        let mut state = fresh_state();
        let out = handle_command(&mut state, CommandId::RequestBufferedData, 0, &[]);
        assert_eq!(out[0].cmd, CommandId::Nack);
        assert_eq!(out[0].payload, NackReason::NOT_IN_TRIGGER_MODE.to_bytes());
    }

    #[test]
    fn request_buffered_data_requires_occurred() {
        let mut state = fresh_state();
        state.mode = Mode::Trigger;
        let out = handle_command(&mut state, CommandId::RequestBufferedData, 0, &[]);
        assert_eq!(out[0].payload, NackReason::NO_TRIGGER_OCCURRED.to_bytes());
    }

    #[test]
    fn unknown_command_is_unsupported() {
        let mut state = fresh_state();
        let out = handle_command(&mut state, CommandId::Unknown(0xF0), 0, &[]);
        assert_eq!(out[0].cmd, CommandId::Nack);
        assert_eq!(out[0].payload, NackReason::UNSUPPORTED_COMMAND.to_bytes());
    }

    #[test]
    fn malformed_configure_stream_payload_is_nacked() {
        let mut state = fresh_state();
        let out = handle_command(&mut state, CommandId::ConfigureStream, 0, &[]);
        assert_eq!(out[0].payload, NackReason::MALFORMED_PAYLOAD.to_bytes());
    }
}

//! The simulator's command state machine: C3 (dispatcher) and C4 (data
//! generator) wired together against one `DeviceState`.

pub mod dispatcher;
pub mod generator;
pub mod sample_source;
pub mod state;

use tracing::info;

use crate::frame;
use crate::protocol::CommandId;
use dispatcher::Outbound;
use generator::{TriggerAction, TriggerScheduler, TriggerSource, UpperCrossingDetector};
use sample_source::SampleSource;
use state::{DeviceState, Mode, StreamStatus};

/// Ties `DeviceState`, a `SampleSource`, and a trigger source together,
/// and turns their output into wire-ready frame bytes. Pure and
/// synchronous: the binary's main loop supplies wall-clock time and owns
/// all I/O (§9: "a single outbound queue that both producers feed").
pub struct Simulator {
    pub state: DeviceState,
    source: Box<dyn SampleSource>,
    trigger: TriggerSource,
    next_sample_index: u64,
}

impl Simulator {
    pub fn new(device_unique_id: u64, source: Box<dyn SampleSource>, trigger: TriggerSource) -> Self {
        Simulator { state: DeviceState::new(device_unique_id), source, trigger, next_sample_index: 0 }
    }

    /// Process one inbound frame, returning the bytes of every outbound
    /// frame it produced, in order.
    pub fn handle_frame(&mut self, cmd: CommandId, seq: u8, payload: &[u8]) -> Vec<u8> {
        if cmd == CommandId::SetModeTrigger {
            // Arming trigger mode (re)starts the scheduler variant; the
            // upper-crossing variant resets its crossing memory instead.
            match &mut self.trigger {
                TriggerSource::Scheduled(_) => {
                    self.trigger = TriggerSource::Scheduled(TriggerScheduler::armed(self.state.timestamp_ms as u64, &mut rand::thread_rng()));
                }
                TriggerSource::UpperCrossing(detector) => detector.reset(),
            }
        }
        let outbound = dispatcher::handle_command(&mut self.state, cmd, seq, payload);
        self.frame_all(outbound)
    }

    fn frame_all(&mut self, outbound: Vec<Outbound>) -> Vec<u8> {
        let mut bytes = Vec::new();
        for item in outbound {
            let seq = self.state.next_seq();
            match frame::build(item.cmd.code(), seq, &item.payload) {
                Ok(mut frame_bytes) => bytes.append(&mut frame_bytes),
                Err(e) => tracing::warn!(error = %e, cmd = %item.cmd, "failed to build outbound frame"),
            }
        }
        bytes
    }

    /// Advance the data plane by one `DATA_SEND_INTERVAL_MS` tick at
    /// wall-clock `now_ms`. Returns wire bytes for whatever was emitted
    /// this tick (zero or more frames).
    pub fn tick(&mut self, now_ms: u64) -> Vec<u8> {
        let mut outbound = Vec::new();

        if self.state.stream == StreamStatus::Running {
            if self.state.mode == Mode::Trigger {
                outbound.extend(self.tick_trigger(now_ms));
            } else {
                outbound.push(self.emit_data_packet());
            }
            self.state.timestamp_ms = self.state.timestamp_ms.wrapping_add(crate::protocol::DATA_SEND_INTERVAL_MS);
        }

        self.frame_all(outbound)
    }

    fn emit_data_packet(&mut self) -> Outbound {
        let payload = generator::generate_data_packet(&self.state, self.source.as_ref(), self.next_sample_index);
        let sample_count = self.state.min_enabled_rate_hz().map(generator::sample_count_for).unwrap_or(0);
        self.next_sample_index += sample_count as u64;
        Outbound { cmd: CommandId::DataPacket, payload }
    }

    fn tick_trigger(&mut self, now_ms: u64) -> Vec<Outbound> {
        match &mut self.trigger {
            TriggerSource::Scheduled(scheduler) => {
                let action = scheduler.tick(now_ms);
                match action {
                    TriggerAction::Wait => vec![],
                    TriggerAction::FireEvent => {
                        self.state.trigger.occurred = true;
                        info!("trigger event detected");
                        let payload = crate::protocol::encode_event_triggered(self.state.timestamp_ms, 0, self.state.trigger.pre_samples, self.state.trigger.post_samples);
                        vec![
                            Outbound { cmd: CommandId::EventTriggered, payload: payload.to_vec() },
                            Outbound { cmd: CommandId::LogMessage, payload: crate::protocol::encode_log_message(2, "Trigger event detected") },
                        ]
                    }
                    TriggerAction::ReplayPacket => {
                        let data = self.emit_data_packet();
                        let mut out = vec![data];
                        if let TriggerSource::Scheduled(s) = &mut self.trigger {
                            if s.take_complete() {
                                out.push(Outbound { cmd: CommandId::BufferTransferComplete, payload: vec![] });
                                *s = TriggerScheduler::armed(now_ms, &mut rand::thread_rng());
                            }
                        }
                        out
                    }
                    TriggerAction::Complete => vec![Outbound { cmd: CommandId::BufferTransferComplete, payload: vec![] }],
                }
            }
            TriggerSource::UpperCrossing(detector) => {
                let sample = self.source.get_sample(0, self.next_sample_index);
                let fired = detector.observe(sample);
                let mut out = vec![];
                if fired {
                    self.state.trigger.occurred = true;
                    info!("trigger event detected (upper-crossing)");
                    let payload = crate::protocol::encode_event_triggered(self.state.timestamp_ms, 0, self.state.trigger.pre_samples, self.state.trigger.post_samples);
                    out.push(Outbound { cmd: CommandId::EventTriggered, payload: payload.to_vec() });
                    out.push(Outbound { cmd: CommandId::LogMessage, payload: crate::protocol::encode_log_message(2, "Trigger event detected") });
                }
                out.push(self.emit_data_packet());
                out
            }
        }
    }
}

/// Default trigger source for a freshly constructed simulator: the
/// scheduler, since it's what the reader's auto-`REQUEST_BUFFERED_DATA`
/// behavior (§4.7, S4) depends on.
pub fn default_trigger_source() -> TriggerSource {
    TriggerSource::Scheduled(TriggerScheduler::armed(0, &mut rand::thread_rng()))
}

pub fn upper_crossing_trigger_source(threshold: f32) -> TriggerSource {
    TriggerSource::UpperCrossing(UpperCrossingDetector::new(threshold))
}

//! Data-plane generator (C4): produces `DATA_PACKET` payloads from a
//! `SampleSource`, and the trigger-mode scheduler/upper-crossing detector
//! that gate `EVENT_TRIGGERED` / buffered replay.

use rand::Rng;

use super::sample_source::SampleSource;
use super::state::DeviceState;
use crate::protocol::{self, DATA_SEND_INTERVAL_MS};

/// Compute `sample_count = clamp(min_enabled_rate_hz * 10 / 1000, 1, 100)`.
pub fn sample_count_for(min_enabled_rate_hz: u32) -> u16 {
    let raw = (min_enabled_rate_hz as u64 * DATA_SEND_INTERVAL_MS as u64) / 1000;
    raw.clamp(1, 100) as u16
}

/// Build one `DATA_PACKET` payload for the device's currently enabled
/// channels, advancing `absolute_sample_index` per channel by
/// `sample_count` as it goes.
pub fn generate_data_packet(state: &DeviceState, source: &dyn SampleSource, sample_index_base: u64) -> Vec<u8> {
    let Some(min_rate) = state.min_enabled_rate_hz() else {
        return protocol::encode_data_packet(state.timestamp_ms, 0, 0, &[]);
    };
    let sample_count = sample_count_for(min_rate);
    let channel_mask = state.channel_mask();

    let samples_per_channel: Vec<Vec<i16>> = state
        .enabled_channels()
        .map(|ch| (0..sample_count as u64).map(|i| source.get_sample(ch.id, sample_index_base + i)).collect())
        .collect();

    protocol::encode_data_packet(state.timestamp_ms, channel_mask, sample_count, &samples_per_channel)
}

/// What the trigger machinery wants to happen on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Nothing to do yet.
    Wait,
    /// Emit `EVENT_TRIGGERED` now.
    FireEvent,
    /// Emit one replayed `DATA_PACKET`.
    ReplayPacket,
    /// Emit `BUFFER_TRANSFER_COMPLETE`, then the caller should reschedule.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerState {
    WaitingForTrigger,
    Replaying,
    Done,
}

/// The primary trigger source (§4.4 steps 1-5): pick a random future time
/// and packet count, wait, fire, replay, complete, repeat.
#[derive(Debug, Clone)]
pub struct TriggerScheduler {
    state: SchedulerState,
    next_trigger_time_ms: u64,
    pub packets_to_send: u32,
    pub packets_sent: u32,
}

impl TriggerScheduler {
    /// Arm a fresh cycle: `next_trigger_time_ms = now + uniform(10_000,
    /// 15_999)`, `packets_to_send = uniform(5, 10)`.
    pub fn armed(now_ms: u64, rng: &mut impl Rng) -> Self {
        TriggerScheduler {
            state: SchedulerState::WaitingForTrigger,
            next_trigger_time_ms: now_ms + rng.gen_range(10_000..=15_999),
            packets_to_send: rng.gen_range(5..=10),
            packets_sent: 0,
        }
    }

    pub fn occurred(&self) -> bool {
        !matches!(self.state, SchedulerState::WaitingForTrigger)
    }

    pub fn tick(&mut self, now_ms: u64) -> TriggerAction {
        match self.state {
            SchedulerState::WaitingForTrigger => {
                if now_ms >= self.next_trigger_time_ms {
                    self.state = SchedulerState::Replaying;
                    TriggerAction::FireEvent
                } else {
                    TriggerAction::Wait
                }
            }
            SchedulerState::Replaying => {
                self.packets_sent += 1;
                if self.packets_sent >= self.packets_to_send {
                    self.state = SchedulerState::Done;
                }
                TriggerAction::ReplayPacket
            }
            SchedulerState::Done => {
                self.state = SchedulerState::Done;
                TriggerAction::Wait
            }
        }
    }

    /// Consume the one-shot `Complete` signal after the last replay packet
    /// of a cycle has been sent.
    pub fn take_complete(&mut self) -> bool {
        if self.state == SchedulerState::Done {
            true
        } else {
            false
        }
    }
}

/// Alternative trigger source (§4.4): a simple upper-crossing detector
/// over the live channel-0 stream, mirroring the original `test-sender.c`
/// `handle_trigger_logic`'s `prev <= threshold < sample` check. Mutually
/// exclusive with `TriggerScheduler` within one armed cycle — a
/// `DataGenerator` picks exactly one at construction time.
#[derive(Debug, Clone)]
pub struct UpperCrossingDetector {
    threshold: f32,
    last_sample: Option<i16>,
    pub occurred: bool,
}

impl UpperCrossingDetector {
    pub fn new(threshold: f32) -> Self {
        UpperCrossingDetector { threshold, last_sample: None, occurred: false }
    }

    /// Feed one live ch0 sample. Returns `true` exactly once, on the tick
    /// where the upward threshold crossing is first observed.
    pub fn observe(&mut self, sample: i16) -> bool {
        let crossed = match self.last_sample {
            Some(prev) => (prev as f32) <= self.threshold && (sample as f32) > self.threshold,
            None => false,
        };
        self.last_sample = Some(sample);
        if crossed && !self.occurred {
            self.occurred = true;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last_sample = None;
        self.occurred = false;
    }
}

/// Which trigger source a simulator instance uses. Selectable at
/// construction; the two are never combined within one armed cycle.
pub enum TriggerSource {
    Scheduled(TriggerScheduler),
    UpperCrossing(UpperCrossingDetector),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sample_source::SynthesizedSource;
    use crate::device::state::DeviceState;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn sample_count_is_clamped() {
        assert_eq!(sample_count_for(0), 1);
        assert_eq!(sample_count_for(50), 1);
        assert_eq!(sample_count_for(10_000), 100);
        assert_eq!(sample_count_for(100_000), 100);
    }

    #[test]
    fn data_packet_is_non_interleaved() {
        let mut state = DeviceState::new(1);
        state.channels[0].enabled = true;
        state.channels[0].current_rate_hz = 10_000;
        state.channels[1].enabled = true;
        state.channels[1].current_rate_hz = 10_000;
        let source = SynthesizedSource::new(10_000.0);

        let payload = generate_data_packet(&state, &source, 0);
        let (_, mask, count, samples) = protocol::decode_data_packet_header(&payload).unwrap();
        assert_eq!(mask, 0x0003);
        assert_eq!(count, 100);
        assert_eq!(samples.len(), 2 * count as usize * 2);
    }

    #[test]
    fn scheduler_eventually_fires_and_completes() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        let mut scheduler = TriggerScheduler::armed(0, &mut rng);
        assert_eq!(scheduler.tick(0), TriggerAction::Wait);

        // Fast-forward to a time past any possible schedule.
        let action = scheduler.tick(20_000);
        assert_eq!(action, TriggerAction::FireEvent);
        assert!(scheduler.occurred());

        let mut replayed = 0;
        loop {
            match scheduler.tick(20_010) {
                TriggerAction::ReplayPacket => replayed += 1,
                TriggerAction::Wait => break,
                other => panic!("unexpected action {other:?}"),
            }
            if scheduler.take_complete() {
                break;
            }
        }
        assert_eq!(replayed, scheduler.packets_to_send);
    }

    #[test]
    fn upper_crossing_detector_fires_once() {
        let mut detector = UpperCrossingDetector::new(500.0);
        assert!(!detector.observe(100));
        assert!(!detector.observe(400));
        assert!(detector.observe(600));
        assert!(!detector.observe(700), "should not re-fire once occurred");
    }
}

//! Abstract sample source for the data-plane generator (C4). Real hardware
//! substitutes an ADC read; this crate ships the two sources the original
//! simulator supports: CSV-table playback and synthesized sine + noise.

use crate::csv_playlist::CsvPlaylist;

/// `get_sample(channel, absolute_sample_index) -> i16`.
pub trait SampleSource: Send {
    fn get_sample(&self, channel: u8, absolute_sample_index: u64) -> i16;
}

/// Sum of a channel-specific sine wave plus small uniform noise, matching
/// the simulator's fallback generator when no CSV playlist is loaded:
/// channel 0 is 50 Hz at amplitude 1000, channel 1 is 60 Hz at amplitude
/// 800; channels beyond that reuse channel 1's parameters.
pub struct SynthesizedSource {
    sample_rate_hz: f64,
}

impl SynthesizedSource {
    pub fn new(sample_rate_hz: f64) -> Self {
        SynthesizedSource { sample_rate_hz }
    }

    fn wave_params(channel: u8) -> (f64, f64) {
        match channel {
            0 => (50.0, 1000.0),
            _ => (60.0, 800.0),
        }
    }

    /// A small, deterministic pseudo-noise term in `[-5, 5]`, derived from
    /// the sample index so the output is reproducible across runs (useful
    /// for tests) while still varying sample to sample.
    fn noise_term(absolute_sample_index: u64) -> f64 {
        let x = absolute_sample_index.wrapping_mul(2_654_435_761) >> 24;
        ((x % 11) as f64) - 5.0
    }
}

impl SampleSource for SynthesizedSource {
    fn get_sample(&self, channel: u8, absolute_sample_index: u64) -> i16 {
        let (freq_hz, amplitude) = Self::wave_params(channel);
        let t = absolute_sample_index as f64 / self.sample_rate_hz;
        let value = amplitude * (2.0 * std::f64::consts::PI * freq_hz * t).sin() + Self::noise_term(absolute_sample_index);
        value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

/// Plays back rows of a loaded CSV table: one row per sample, one column
/// per channel, each value scaled by 100 and truncated to `i16`.
pub struct CsvSource {
    playlist: CsvPlaylist,
}

impl CsvSource {
    pub fn new(playlist: CsvPlaylist) -> Self {
        CsvSource { playlist }
    }
}

impl SampleSource for CsvSource {
    fn get_sample(&self, channel: u8, absolute_sample_index: u64) -> i16 {
        let row = absolute_sample_index as usize % self.playlist.row_count().max(1);
        let raw = self.playlist.value(row, channel as usize).unwrap_or(0.0);
        (raw * 100.0).trunc().clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_source_is_deterministic() {
        let source = SynthesizedSource::new(10_000.0);
        let a = source.get_sample(0, 100);
        let b = source.get_sample(0, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn different_channels_differ() {
        let source = SynthesizedSource::new(10_000.0);
        // Amplitudes differ enough that samples at t=0-ish should rarely tie;
        // check the waveform parameters are in fact distinct at a quarter period.
        let ch0 = source.get_sample(0, 50);
        let ch1 = source.get_sample(1, 50);
        assert_ne!(ch0, ch1);
    }
}

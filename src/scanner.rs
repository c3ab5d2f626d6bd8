//! RX stream scanner (C2): a stateful byte-stream-to-frame accumulator that
//! resyncs after corruption instead of losing the rest of the stream.
//!
//! The discipline: scan for the preamble; once the header is readable, wait
//! for the full frame; if the CRC fails, advance past *this* preamble by one
//! byte (not by the frame's claimed length, which may itself be garbage) and
//! resume scanning from there.

use crate::frame::{self, Frame, MAX_FRAME_SIZE, MIN_HEADER_BYTES, PREAMBLE};

/// Upper bound on the scanner's internal buffer: a generous multiple of
/// the largest frame, sized for stream readers that must tolerate bursty
/// input.
const SCANNER_BUFFER_CAP: usize = 64 * 1024;

/// A stateful accumulator over an incoming byte stream.
pub struct RxScanner {
    buf: Vec<u8>,
}

impl Default for RxScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RxScanner {
    pub fn new() -> Self {
        RxScanner { buf: Vec::with_capacity(MAX_FRAME_SIZE) }
    }

    /// Append bytes to the internal buffer. If accepting all of `bytes`
    /// would exceed the scanner's capacity, the oldest buffered bytes are
    /// dropped first. Returns the number of bytes actually accepted.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        if bytes.len() >= SCANNER_BUFFER_CAP {
            // Entire capacity could never hold this input; keep only its tail.
            self.buf.clear();
            let start = bytes.len() - SCANNER_BUFFER_CAP;
            self.buf.extend_from_slice(&bytes[start..]);
            return SCANNER_BUFFER_CAP;
        }
        let overflow = (self.buf.len() + bytes.len()).saturating_sub(SCANNER_BUFFER_CAP);
        if overflow > 0 {
            self.buf.drain(0..overflow);
        }
        self.buf.extend_from_slice(bytes);
        bytes.len()
    }

    /// Pop zero or more complete frames from the buffer, invoking `on_frame`
    /// for each in the order they occurred on the wire.
    pub fn try_extract(&mut self, mut on_frame: impl FnMut(Frame)) {
        loop {
            let Some(preamble_at) = self.buf.iter().position(|&b| b == PREAMBLE) else {
                self.buf.clear();
                return;
            };
            if preamble_at > 0 {
                self.buf.drain(0..preamble_at);
            }

            if self.buf.len() < MIN_HEADER_BYTES {
                return; // wait for more bytes before we can read the header
            }

            let len = u16::from_le_bytes([self.buf[3], self.buf[4]]) as usize;
            let total = 1 + 4 + len + 2;
            if total > MAX_FRAME_SIZE {
                // Garbage header claiming an absurd length: this can't be a
                // real frame. Skip past the preamble and keep scanning.
                self.buf.drain(0..1);
                continue;
            }
            if self.buf.len() < total {
                return; // wait for the rest of the frame
            }

            match frame::parse(&self.buf[0..total]) {
                Ok(frame) => {
                    self.buf.drain(0..total);
                    on_frame(frame);
                }
                Err(_) => {
                    // CRC or structural mismatch: this wasn't a real frame.
                    // Advance past the preamble byte we matched on, not past
                    // `total`, and re-scan for the next candidate.
                    self.buf.drain(0..1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::build;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    #[test]
    fn single_frame_no_junk() {
        let bytes = build(0x01, 0, b"hi").unwrap();
        let mut scanner = RxScanner::new();
        let mut got = vec![];
        scanner.feed(&bytes);
        scanner.try_extract(|f| got.push(f));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].cmd, 0x01);
    }

    #[test]
    fn resyncs_after_bad_crc() {
        // A frame whose CRC bytes are corrupted, followed by a valid frame.
        let mut broken = build(0x81, 0, b"pong").unwrap();
        let last = broken.len() - 1;
        broken[last] ^= 0xFF;
        let good = build(0x81, 1, b"pong").unwrap();

        let mut stream = vec![0xFF];
        stream.extend_from_slice(&broken);
        stream.extend_from_slice(&good);

        let mut scanner = RxScanner::new();
        let mut got = vec![];
        scanner.feed(&stream);
        scanner.try_extract(|f| got.push(f));

        assert_eq!(got.len(), 1, "exactly one frame should have been recovered");
        assert_eq!(got[0].seq, 1);
    }

    #[test]
    fn totality_over_arbitrary_chunking() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let frames: Vec<_> = (0..20u8)
            .map(|seq| build(0x40, seq, &vec![seq; 10]).unwrap())
            .collect();

        // Interleave frames with junk bytes that never happen to start with
        // the preamble (so they can't be mistaken for a frame header).
        let mut stream = vec![];
        for f in &frames {
            let junk_len = rng.gen_range(0..5);
            for _ in 0..junk_len {
                let mut b: u8 = rng.gen();
                if b == PREAMBLE {
                    b = b.wrapping_add(1);
                }
                stream.push(b);
            }
            stream.extend_from_slice(f);
        }

        // Feed in randomly sized chunks.
        let mut scanner = RxScanner::new();
        let mut got = vec![];
        let mut pos = 0;
        while pos < stream.len() {
            let chunk_len = rng.gen_range(1..=7).min(stream.len() - pos);
            scanner.feed(&stream[pos..pos + chunk_len]);
            scanner.try_extract(|f| got.push(f));
            pos += chunk_len;
        }

        assert_eq!(got.len(), frames.len());
        for (i, f) in got.iter().enumerate() {
            assert_eq!(f.seq, i as u8);
        }
    }

    #[test]
    fn partial_header_waits_for_more_bytes() {
        let bytes = build(0x01, 0, b"hello").unwrap();
        let mut scanner = RxScanner::new();
        let mut got = vec![];
        scanner.feed(&bytes[..3]);
        scanner.try_extract(|f| got.push(f));
        assert!(got.is_empty());
        scanner.feed(&bytes[3..]);
        scanner.try_extract(|f| got.push(f));
        assert_eq!(got.len(), 1);
    }
}

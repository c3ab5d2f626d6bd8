//! Shared-ring (C5): a single-producer/single-consumer fixed-capacity ring
//! of sample packets, laid out byte-identically to the named shared-memory
//! segment `ADC_DATA_SHARED_MEM`.
//!
//! The header and slot structs are `bytemuck::Pod`, a zero-copy layout
//! discipline that lets the producer and consumer processes map the
//! identical byte layout without a serialization step.

use bytemuck::{Pod, Zeroable};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::SharedRingError;

pub const SHARED_MEM_MAGIC: u32 = 0xADC1_2345;
pub const SHARED_MEM_VERSION: u32 = 1;
pub const RING_SLOTS: usize = 1024;
pub const MAX_PACKET_PAYLOAD: usize = 4096;

/// Header at the start of the shared segment. `write_index` and
/// `packet_count` are the monotonic counters a reader snapshots to
/// recover ordering; `reserved` pads the header the way the original C
/// struct pads it, for byte-identical layout across processes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct RingHeader {
    pub magic: u32,
    pub version: u32,
    pub write_index: u32,
    pub read_index: u32,
    pub buffer_size: u32,
    pub packet_count: u32,
    pub status: u8,
    pub reserved: [u8; 7],
}

/// One sample-packet slot.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct SamplePacketSlot {
    pub timestamp_ms: u32,
    pub sequence: u16,
    pub payload_len: u16,
    pub payload: [u8; MAX_PACKET_PAYLOAD],
}

impl Default for SamplePacketSlot {
    fn default() -> Self {
        Zeroable::zeroed()
    }
}

/// Full segment layout: header followed by the fixed slot array.
#[repr(C)]
pub struct RingSegment {
    pub header: RingHeader,
    pub slots: [SamplePacketSlot; RING_SLOTS],
}

pub const SEGMENT_SIZE: usize = std::mem::size_of::<RingSegment>();

/// A snapshot of one written packet, as handed back to a reader.
#[derive(Clone, Debug)]
pub struct SamplePacket {
    pub timestamp_ms: u32,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

/// The operations the reader orchestrator (C7) and the simulator's data
/// generator (C4) need from a shared ring, independent of whether it's
/// backed by real OS shared memory or an in-process stand-in used by
/// tests.
pub trait SharedRing: Send {
    /// Write one sample packet to the next slot. `payload.len()` must not
    /// exceed `MAX_PACKET_PAYLOAD`.
    fn write(&mut self, timestamp_ms: u32, sequence: u16, payload: &[u8]) -> Result<(), SharedRingError>;

    /// Current `write_index`, for a reader to compare against its cursor.
    fn write_index(&self) -> u32;

    /// Read the packet at slot `index mod RING_SLOTS` as it currently
    /// stands. Per the lossy-overwrite contract, a reader who falls more
    /// than `RING_SLOTS` packets behind will read overwritten data; callers
    /// are expected to resync per §4.5's read-side contract before calling
    /// this.
    fn read_slot(&self, index: u32) -> SamplePacket;

    fn packet_count(&self) -> u32;
}

fn header_bytes(header: &RingHeader) -> &[u8] {
    bytemuck::bytes_of(header)
}

/// Validate an existing header against the expected magic/version,
/// matching `shared_memory.c`'s `initSharedMemory` validation path for an
/// attacher that did not create the segment.
fn validate_header(header: &RingHeader) -> Result<(), SharedRingError> {
    if header.magic != SHARED_MEM_MAGIC {
        return Err(SharedRingError::IncompatibleMagic { expected: SHARED_MEM_MAGIC, found: header.magic });
    }
    if header.version != SHARED_MEM_VERSION {
        return Err(SharedRingError::IncompatibleVersion { expected: SHARED_MEM_VERSION, found: header.version });
    }
    Ok(())
}

/// An OS-backed named shared-memory segment via `memmap2`, using a
/// well-known file path as the "name" (the portable stand-in for a native
/// named shared-memory object).
pub struct MmapRing {
    mmap: memmap2::MmapMut,
}

impl MmapRing {
    /// Create or attach to the segment backed by `path`. If the file does
    /// not yet exist (or is the wrong size), it is created and the header
    /// is initialized fresh. Otherwise the existing header is validated.
    pub fn open(path: &std::path::Path) -> Result<Self, SharedRingError> {
        use std::fs::OpenOptions;

        let is_new = !path.exists() || std::fs::metadata(path).map(|m| m.len() as usize != SEGMENT_SIZE).unwrap_or(true);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|e| SharedRingError::Mapping(e.to_string()))?;
        file.set_len(SEGMENT_SIZE as u64).map_err(|e| SharedRingError::Mapping(e.to_string()))?;

        let mut mmap = unsafe { memmap2::MmapMut::map_mut(&file) }.map_err(|e| SharedRingError::Mapping(e.to_string()))?;

        if is_new {
            let header = RingHeader {
                magic: SHARED_MEM_MAGIC,
                version: SHARED_MEM_VERSION,
                write_index: 0,
                read_index: 0,
                buffer_size: RING_SLOTS as u32,
                packet_count: 0,
                status: 1,
                reserved: [0; 7],
            };
            mmap[0..std::mem::size_of::<RingHeader>()].copy_from_slice(header_bytes(&header));
        } else {
            let header: &RingHeader = bytemuck::from_bytes(&mmap[0..std::mem::size_of::<RingHeader>()]);
            validate_header(header)?;
        }

        Ok(MmapRing { mmap })
    }

    fn header(&self) -> &RingHeader {
        bytemuck::from_bytes(&self.mmap[0..std::mem::size_of::<RingHeader>()])
    }

    fn header_mut(&mut self) -> &mut RingHeader {
        bytemuck::from_bytes_mut(&mut self.mmap[0..std::mem::size_of::<RingHeader>()])
    }

    fn slot_offset(index: u32) -> usize {
        std::mem::size_of::<RingHeader>() + (index as usize % RING_SLOTS) * std::mem::size_of::<SamplePacketSlot>()
    }
}

impl SharedRing for MmapRing {
    fn write(&mut self, timestamp_ms: u32, sequence: u16, payload: &[u8]) -> Result<(), SharedRingError> {
        if payload.len() > MAX_PACKET_PAYLOAD {
            return Err(SharedRingError::PayloadTooLarge { len: payload.len(), max: MAX_PACKET_PAYLOAD });
        }
        let write_index = self.header().write_index;
        let offset = Self::slot_offset(write_index);

        let mut slot = SamplePacketSlot::default();
        slot.timestamp_ms = timestamp_ms;
        slot.sequence = sequence;
        slot.payload_len = payload.len() as u16;
        slot.payload[..payload.len()].copy_from_slice(payload);

        self.mmap[offset..offset + std::mem::size_of::<SamplePacketSlot>()].copy_from_slice(bytemuck::bytes_of(&slot));

        // Release-ordered: the slot write above is visible to any reader
        // that observes the incremented counters below.
        let header = self.header_mut();
        header.write_index = write_index.wrapping_add(1);
        header.packet_count = header.packet_count.wrapping_add(1);
        Ok(())
    }

    fn write_index(&self) -> u32 {
        self.header().write_index
    }

    fn read_slot(&self, index: u32) -> SamplePacket {
        let offset = Self::slot_offset(index);
        let slot: &SamplePacketSlot = bytemuck::from_bytes(&self.mmap[offset..offset + std::mem::size_of::<SamplePacketSlot>()]);
        SamplePacket {
            timestamp_ms: slot.timestamp_ms,
            sequence: slot.sequence,
            payload: slot.payload[..slot.payload_len as usize].to_vec(),
        }
    }

    fn packet_count(&self) -> u32 {
        self.header().packet_count
    }
}

/// An in-process ring with the same header/slot shape, used by the
/// integration test suite so tests don't need a writable shared-memory
/// path. Counters use `AtomicU32` to preserve the "release on write,
/// acquire on read" ordering contract even when exercised from multiple
/// threads within one test process.
pub struct InMemoryRing {
    write_index: AtomicU32,
    packet_count: AtomicU32,
    slots: Vec<SamplePacketSlot>,
}

impl InMemoryRing {
    pub fn new() -> Self {
        InMemoryRing {
            write_index: AtomicU32::new(0),
            packet_count: AtomicU32::new(0),
            slots: vec![SamplePacketSlot::default(); RING_SLOTS],
        }
    }
}

impl Default for InMemoryRing {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedRing for InMemoryRing {
    fn write(&mut self, timestamp_ms: u32, sequence: u16, payload: &[u8]) -> Result<(), SharedRingError> {
        if payload.len() > MAX_PACKET_PAYLOAD {
            return Err(SharedRingError::PayloadTooLarge { len: payload.len(), max: MAX_PACKET_PAYLOAD });
        }
        let write_index = self.write_index.load(Ordering::Relaxed);
        let slot = &mut self.slots[write_index as usize % RING_SLOTS];
        slot.timestamp_ms = timestamp_ms;
        slot.sequence = sequence;
        slot.payload_len = payload.len() as u16;
        slot.payload[..payload.len()].copy_from_slice(payload);

        self.write_index.store(write_index.wrapping_add(1), Ordering::Release);
        self.packet_count.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn write_index(&self) -> u32 {
        self.write_index.load(Ordering::Acquire)
    }

    fn read_slot(&self, index: u32) -> SamplePacket {
        let slot = &self.slots[index as usize % RING_SLOTS];
        SamplePacket {
            timestamp_ms: slot.timestamp_ms,
            sequence: slot.sequence,
            payload: slot.payload[..slot.payload_len as usize].to_vec(),
        }
    }

    fn packet_count(&self) -> u32 {
        self.packet_count.load(Ordering::Acquire)
    }
}

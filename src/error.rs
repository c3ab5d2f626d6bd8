//! Typed error taxonomy for the core protocol and data-plane layers.
//!
//! Following the split the application edge uses (`anyhow::Error` in the
//! binaries), these enums stay inside the core: a `ProtocolError` never
//! escapes the scanner/codec, and a validation failure never escapes the
//! dispatcher as an `Err` — both are turned into wire-level responses
//! (resync, or a NACK frame) before the caller ever sees a `Result`.

use thiserror::Error;

/// Frame build/parse failures (C1).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload of {len} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("output buffer of {have} bytes cannot hold a {need}-byte frame")]
    BufferTooSmall { have: usize, need: usize },

    #[error("frame does not start with the preamble byte")]
    BadPreamble,

    #[error("declared payload length {declared} does not fit in a buffer of {available} bytes")]
    LengthMismatch { declared: usize, available: usize },

    #[error("CRC mismatch: frame claims {expected:#06x}, computed {actual:#06x}")]
    CrcMismatch { expected: u16, actual: u16 },
}

/// Shared-ring attach/write failures (C5).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SharedRingError {
    #[error("shared memory magic mismatch: expected {expected:#010x}, found {found:#010x}")]
    IncompatibleMagic { expected: u32, found: u32 },

    #[error("shared memory version mismatch: expected {expected}, found {found}")]
    IncompatibleVersion { expected: u32, found: u32 },

    #[error("payload of {len} bytes exceeds the slot capacity of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("failed to map shared memory segment: {0}")]
    Mapping(String),
}

/// IPC channel failures (C6). These are recoverable in every case the
/// orchestrator cares about; see `reader::orchestrator` for how they're
/// consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    #[error("message payload of {len} bytes exceeds IPC_MAX_MESSAGE_SIZE ({max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("no client connected")]
    NoClient,

    #[error("transport broken: {0}")]
    BrokenPipe(String),
}

/// CLI / startup configuration failures. Bubble up to `anyhow` at `main`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid serial port number: {0} (must be 1..=999)")]
    InvalidPortNumber(String),

    #[error("unrecognized argument: {0}")]
    UnrecognizedArgument(String),

    #[error("invalid TCP port: {0}")]
    InvalidTcpPort(String),
}

//! A bidirectional bridge between an ADC data-acquisition device and host
//! consumer processes: a framed binary wire protocol ("Protocol V6"), a
//! device-side command/data-plane simulator, a shared-memory sample ring,
//! and a line-JSON IPC channel to relay everything else.

pub mod config;
pub mod csv_playlist;
pub mod device;
pub mod error;
pub mod frame;
pub mod ipc;
pub mod logging;
pub mod protocol;
pub mod reader;
pub mod scanner;
pub mod shared_ring;
pub mod transport;

pub use error::{ConfigError, IpcError, ProtocolError, SharedRingError};
pub use frame::Frame;
pub use protocol::CommandId;

//! IPC channel (C6): line-framed JSON over a local named endpoint.

pub mod channel;
pub mod message;

pub use channel::IpcChannel;
pub use message::{decode_base64, encode_base64, IpcMessage, PayloadValue, IPC_BUFFER_SIZE, IPC_MAX_MESSAGE_SIZE};

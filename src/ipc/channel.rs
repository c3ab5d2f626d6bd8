//! IPC channel (C6): a duplex named endpoint with exactly one client at a
//! time, and a background reader thread that tolerates partial reads and
//! broken-pipe reconnects.
//!
//! The logical pipe is `data_reader_ipc` (§6). On Unix this is backed by a
//! Unix domain socket at a well-known path — the portable-to-this-sandbox
//! equivalent of the named pipe a Windows build would use; the line
//! framing, JSON dialect, and concurrency contract above it are identical
//! either way and are what this module actually tests.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::message::{IpcMessage, IPC_MAX_MESSAGE_SIZE};
use crate::error::IpcError;

/// How often the accept loop checks the stop flag while waiting for a
/// connection (§5: "a watchdog interval of 50 ms on the stop event during
/// accept").
const ACCEPT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(50);

pub struct IpcChannel {
    path: PathBuf,
    client: Arc<Mutex<Option<UnixStream>>>,
    stop: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
}

impl IpcChannel {
    /// Bind the named endpoint and start the background reader thread.
    /// `on_message` runs on the reader thread for every line received,
    /// whether it parsed as JSON or fell back to `RAW` (§4.6).
    pub fn bind(path: impl AsRef<Path>, on_message: impl Fn(IpcMessage) + Send + Sync + 'static) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;

        let client: Arc<Mutex<Option<UnixStream>>> = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let callback = Arc::new(on_message);

        let thread_client = client.clone();
        let thread_stop = stop.clone();
        let reader_thread = thread::spawn(move || {
            Self::run(listener, thread_client, thread_stop, callback);
        });

        Ok(IpcChannel { path, client, stop, reader_thread: Some(reader_thread) })
    }

    fn run(
        listener: UnixListener,
        client_slot: Arc<Mutex<Option<UnixStream>>>,
        stop: Arc<AtomicBool>,
        on_message: Arc<dyn Fn(IpcMessage) + Send + Sync>,
    ) {
        'accept: while !stop.load(Ordering::Acquire) {
            let stream = match listener.accept() {
                Ok((stream, _addr)) => stream,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_WATCHDOG_INTERVAL);
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "IPC accept failed");
                    thread::sleep(ACCEPT_WATCHDOG_INTERVAL);
                    continue;
                }
            };
            info!("IPC client connected");
            let _ = stream.set_nonblocking(false);
            *client_slot.lock().unwrap() = Some(stream.try_clone().expect("stream clone"));

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                if stop.load(Ordering::Acquire) {
                    break 'accept;
                }
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        debug!("IPC client disconnected");
                        *client_slot.lock().unwrap() = None;
                        continue 'accept;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end_matches(['\n', '\r']);
                        if !trimmed.is_empty() {
                            on_message(IpcMessage::parse_line(trimmed));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "IPC read failed, returning to accept state");
                        *client_slot.lock().unwrap() = None;
                        continue 'accept;
                    }
                }
            }
        }
    }

    /// Send one message to the connected client, if any. Returns `false`
    /// (never blocks indefinitely, never panics) when there is no client
    /// connected, the message exceeds `IPC_MAX_MESSAGE_SIZE`, or the write
    /// failed.
    pub fn send(&self, message: &IpcMessage) -> bool {
        let line = message.to_line();
        if line.len() > IPC_MAX_MESSAGE_SIZE {
            let err = IpcError::MessageTooLarge { len: line.len(), max: IPC_MAX_MESSAGE_SIZE };
            warn!(error = %err, message_type = %message.message_type, "dropping outbound IPC message");
            return false;
        }

        let mut guard = self.client.lock().unwrap();
        let Some(stream) = guard.as_mut() else {
            warn!(error = %IpcError::NoClient, "IPC send skipped");
            return false;
        };
        match stream.write_all(line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                let err = IpcError::BrokenPipe(e.to_string());
                warn!(error = %err, "IPC send failed");
                *guard = None;
                false
            }
        }
    }

    pub fn has_client(&self) -> bool {
        self.client.lock().unwrap().is_some()
    }

    /// Request the reader thread to stop and join it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

impl Drop for IpcChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Reader process entry point: connects to the device over TCP, then runs
//! the orchestrator's transport/scanner/shared-ring/IPC loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};

use adc_bridge::config::{self, ReaderArgsOutcome, TransportConfig};
use adc_bridge::logging;
use adc_bridge::reader::{Orchestrator, ReaderMirror};
use adc_bridge::shared_ring::MmapRing;
use adc_bridge::transport::TcpTransport;

fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match config::parse_reader_args(&args) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", config::reader_usage());
            std::process::exit(1);
        }
    };

    let reader_config = match outcome {
        ReaderArgsOutcome::Help => {
            println!("{}", config::reader_usage());
            return Ok(());
        }
        ReaderArgsOutcome::Run(cfg) => cfg,
    };

    let (transport, mirror) = match &reader_config.transport {
        TransportConfig::Tcp { host, port } => {
            let transport = TcpTransport::connect(host, *port).with_context(|| format!("connecting to device at {host}:{port}"))?;
            (transport, ReaderMirror::new("tcp", format!("{host}:{port}")))
        }
        TransportConfig::Serial { port_number } => {
            // Serial port setup is an out-of-scope external collaborator
            // (§1); this binary only drives the TCP path end-to-end.
            bail!("serial transport (COM{port_number}) is not implemented by this build; pass -s [host [port]] for TCP");
        }
    };

    let ring_path = std::env::temp_dir().join("adc_data_shared_mem");
    let ring = MmapRing::open(&ring_path).context("attaching to the shared sample ring")?;

    let mut orchestrator = Orchestrator::new(transport, ring, &reader_config.ipc_path, mirror).context("binding the IPC channel")?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::Release)).context("installing SIGINT handler")?;
    }

    while running.load(Ordering::Acquire) {
        if let Err(e) = orchestrator.poll() {
            tracing::warn!(error = %e, "transport read failed");
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}

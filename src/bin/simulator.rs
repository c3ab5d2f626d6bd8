//! Simulator process entry point: terminates Protocol V6 over a TCP
//! listener, impersonating the device (§1). One connection is serviced at
//! a time (§1 Non-goals: "no multi-client fan-out").

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use adc_bridge::config::{self, SimulatorArgsOutcome};
use adc_bridge::csv_playlist::CsvPlaylist;
use adc_bridge::device::sample_source::{CsvSource, SampleSource, SynthesizedSource};
use adc_bridge::device::{default_trigger_source, Simulator};
use adc_bridge::logging;
use adc_bridge::protocol::CommandId;
use adc_bridge::scanner::RxScanner;

const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let outcome = match config::parse_simulator_args(&args) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{e}");
            eprintln!("{}", config::simulator_usage());
            std::process::exit(1);
        }
    };

    let sim_config = match outcome {
        SimulatorArgsOutcome::Help => {
            println!("{}", config::simulator_usage());
            return Ok(());
        }
        SimulatorArgsOutcome::Version => {
            println!("adc-simulator {FW_VERSION}");
            return Ok(());
        }
        SimulatorArgsOutcome::Info => {
            println!("adc-simulator {FW_VERSION}: Protocol V6 device simulator (2 channels, continuous + trigger mode)");
            return Ok(());
        }
        SimulatorArgsOutcome::Run(cfg) => cfg,
    };

    let listener = TcpListener::bind(("0.0.0.0", sim_config.port)).with_context(|| format!("binding TCP listener on port {}", sim_config.port))?;
    info!(port = sim_config.port, "simulator listening");

    loop {
        let (stream, addr) = listener.accept().context("accepting a connection")?;
        info!(%addr, "reader connected");
        let source = build_source(&sim_config.csv_path)?;
        serve_connection(stream, source)?;
    }
}

fn build_source(csv_path: &Option<String>) -> anyhow::Result<Box<dyn SampleSource>> {
    match csv_path {
        Some(path) => {
            let playlist = CsvPlaylist::from_path(path).with_context(|| format!("loading CSV playlist from {path}"))?;
            Ok(Box::new(CsvSource::new(playlist)))
        }
        None => Ok(Box::new(SynthesizedSource::new(10_000.0))),
    }
}

/// Service one TCP connection end to end, per the §9 concurrency
/// decision: a dispatcher thread and a generator thread both enqueue onto
/// one outbound `mpsc` channel; this function's caller thread owns the
/// socket's write half and drains it.
fn serve_connection(stream: TcpStream, source: Box<dyn SampleSource>) -> anyhow::Result<()> {
    let simulator = Arc::new(Mutex::new(Simulator::new(device_unique_id(), source, default_trigger_source())));
    let (tx, rx) = mpsc::channel::<Vec<u8>>();

    let mut reader_stream = stream.try_clone().context("cloning socket for the dispatcher thread")?;
    let mut writer_stream = stream;

    let stop_generator = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let dispatch_sim = simulator.clone();
    let dispatch_tx = tx.clone();
    let dispatch_stop_flag = stop_generator.clone();
    let dispatcher = std::thread::spawn(move || {
        dispatch_loop(&mut reader_stream, dispatch_sim, dispatch_tx);
        // The reader disconnected or a read failed: stop the generator too,
        // so the writer's `for bytes in rx` below isn't left waiting on a
        // sender nothing will ever drop.
        dispatch_stop_flag.store(true, std::sync::atomic::Ordering::Release);
    });

    let generator_sim = simulator.clone();
    let generator_tx = tx.clone();
    let generator_stop_flag = stop_generator.clone();
    let generator = std::thread::spawn(move || generator_loop(generator_sim, generator_tx, generator_stop_flag));

    drop(tx);
    for bytes in rx {
        if let Err(e) = writer_stream.write_all(&bytes) {
            warn!(error = %e, "write to reader failed, ending connection");
            break;
        }
    }

    stop_generator.store(true, std::sync::atomic::Ordering::Release);
    let _ = dispatcher.join();
    let _ = generator.join();
    Ok(())
}

fn dispatch_loop(stream: &mut TcpStream, simulator: Arc<Mutex<Simulator>>, tx: mpsc::Sender<Vec<u8>>) {
    let mut scanner = RxScanner::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => {
                info!("reader disconnected");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "read from reader failed");
                return;
            }
        };
        scanner.feed(&buf[..n]);

        let mut frames = Vec::new();
        scanner.try_extract(|frame| frames.push(frame));
        for frame in frames {
            let cmd = CommandId::from_code(frame.cmd);
            let bytes = simulator.lock().unwrap().handle_frame(cmd, frame.seq, &frame.payload);
            if !bytes.is_empty() && tx.send(bytes).is_err() {
                return;
            }
        }
    }
}

fn generator_loop(simulator: Arc<Mutex<Simulator>>, tx: mpsc::Sender<Vec<u8>>, stop: Arc<std::sync::atomic::AtomicBool>) {
    let start = Instant::now();
    while !stop.load(std::sync::atomic::Ordering::Acquire) {
        let now_ms = start.elapsed().as_millis() as u64;
        let bytes = simulator.lock().unwrap().tick(now_ms);
        if !bytes.is_empty() && tx.send(bytes).is_err() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn device_unique_id() -> u64 {
    0x1122_3344_AABB_CCDD
}

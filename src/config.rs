//! CLI argument parsing for both binaries. Hand-parsed over
//! `std::env::args()` rather than via a CLI-parsing crate, since neither
//! binary's flag surface needs one.

use crate::error::ConfigError;

pub const DEFAULT_SERIAL_PORT_NUMBER: u16 = 7;
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";
pub const DEFAULT_TCP_PORT: u16 = 9001;
pub const DEFAULT_IPC_PATH: &str = "/tmp/data_reader_ipc.sock";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportConfig {
    Serial { port_number: u16 },
    Tcp { host: String, port: u16 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderConfig {
    pub transport: TransportConfig,
    pub ipc_path: String,
}

/// `parse_reader_args` either yields a ready-to-run config or reports that
/// the caller asked for help (print usage, exit 0) — never a mix of the
/// two, matching §6's "exit 0 on help, exit 1 on any other argument error".
pub enum ReaderArgsOutcome {
    Help,
    Run(ReaderConfig),
}

pub fn parse_reader_args(args: &[String]) -> Result<ReaderArgsOutcome, ConfigError> {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(ReaderArgsOutcome::Help);
    }

    let transport = match args.first().map(String::as_str) {
        None => TransportConfig::Serial { port_number: DEFAULT_SERIAL_PORT_NUMBER },
        Some("-s") => {
            let host = args.get(1).cloned().unwrap_or_else(|| DEFAULT_TCP_HOST.to_string());
            let port = match args.get(2) {
                Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidTcpPort(raw.clone()))?,
                None => DEFAULT_TCP_PORT,
            };
            TransportConfig::Tcp { host, port }
        }
        Some(raw) => {
            let port_number: u16 = raw.parse().map_err(|_| ConfigError::InvalidPortNumber(raw.to_string()))?;
            if !(1..=999).contains(&port_number) {
                return Err(ConfigError::InvalidPortNumber(raw.to_string()));
            }
            TransportConfig::Serial { port_number }
        }
    };

    Ok(ReaderArgsOutcome::Run(ReaderConfig { transport, ipc_path: DEFAULT_IPC_PATH.to_string() }))
}

pub fn reader_usage() -> &'static str {
    "usage: adc-reader [N | -s [host [port]]] [-h]\n\
     \n\
     \x20 (no args)       serial COM7\n\
     \x20 N               serial COMN, N in 1..999\n\
     \x20 -s [host [port]] TCP, default 127.0.0.1:9001\n\
     \x20 -h, --help      show this message\n"
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulatorConfig {
    pub port: u16,
    pub csv_path: Option<String>,
}

pub enum SimulatorArgsOutcome {
    Help,
    Version,
    Info,
    Run(SimulatorConfig),
}

pub fn parse_simulator_args(args: &[String]) -> Result<SimulatorArgsOutcome, ConfigError> {
    let mut port = DEFAULT_TCP_PORT;
    let mut csv_path = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" => return Ok(SimulatorArgsOutcome::Help),
            "--version" => return Ok(SimulatorArgsOutcome::Version),
            "--info" => return Ok(SimulatorArgsOutcome::Info),
            "--port" => {
                i += 1;
                let raw = args.get(i).ok_or_else(|| ConfigError::UnrecognizedArgument("--port requires a value".into()))?;
                port = raw.parse::<u16>().map_err(|_| ConfigError::InvalidTcpPort(raw.clone()))?;
            }
            "--csv" => {
                i += 1;
                let raw = args.get(i).ok_or_else(|| ConfigError::UnrecognizedArgument("--csv requires a value".into()))?;
                csv_path = Some(raw.clone());
            }
            other => return Err(ConfigError::UnrecognizedArgument(other.to_string())),
        }
        i += 1;
    }

    Ok(SimulatorArgsOutcome::Run(SimulatorConfig { port, csv_path }))
}

pub fn simulator_usage() -> &'static str {
    "usage: adc-simulator [--port P] [--csv FILE] [--help | --version | --info]\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reader_args_select_serial_com7() {
        let outcome = parse_reader_args(&[]).unwrap();
        match outcome {
            ReaderArgsOutcome::Run(cfg) => assert_eq!(cfg.transport, TransportConfig::Serial { port_number: 7 }),
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn numeric_arg_selects_serial_comn() {
        let args = vec!["42".to_string()];
        let outcome = parse_reader_args(&args).unwrap();
        match outcome {
            ReaderArgsOutcome::Run(cfg) => assert_eq!(cfg.transport, TransportConfig::Serial { port_number: 42 }),
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn out_of_range_port_number_is_rejected() {
        let args = vec!["1000".to_string()];
        assert!(parse_reader_args(&args).is_err());
    }

    #[test]
    fn dash_s_selects_tcp_with_defaults() {
        let args = vec!["-s".to_string()];
        let outcome = parse_reader_args(&args).unwrap();
        match outcome {
            ReaderArgsOutcome::Run(cfg) => assert_eq!(cfg.transport, TransportConfig::Tcp { host: "127.0.0.1".into(), port: 9001 }),
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn dash_s_with_host_and_port() {
        let args = vec!["-s".to_string(), "192.168.1.5".to_string(), "9100".to_string()];
        let outcome = parse_reader_args(&args).unwrap();
        match outcome {
            ReaderArgsOutcome::Run(cfg) => assert_eq!(cfg.transport, TransportConfig::Tcp { host: "192.168.1.5".into(), port: 9100 }),
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn help_flag_short_circuits() {
        let args = vec!["-h".to_string()];
        assert!(matches!(parse_reader_args(&args).unwrap(), ReaderArgsOutcome::Help));
    }

    #[test]
    fn simulator_parses_port_and_csv() {
        let args = vec!["--port".to_string(), "9500".to_string(), "--csv".to_string(), "data.csv".to_string()];
        let outcome = parse_simulator_args(&args).unwrap();
        match outcome {
            SimulatorArgsOutcome::Run(cfg) => {
                assert_eq!(cfg.port, 9500);
                assert_eq!(cfg.csv_path, Some("data.csv".to_string()));
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn simulator_rejects_unknown_flag() {
        let args = vec!["--bogus".to_string()];
        assert!(parse_simulator_args(&args).is_err());
    }
}

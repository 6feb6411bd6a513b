//! Flowmeter Gateway - LoRa bridge for the flowmeter receiver
//!
//! The field device broadcasts a 12-byte binary frame every second. The
//! radio front-end relays each frame as a UDP datagram to this gateway, which
//! decodes it and posts the reading to the receiver as JSON.
//!
//! # Lifecycle
//!
//! 1. Gateway binds the UDP listen address
//! 2. Each valid frame is queued for the forwarder
//! 3. The forwarder posts the reading; on failure it is appended to the spool
//! 4. On Ctrl+C the listener stops and queued frames are drained
//!
//! # Usage
//!
//! ```bash
//! flowmeter-gateway --endpoint http://receiver:8080/
//!
//! # For debugging
//! flowmeter-gateway --listen 127.0.0.1:1700 --foreground
//! ```

mod config;
mod forwarder;
mod radio;

use std::env;
use std::path::PathBuf;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{error, info, Level};

use flowmeter_common::LoraPacket;

use forwarder::{run_forwarder, FallbackForwarder, HttpForwarder};
use radio::run_radio_listener;

/// Command line arguments
#[derive(Debug, PartialEq)]
struct Args {
    /// UDP address for radio frames
    listen: String,

    /// Receiver URL
    endpoint: String,

    /// Custom spool path
    spool_path: Option<PathBuf>,

    /// Only spool readings, never post them
    offline: bool,

    /// Verbose logging for debugging
    foreground: bool,
}

/// What the command line asked for
#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

impl Args {
    fn parse<I>(args: I) -> Result<Command, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().skip(1);

        let mut parsed = Args {
            listen: config::DEFAULT_LISTEN_ADDR.to_string(),
            endpoint: config::DEFAULT_ENDPOINT.to_string(),
            spool_path: None,
            offline: false,
            foreground: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--listen" => {
                    parsed.listen = args.next().ok_or("--listen requires an address")?;
                }
                "--endpoint" => {
                    parsed.endpoint = args.next().ok_or("--endpoint requires a URL")?;
                }
                "--spool" => {
                    let path = args.next().ok_or("--spool requires a path")?;
                    parsed.spool_path = Some(PathBuf::from(path));
                }
                "--offline" => {
                    parsed.offline = true;
                }
                "--foreground" | "-f" => {
                    parsed.foreground = true;
                }
                "--help" | "-h" => return Ok(Command::Help),
                "--version" | "-V" => return Ok(Command::Version),
                other => {
                    return Err(format!("Unknown argument: {}", other));
                }
            }
        }

        Ok(Command::Run(parsed))
    }
}

fn print_help() {
    println!(
        r#"Flowmeter Gateway - LoRa bridge for the flowmeter receiver

USAGE:
    flowmeter-gateway [OPTIONS]

OPTIONS:
    --listen <ADDR>       UDP address for radio frames (default: {listen})
    --endpoint <URL>      Receiver URL (default: {endpoint})
    --spool <PATH>        Spool for unsent readings (default: ~/.flowmeter/spool.jsonl)
    --offline             Spool every reading without posting
    --foreground, -f      Verbose logging for debugging
    --help, -h            Show this help message
    --version, -V         Show version
"#,
        listen = config::DEFAULT_LISTEN_ADDR,
        endpoint = config::DEFAULT_ENDPOINT,
    );
}

#[tokio::main]
async fn main() {
    let args = match Args::parse(env::args()) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return;
        }
        Ok(Command::Version) => {
            println!("flowmeter-gateway {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run 'flowmeter-gateway --help' for usage");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_level = if args.foreground { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Flowmeter Gateway v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("Gateway failed: {}", e);
        std::process::exit(1);
    }

    info!("Flowmeter Gateway shutdown complete");
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let spool_path = args.spool_path
        .or_else(config::get_spool_path)
        .ok_or("Could not determine spool path")?;
    info!("Spool: {}", spool_path.display());

    let http = if args.offline {
        info!("Offline mode, readings are only spooled");
        None
    } else {
        info!("Receiver: {}", args.endpoint);
        Some(HttpForwarder::new(&args.endpoint)?)
    };
    let forwarder = FallbackForwarder::new(http, spool_path);

    let socket = UdpSocket::bind(&args.listen).await?;

    let (packet_tx, packet_rx) = mpsc::channel::<LoraPacket>(config::CHANNEL_CAPACITY);

    let forwarder_handle = tokio::spawn(run_forwarder(packet_rx, forwarder));

    let listener_handle = tokio::spawn(async move {
        if let Err(e) = run_radio_listener(socket, packet_tx).await {
            error!("Radio listener error: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Received interrupt signal, starting graceful shutdown");

    // Dropping the listener drops the last sender, which ends the forwarder
    listener_handle.abort();
    let _ = listener_handle.await;

    if tokio::time::timeout(config::get_shutdown_grace(), forwarder_handle)
        .await
        .is_err()
    {
        error!("Forwarder did not drain within {:?}", config::get_shutdown_grace());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        let argv = std::iter::once("flowmeter-gateway")
            .chain(args.iter().copied())
            .map(String::from);
        Args::parse(argv)
    }

    #[test]
    fn test_defaults() {
        let Ok(Command::Run(args)) = parse(&[]) else {
            panic!("expected run command");
        };
        assert_eq!(args.listen, config::DEFAULT_LISTEN_ADDR);
        assert_eq!(args.endpoint, config::DEFAULT_ENDPOINT);
        assert_eq!(args.spool_path, None);
        assert!(!args.offline);
        assert!(!args.foreground);
    }

    #[test]
    fn test_all_options() {
        let parsed = parse(&[
            "--listen", "127.0.0.1:1800",
            "--endpoint", "http://receiver/",
            "--spool", "/tmp/spool.jsonl",
            "--offline",
            "-f",
        ]);
        assert_eq!(
            parsed,
            Ok(Command::Run(Args {
                listen: "127.0.0.1:1800".to_string(),
                endpoint: "http://receiver/".to_string(),
                spool_path: Some(PathBuf::from("/tmp/spool.jsonl")),
                offline: true,
                foreground: true,
            }))
        );
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["--help"]), Ok(Command::Help));
        assert_eq!(parse(&["-V"]), Ok(Command::Version));
    }

    #[test]
    fn test_errors() {
        assert!(parse(&["--listen"]).unwrap_err().contains("requires"));
        assert!(parse(&["--bogus"]).unwrap_err().contains("Unknown argument"));
    }
}

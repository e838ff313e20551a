//! Main application entry point.

use pairsketch_app::{App, AppConfig, AppError};
use pairsketch_core::{Config, NativeTransport};

const USAGE: &str = "Usage: pairsketch [--config <file>] [--broker <url>] [--connect <peer>]";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<AppConfig, AppError> {
    let mut config_path = None;
    let mut broker = None;
    let mut connect = None;

    while let Some(arg) = args.next() {
        let slot = match arg.as_str() {
            "--config" => &mut config_path,
            "--broker" => &mut broker,
            "--connect" => &mut connect,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}\n{}", other, USAGE);
                std::process::exit(2);
            }
        };
        match args.next() {
            Some(value) => *slot = Some(value),
            None => {
                eprintln!("Missing value for {}\n{}", arg, USAGE);
                std::process::exit(2);
            }
        }
    }

    let mut config = match config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    if let Some(url) = broker {
        config.broker_url = url;
    }

    Ok(AppConfig { config, connect })
}

fn main() {
    env_logger::init();
    log::info!("Starting PairSketch");

    let result = parse_args(std::env::args().skip(1)).and_then(App::<NativeTransport>::run);
    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

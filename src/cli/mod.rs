pub mod config;

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use config::BridgeConfig;

/// Build the command line interface.
pub fn command() -> Command {
    Command::new("heatstake-bridge")
        .about("Bridge a heat-staking controller's Modbus RTU registers to the operator console")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("JSON configuration file; flags below override its values")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Serial port of the controller")
                .value_name("PORT"),
        )
        .arg(
            Arg::new("baud-rate")
                .long("baud-rate")
                .short('b')
                .help("Serial baud rate")
                .value_name("BAUD")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("slave-id")
                .long("slave-id")
                .help("Modbus slave id of the controller")
                .value_name("ID")
                .value_parser(clap::value_parser!(u8).range(1..=247)),
        )
        .arg(
            Arg::new("websocket")
                .long("websocket")
                .short('w')
                .help("WebSocket URL of the operator console")
                .value_name("URL"),
        )
        .arg(
            Arg::new("tip-states")
                .long("tip-states")
                .help("Persisted tip-state JSON file")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .help("Print the effective configuration as JSON and exit")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    command().get_matches()
}

/// Load the config file (if any) and apply command line overrides
pub fn resolve_config(matches: &ArgMatches) -> Result<BridgeConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}"))?,
        None => BridgeConfig::default(),
    };

    if let Some(port) = matches.get_one::<String>("port") {
        config.port_name = port.clone();
    }
    if let Some(baud) = matches.get_one::<u32>("baud-rate") {
        config.baud_rate = *baud;
    }
    if let Some(slave_id) = matches.get_one::<u8>("slave-id") {
        config.slave_id = *slave_id;
    }
    if let Some(url) = matches.get_one::<String>("websocket") {
        config.websocket_url = url.clone();
    }
    if let Some(path) = matches.get_one::<String>("tip-states") {
        config.tip_state_file = path.into();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

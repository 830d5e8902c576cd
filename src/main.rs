use anyhow::{Context, Result};
use std::path::Path;

use heatstake_bridge::{
    boot, cli,
    core::{persistence::load_tip_states, Shutdown},
    protocol::{modbus::RtuTransport, ws::TungsteniteSocket},
    Bridge,
};

fn main() {
    boot::init_logger();
    if let Err(err) = run() {
        log::error!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = cli::parse_args();
    let config = cli::resolve_config(&matches)?;

    if matches.get_flag("print-config") {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let shutdown = Shutdown::new();
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || handler_shutdown.trigger())
        .context("Failed to install Ctrl-C handler")?;

    let tip_states = load_tip_states(Path::new(&config.tip_state_file)).with_context(|| {
        format!(
            "Failed to read tip states from {}",
            config.tip_state_file.display()
        )
    })?;

    log::info!(
        "Opening {} at {} baud, slave {}",
        config.port_name,
        config.baud_rate,
        config.slave_id
    );
    let transport = RtuTransport::open(&config.port_name, &config.serial_config())
        .with_context(|| format!("Failed to open serial port {}", config.port_name))?;

    log::info!("Connecting to console at {}", config.websocket_url);
    let socket = TungsteniteSocket::connect(
        &config.websocket_url,
        config.ws_read_timeout(),
        config.ws_write_timeout(),
    )
    .with_context(|| format!("Failed to connect to {}", config.websocket_url))?;

    Bridge::new(config.sync_settings(), tip_states, shutdown)
        .run(transport, socket)
        .context("Bridge stopped")
}

//! Crosspoint - command-line control for SIS matrix switchers
//!
//! Connects to a switcher over TCP or serial (or to a built-in simulator),
//! prints routing changes as they happen and accepts commands on stdin.
//!
//! ```text
//! crosspoint [--config <file>] [--traffic] [--virtual] [--list-ports]
//! ```

mod console;
mod settings;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use sis_matrix::{run_connection, run_stream, EventFilter, MatrixHandle};
use sis_sim::{run_virtual_matrix_task, VirtualMatrix, VirtualMatrixCommand, VirtualMatrixConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::{format_event, format_status, ConsoleCommand, MuteAction, VolumeAction, HELP};
use settings::{LinkSettings, Settings};

#[derive(Parser, Debug)]
#[command(name = "crosspoint", version, about = "Control an SIS matrix switcher from the console")]
struct Args {
    /// Settings file (defaults to the XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every line sent and received
    #[arg(short, long)]
    traffic: bool,

    /// Run without a device; routes are looped back locally
    #[arg(long = "virtual")]
    virtual_mode: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{} (USB {:04x}:{:04x}{})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.map(|p| format!(" {}", p)).unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Start whatever carries bytes to the switcher
///
/// Returns the simulator's command channel when the link is simulated.
fn start_link(
    settings: &Settings,
    matrix: &MatrixHandle,
) -> Option<mpsc::Sender<VirtualMatrixCommand>> {
    if settings.matrix.virtual_mode {
        info!("Virtual mode, no device connection");
        return None;
    }

    match &settings.link {
        LinkSettings::Simulated {
            inputs,
            outputs,
            password,
        } => {
            let (engine_side, device_side) = tokio::io::duplex(4096);
            let (sim_tx, sim_rx) = mpsc::channel(16);
            let device = VirtualMatrix::new(
                "sim",
                VirtualMatrixConfig {
                    dialect: settings.matrix.dialect,
                    inputs: *inputs,
                    outputs: *outputs,
                    password: password.clone(),
                    ..Default::default()
                },
            );
            tokio::spawn(async move {
                if let Err(e) = run_virtual_matrix_task(device_side, device, sim_rx).await {
                    warn!("Simulator stopped: {}", e);
                }
            });

            let handle = matrix.clone();
            tokio::spawn(async move {
                if let Err(e) = run_stream(engine_side, &handle).await {
                    warn!("Simulated link stopped: {}", e);
                }
            });
            Some(sim_tx)
        }
        link => {
            if let Some(connection) = link.connection() {
                tokio::spawn(run_connection(
                    connection,
                    matrix.clone(),
                    settings.matrix.reconnect_delay(),
                ));
            }
            None
        }
    }
}

async fn execute(
    command: ConsoleCommand,
    matrix: &MatrixHandle,
    sim: Option<&mpsc::Sender<VirtualMatrixCommand>>,
    settings: &Settings,
    config_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    match command {
        ConsoleCommand::Route {
            input,
            output,
            kind,
        } => matrix.route(input, output, kind).await?,
        ConsoleCommand::Poll => matrix.poll().await?,
        ConsoleCommand::PollRoutes => matrix.poll_routes().await?,
        ConsoleCommand::PollSync => matrix.poll_sync().await?,
        ConsoleCommand::Preset(preset) => matrix.recall_preset(preset).await?,
        ConsoleCommand::Volume { output, action } => match action {
            VolumeAction::Up => matrix.volume_up(output).await?,
            VolumeAction::Down => matrix.volume_down(output).await?,
            VolumeAction::Set(level) => matrix.set_volume(output, level).await?,
        },
        ConsoleCommand::Mute { output, action } => match action {
            MuteAction::On => matrix.mute(output, true).await?,
            MuteAction::Off => matrix.mute(output, false).await?,
            MuteAction::Toggle => matrix.toggle_mute(output).await?,
        },
        ConsoleCommand::Verbose(level) => matrix.set_verbose_mode(level).await?,
        ConsoleCommand::Raw(text) => matrix.send_raw(text).await?,
        ConsoleCommand::Status => println!("{}", format_status(&matrix.snapshot())),
        ConsoleCommand::SimRoute {
            input,
            output,
            kind,
        } => {
            simulator(sim)?
                .send(VirtualMatrixCommand::SetRoute {
                    input,
                    output,
                    kind,
                })
                .await?
        }
        ConsoleCommand::SimSync { input, detected } => {
            simulator(sim)?
                .send(VirtualMatrixCommand::SetSync { input, detected })
                .await?
        }
        ConsoleCommand::SimReboot => simulator(sim)?.send(VirtualMatrixCommand::Reboot).await?,
        ConsoleCommand::Save => {
            let path = settings.save(config_path.map(|p| p.as_path()))?;
            println!("settings saved to {}", path.display());
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn simulator(
    sim: Option<&mpsc::Sender<VirtualMatrixCommand>>,
) -> anyhow::Result<&mpsc::Sender<VirtualMatrixCommand>> {
    sim.context("not connected to the simulator")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crosspoint=info,sis_protocol=info,sis_matrix=info,sis_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    if args.list_ports {
        return list_ports();
    }

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    settings.show_traffic |= args.traffic;
    settings.matrix.virtual_mode |= args.virtual_mode;

    info!(
        "Crosspoint {} starting ({}, {})",
        env!("CARGO_PKG_VERSION"),
        settings.matrix.dialect.name(),
        settings.link.describe()
    );

    let matrix = MatrixHandle::spawn(settings.matrix.clone())?;
    let sim = start_link(&settings, &matrix);

    let mut events = matrix.subscribe_filtered(if settings.show_traffic {
        EventFilter::All
    } else {
        EventFilter::NoTraffic
    });
    let show_traffic = settings.show_traffic;
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(text) = format_event(&event, show_traffic) {
                println!("{}", text);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) =
            execute(command, &matrix, sim.as_ref(), &settings, args.config.as_ref()).await
        {
            eprintln!("error: {}", e);
        }
    }

    if let Some(sim) = sim {
        let _ = sim.send(VirtualMatrixCommand::Shutdown).await;
    }
    matrix.shutdown().await?;
    info!("Crosspoint stopped");
    Ok(())
}

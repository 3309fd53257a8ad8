use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use launchgrid_core::{
    DeviceError, DeviceSession, LaunchConfig, Launcher, LedColor, DEFAULT_CONFIG_PATH,
};

/// Pads whose action panicked are repainted red.
const FAULT_COLOR: LedColor = LedColor::RED;

/// Turn a Launchpad X grid into a programmable macro launcher.
#[derive(Parser, Debug)]
#[command(name = "launchgrid")]
#[command(about = "Launchpad macro launcher")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// MIDI input port name (overrides the configuration)
    #[arg(long)]
    input: Option<String>,

    /// MIDI output port name (overrides the configuration)
    #[arg(long)]
    output: Option<String>,

    /// Print the available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_ports {
        print_ports()?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = LaunchConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Err(problems) = config.validate() {
        for problem in problems {
            log::warn!("{}", problem);
        }
    }

    let configured = config.device.clone();
    let input = args
        .input
        .or_else(|| configured.as_ref().map(|d| d.input.clone()))
        .context("no MIDI input port given; pass --input or set device.input")?;
    let output = args
        .output
        .or_else(|| configured.as_ref().map(|d| d.output.clone()))
        .context("no MIDI output port given; pass --output or set device.output")?;

    let device = match DeviceSession::open(&input, &output) {
        Ok(device) => Arc::new(device),
        Err(DeviceError::EndpointNotFound {
            direction,
            name,
            available,
        }) => {
            eprintln!("{} port '{}' not found.", direction, name);
            eprintln!("Available {} ports: {:?}", direction, available);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let launcher = Launcher::new(Arc::clone(&device));
    let handle = launcher.downgrade();
    launcher.set_fault_hook(move |fault| {
        // Flag the pad; an exclusive fault repaints the grid on its way out
        if !fault.exclusive {
            handle.recolor(fault.position, FAULT_COLOR);
        }
    });

    let report = launchgrid_actions::default_catalog().load(&config, &launcher);
    if report.registered == 0 {
        log::warn!("No actions registered; the grid will stay dark");
    }

    device.enter_control_mode();
    launcher.repaint();
    launcher.start();
    log::info!("Listening on '{}'; press Ctrl-C to quit", input);

    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    let engine = launcher.clone();
    tokio::task::spawn_blocking(move || engine.shutdown()).await?;

    device.clear_all();
    device.exit_control_mode();
    device.close();
    Ok(ExitCode::SUCCESS)
}

fn print_ports() -> Result<(), anyhow::Error> {
    let ports = DeviceSession::list_ports()?;
    println!("Input ports:");
    for name in &ports.inputs {
        println!("  {}", name);
    }
    println!("Output ports:");
    for name in &ports.outputs {
        println!("  {}", name);
    }
    Ok(())
}

//! Device backend listing command.

use std::path::Path;

use clap::Args;
use mezcla_core::DeviceMode;
use mezcla_io::WaveBackend;

use super::common::load_config;

#[derive(Args)]
pub struct DevicesArgs {
    /// Only list backends that can capture
    #[arg(long)]
    capture: bool,
}

pub fn run(args: DevicesArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let wave = WaveBackend::new(&config.waveout.path).paced(config.waveout.paced);
    let backends = mezcla_io::standard_backends(Some(wave));

    println!("Device Backends");
    println!("===============\n");
    println!("Preference order: {}\n", config.devices.join(", "));

    for backend in &backends {
        let name = backend.name();
        let rank = config
            .devices
            .iter()
            .position(|d| d == name)
            .map_or_else(|| "-".to_string(), |i| (i + 1).to_string());

        let capture = backend.list_devices(DeviceMode::Read);
        if args.capture && capture.as_ref().is_ok_and(Vec::is_empty) {
            continue;
        }

        println!("[{rank}] {name}");
        print_devices("playback", backend.list_devices(DeviceMode::Write));
        print_devices("capture", capture);
        println!();
    }

    println!("Tip: pick a backend and device with --backend/--device:");
    println!("  mezcla play song.wav --backend native --device \"USB\"");
    Ok(())
}

fn print_devices(label: &str, devices: mezcla_core::Result<Vec<String>>) {
    match devices {
        Ok(names) if names.is_empty() => println!("  {label}: none"),
        Ok(names) => {
            println!("  {label}:");
            for (idx, name) in names.iter().enumerate() {
                println!("    [{idx}] {name}");
            }
        }
        Err(e) => println!("  {label}: unavailable ({e})"),
    }
}

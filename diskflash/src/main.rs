use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};
use diskflash_core::DeviceDescriptor;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "diskflash")]
#[command(about = "A safe disk enumeration and imaging tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all attached storage devices
    List {
        /// Emit the device report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clean a device and write an image to it
    Flash {
        /// Image file to write
        #[arg(required = true)]
        image: PathBuf,

        /// Target device path (e.g. \\.\PhysicalDrive2 or /dev/sdb);
        /// skips the interactive selection
        #[arg(short, long)]
        device: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short = 'y', long = "yes")]
        yes: bool,
    },
}

/// Presents an interactive menu over the devices considered safe to
/// flash: removable, not the system disk, not virtual, and accessible.
fn select_device(devices: &[DeviceDescriptor]) -> Result<DeviceDescriptor> {
    let candidates: Vec<&DeviceDescriptor> = devices
        .iter()
        .filter(|d| d.is_removable && !d.is_system && !d.is_virtual && d.error.is_empty())
        .collect();

    if candidates.is_empty() {
        return Err(anyhow!(
            "No removable devices found. Use --device to target a device explicitly."
        ));
    }

    let items: Vec<String> = candidates.iter().map(|d| d.to_string()).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the target device to WRITE to")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(candidates[selection].clone())
}

/// Presents a final "Yes/No" confirmation to the user.
fn confirm_operation(prompt: &str) -> Result<bool> {
    let confirmation = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmation)
}

fn print_device_table(devices: &[DeviceDescriptor]) {
    println!(
        "  {:<22} {:<30} {:<10} {:<8} {}",
        "DEVICE", "DESCRIPTION", "SIZE", "KIND", "LOCATION"
    );
    println!("  {:-<22} {:-<30} {:-<10} {:-<8} {:-<20}", "", "", "", "", "");
    for device in devices {
        let location = if !device.error.is_empty() {
            format!("({})", device.error)
        } else if device.mountpoints.is_empty() {
            "(Not mounted)".to_string()
        } else {
            device.mountpoints.join(", ")
        };
        println!(
            "  {:<22} {:<30} {:>8.1} GB {:<8} {}",
            device.raw,
            device.description,
            device.size_gb(),
            device.kind(),
            location
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List { json } => {
            let devices = diskflash_core::platform::list_storage_devices()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
                return Ok(());
            }
            if devices.is_empty() {
                println!("No storage devices found.");
                return Ok(());
            }
            println!("Found {} storage devices:\n", devices.len());
            print_device_table(&devices);
        }
        Commands::Flash { image, device, yes } => {
            let devices = diskflash_core::platform::list_storage_devices()?;
            let target = match device {
                // An explicit path bypasses the safety filter; the core
                // still refuses the system disk.
                Some(path) => devices
                    .iter()
                    .find(|d| d.raw == path || d.device_path == path)
                    .cloned()
                    .ok_or_else(|| anyhow!("No attached device matches '{path}'"))?,
                None => select_device(&devices)?,
            };

            println!(
                "{} This will erase all data on '{}' ({:.1} GB).",
                style("WARNING:").red().bold(),
                target.description,
                target.size_gb(),
            );
            println!("  Device: {}", style(&target.raw).cyan());
            println!("  Image:  {}", style(image.display()).cyan());
            println!();

            if !yes && !confirm_operation("Are you sure you want to proceed?")? {
                println!("Flash operation cancelled.");
                return Ok(());
            }

            println!();

            let mut image_file = File::open(&image)?;
            let image_size = image_file.metadata().map(|m| m.len()).unwrap_or(0);

            // One bar over the whole flow; the core reports percent and a
            // short status for each milestone.
            let pb = ProgressBar::new(100);
            pb.set_prefix("Flashing");
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{prefix:12} [{elapsed_precise}] [{bar:40.green/black}] {pos:>3}% {msg}",
                    )
                    .unwrap()
                    .progress_chars("■ "),
            );

            let result = diskflash_core::flash::flash_to_disk(
                &mut image_file,
                image_size,
                &target.raw,
                &mut |percent, status| {
                    pb.set_position(percent as u64);
                    pb.set_message(status.to_string());
                },
            );

            match result {
                Ok(()) => {
                    pb.finish_with_message("Done flashing.");
                    println!(
                        "\n✨ Successfully flashed {} with {}.",
                        style(&target.raw).cyan(),
                        style(image.display()).cyan()
                    );
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e.into());
                }
            }
        }
    }

    Ok(())
}

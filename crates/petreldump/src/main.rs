use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use shearlink::session::Session;
use shearlink::transport::Transport;

mod ble;

#[derive(Parser)]
#[command(
    name = "petreldump",
    about = "Download dive logs from Shearwater dive computers over BLE",
    long_about = "Connects to a Shearwater dive computer advertising the BLE serial \
service, reads its identity, scans the dive manifest, and downloads dive logs \
in the Petrel native format.",
    subcommand_required = true,
    arg_required_else_help = true,
    after_help = "Examples:\n  petreldump info\n  petreldump list\n  petreldump download --output ./dives --count 5"
)]
struct Cli {
    /// Peripheral id to connect to (defaults to the first device found)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Scan duration in seconds
    #[arg(long, default_value_t = 3, global = true)]
    scan: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show model, serial number, and firmware version
    Info,
    /// List the dives the device advertises in its manifest, newest first
    List,
    /// Download dives, writing each raw log next to a parsed summary
    Download {
        /// Output directory
        #[arg(long, default_value = ".")]
        output: PathBuf,
        /// Stop after this many dives (newest first)
        #[arg(long)]
        count: Option<usize>,
    },
}

fn new_progress_bar(size: u64) -> ProgressBar {
    let pb = ProgressBar::new(size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let link = ble::BtleplugLink::connect(cli.device, Duration::from_secs(cli.scan)).await?;
    let write_type = link.preferred_write_type();
    let transport = Transport::new(link, write_type).await?;
    let mut session = Session::new(transport);

    let result = run(&mut session, cli.command).await;
    if let Err(err) = session.close().await {
        tracing::warn!(%err, "session close failed");
    }
    result
}

async fn run(session: &mut Session<ble::BtleplugLink>, command: Commands) -> Result<()> {
    match command {
        Commands::Info => {
            let info = session.read_device_info().await?;
            println!("Device");
            println!("  Model:    {}", info.model);
            println!("  Serial:   {}", info.serial);
            println!("  Firmware: {}", info.firmware);
        }
        Commands::List => {
            let candidates = session.download_manifest().await?;
            if candidates.is_empty() {
                println!("No dives on device");
            }
            for candidate in &candidates {
                println!(
                    "{:3}  {}  @ {:#010x}",
                    candidate.ordinal,
                    hex::encode_upper(candidate.fingerprint),
                    candidate.address
                );
            }
        }
        Commands::Download { output, count } => {
            let mut candidates = session.download_manifest().await?;
            if let Some(count) = count {
                candidates.truncate(count);
            }
            if candidates.is_empty() {
                println!("No dives on device");
                return Ok(());
            }

            std::fs::create_dir_all(&output)?;
            let pb = new_progress_bar(candidates.len() as u64);
            let logs = session
                .download_dives(&candidates, |progress| {
                    pb.set_position(progress.current_log_index as u64 - 1);
                    pb.set_message(format!(
                        "dive {}/{} ({} bytes)",
                        progress.current_log_index,
                        progress.total_logs,
                        progress.current_log_bytes
                    ));
                })
                .await?;
            pb.finish_with_message("download complete");

            for log in &logs {
                let name = format!("dive-{}.bin", hex::encode_upper(log.fingerprint));
                std::fs::write(output.join(&name), &log.raw_data)?;
                match &log.dive {
                    Some(dive) => println!(
                        "{name}: {} samples, max {:.1} m, {} s",
                        dive.samples.len(),
                        dive.max_depth_m,
                        dive.duration_s
                    ),
                    None => println!("{name}: raw only (log did not decode)"),
                }
            }
        }
    }
    Ok(())
}

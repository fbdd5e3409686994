use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mooer_core::files::{BackupArchive, FileKind, IrContainer, MoFile};
use mooer_core::preset::ModuleKind;
use mooer_core::session::{DeviceSession, SessionConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Mooer GE-series USB control tool", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show firmware version and device name
    Identify,
    /// List preset names in a slot range
    List {
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=199))]
        start: u8,
        #[arg(long, default_value_t = 199, value_parser = clap::value_parser!(u8).range(0..=199))]
        end: u8,
    },
    /// Print one preset
    Read {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=199))]
        slot: u8,
    },
    /// Switch the active preset
    Select {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=199))]
        slot: u8,
    },
    /// Reorder the signal chain of the active preset
    Order {
        /// Module names in chain order, e.g. fx od amp cab ns eq mod delay reverb
        #[arg(required = true, num_args = 1..=9)]
        modules: Vec<ModuleKind>,
    },
    /// Save all presets to a .mbf backup
    Backup { output: PathBuf },
    /// Write a .mbf backup back to the device
    Restore {
        input: PathBuf,
        /// Replace named presets already on the device
        #[arg(long)]
        overwrite: bool,
    },
    /// Save one preset as a .mo file
    Export {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=199))]
        slot: u8,
        output: PathBuf,
    },
    /// Store a .mo file into a slot
    Import {
        input: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=199))]
        slot: u8,
    },
    /// Upload a .gnr impulse response to a user IR slot
    UploadIr {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=9))]
        slot: u8,
        file: PathBuf,
    },
    /// Decode a .mo, .gnr or .mbf file without a device
    Inspect { file: PathBuf },
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    let open = || DeviceSession::open(&config);

    match args.command {
        Commands::Identify => {
            let mut session = open()?;
            let info = session.identify()?;
            let caps = info.capabilities();
            println!("Device:    {}", info.device_name);
            println!("Firmware:  {}", info.firmware);
            println!("MIDI:      {}", caps.midi);
            println!("Bluetooth: {}", caps.bluetooth);
        }
        Commands::List { start, end } => {
            let mut session = open()?;
            for entry in session.list_presets(start, end)? {
                if entry.empty {
                    println!("{:03} -", entry.slot);
                } else {
                    println!("{:03} {}", entry.slot, entry.name);
                }
            }
        }
        Commands::Read { slot } => {
            let mut session = open()?;
            print!("{}", session.read_preset(slot)?);
        }
        Commands::Select { slot } => {
            let mut session = open()?;
            session.select_preset(slot)?;
            info!(slot, "Preset selected");
        }
        Commands::Order { modules } => {
            let mut session = open()?;
            session.set_effect_order(&modules)?;
            info!(?modules, "Effect order set");
        }
        Commands::Backup { output } => {
            let mut session = open()?;
            let archive = session.backup(|done, total| {
                if done % 20 == 0 || done == total {
                    info!("Read {}/{} slots", done, total);
                }
            })?;
            write_file(&output, &archive.encode())?;
            println!(
                "Saved {} presets to {}",
                archive.presets().filter(|p| p.is_named()).count(),
                output.display()
            );
        }
        Commands::Restore { input, overwrite } => {
            let mut session = open()?;
            let archive = BackupArchive::decode(&read_file(&input)?)
                .with_context(|| format!("decoding {}", input.display()))?;
            let report = session.restore(&archive, overwrite)?;
            println!(
                "Restored {} presets ({} protected, {} empty)",
                report.written.len(),
                report.protected.len(),
                report.empty
            );
            if !report.protected.is_empty() {
                println!("Protected slots: {:?} (use --overwrite to replace)", report.protected);
            }
        }
        Commands::Export { slot, output } => {
            let mut session = open()?;
            let preset = session.read_preset(slot)?;
            write_file(&output, &MoFile::new(preset.clone()).encode())?;
            println!("Exported \"{}\" to {}", preset.name(), output.display());
        }
        Commands::Import { input, slot } => {
            let mut session = open()?;
            let file = MoFile::decode(&read_file(&input)?)
                .with_context(|| format!("decoding {}", input.display()))?;
            session.store_preset(slot, &file.preset)?;
            println!("Imported \"{}\" into slot {}", file.preset.name(), slot);
        }
        Commands::UploadIr { slot, file } => {
            let mut session = open()?;
            let container = IrContainer::decode(&read_file(&file)?)
                .with_context(|| format!("decoding {}", file.display()))?;
            session.upload_ir(slot, &container)?;
            println!("Uploaded {} bytes to IR slot {}", container.ir_data.len(), slot);
        }
        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let data = read_file(path)?;
    let Some(kind) = FileKind::detect(path, &data) else {
        bail!("{}: not a .mo, .gnr or .mbf file", path.display());
    };
    println!("{}: {} ({} bytes)", path.display(), kind, data.len());

    match kind {
        FileKind::Mo => {
            let file = MoFile::decode(&data)?;
            print!("{}", file.preset);
        }
        FileKind::Gnr => {
            let ir = IrContainer::decode(&data)?;
            println!("  info:    {} bytes", ir.info.len());
            println!("  IR data: {} bytes at offset 0x{:X}", ir.ir_data.len(), ir.data_offset());
        }
        FileKind::Mbf => {
            let archive = BackupArchive::decode(&data)?;
            println!("  manufacturer: {}", archive.manufacturer);
            println!("  model:        {}", archive.model_name);
            println!("  version:      {}", archive.version);
            println!("  occupied:     {}/{}", archive.occupied(), archive.entries().len());
            for preset in archive.presets().filter(|p| p.is_named()) {
                println!("  {:03} {}", preset.slot, preset.name());
            }
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

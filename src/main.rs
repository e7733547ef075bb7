use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use sensorfix::fixes::{self, all_operations, resolve, ApplyOptions, CheckOperation};
use sensorfix::flac::vorbis::read_vorbis_comments;
use sensorfix::flac::{read_metadata_blocks, MetadataBlock, StreamInfo};
use sensorfix::frontier_labs::{read_firmware, FirmwareRecord};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sensorfix", version, about = "Inspect and repair acoustic sensor recordings")]
struct Cli {
    /// Log more (-v info, -vv debug, -vvv trace); overrides RUST_LOG
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Report format
    #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
    format: Format,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and repair known problems
    Fix {
        #[command(subcommand)]
        action: FixCommand,
    },
    /// Show STREAMINFO, metadata blocks and firmware of a FLAC file
    Info {
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum FixCommand {
    /// Report which problems affect each file; never modifies anything
    Check {
        #[command(flatten)]
        selection: Selection,
    },
    /// Repair affected files
    Apply {
        #[command(flatten)]
        selection: Selection,
        /// Report what would change without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,
        /// Copy each file to <file>.bak before changing it
        #[arg(short, long)]
        backup: bool,
        /// Do not rename files with unfixable problems
        #[arg(long)]
        no_rename: bool,
    },
    /// List the known problems
    List,
}

#[derive(Args)]
struct Selection {
    /// Files or directories to process
    #[arg(required = true, num_args = 1..)]
    targets: Vec<PathBuf>,
    /// Problem id to process, e.g. FL010; repeatable
    #[arg(short, long = "fix")]
    fixes: Vec<String>,
    /// Process every known problem
    #[arg(short, long, conflicts_with = "fixes")]
    all: bool,
}

#[derive(Serialize)]
struct InfoReport {
    path:        PathBuf,
    blake3:      String,
    stream_info: StreamInfo,
    blocks:      Vec<MetadataBlock>,
    vendor:      Option<String>,
    firmware:    Option<FirmwareRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Fix ──────────────────────────────────────────────────────────────
        Commands::Fix { action: FixCommand::List } => {
            if cli.format == Format::Json {
                for op in all_operations() {
                    println!("{}", serde_json::to_string(&op.info())?);
                }
            } else {
                println!("{:<6} {:<8} {:<5} {:<9} {}", "Id", "Fixable", "Safe", "Automatic", "Title");
                for op in all_operations() {
                    let info = op.info();
                    println!("{:<6} {:<8} {:<5} {:<9} {}",
                        info.problem.id, yes_no(info.fixable), yes_no(info.safe),
                        yes_no(info.automatic), info.problem.title);
                    if cli.format == Format::Table {
                        println!("       {}", info.problem.url);
                    }
                }
            }
        }

        Commands::Fix { action: FixCommand::Check { selection } } => {
            let ops = selection.operations()?;
            let files = expand_targets(&selection.targets)?;
            for result in fixes::check(&files, &ops) {
                match cli.format {
                    Format::Json    => println!("{}", serde_json::to_string(&result)?),
                    Format::Compact => println!("{}", result.compact()),
                    Format::Table   => print!("{}", result.table()),
                }
            }
        }

        Commands::Fix { action: FixCommand::Apply { selection, dry_run, backup, no_rename } } => {
            if selection.fixes.is_empty() && !selection.all {
                return Err("no fixes selected: pass --fix <ID> or --all".into());
            }
            let ops = selection.operations()?;
            let options = ApplyOptions { dry_run, backup, no_rename };
            for file in expand_targets(&selection.targets)? {
                let result = match fixes::apply(&file, &ops, &options) {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(path = %file.display(), error = %e, "could not process file");
                        eprintln!("{}: {e}", file.display());
                        continue;
                    }
                };
                match cli.format {
                    Format::Json    => println!("{}", serde_json::to_string(&result)?),
                    Format::Compact => println!("{}", result.compact()),
                    Format::Table   => print!("{}", result.table()),
                }
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let report = info_report(&input)?;
            if cli.format == Format::Json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            let si = &report.stream_info;
            println!("── FLAC ─────────────────────────────────────────────────");
            println!("  Path           {}", report.path.display());
            println!("  BLAKE3         {}", report.blake3);
            println!("  Sample rate    {} Hz", si.sample_rate);
            println!("  Channels       {}", si.channels);
            println!("  Bit depth      {}", si.bits_per_sample);
            println!("  Total samples  {}", si.total_samples);
            println!("  Block size     {}..{}", si.min_block_size, si.max_block_size);
            println!("  Frame size     {}..{} B", si.min_frame_size, si.max_frame_size);
            println!("  MD5            {}", hex::encode(si.md5));
            println!("  Vendor         {}", report.vendor.as_deref().unwrap_or("-"));
            match &report.firmware {
                Some(fw) => println!("  Firmware       {} (tags: {})", fw.version_text, fw.tags.join(" ")),
                None     => println!("  Firmware       -"),
            }
            println!("  Metadata blocks ({}):", report.blocks.len());
            for block in &report.blocks {
                println!("    {:<14} offset={:<8} length={}{}",
                    format!("{:?}", block.block_type), block.byte_offset, block.length,
                    if block.is_last { "  (last)" } else { "" });
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

impl Selection {
    fn operations(&self) -> Result<Vec<&'static dyn CheckOperation>, Box<dyn std::error::Error>> {
        if self.all || self.fixes.is_empty() {
            return Ok(all_operations().to_vec());
        }
        let mut ops = Vec::with_capacity(self.fixes.len());
        for id in &self.fixes {
            ops.push(resolve(id)?);
        }
        // keep pipeline order whatever order the ids were given in
        ops.sort_by_key(|op| all_operations().iter().position(|o| o.info().problem.id == op.info().problem.id));
        ops.dedup_by_key(|op| op.info().problem.id);
        Ok(ops)
    }
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,sensorfix=info")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Files as given, directories expanded recursively, sorted for stable output.
fn expand_targets(targets: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending: Vec<PathBuf> = targets.to_vec();
    while let Some(path) = pending.pop() {
        if path.is_dir() {
            for entry in std::fs::read_dir(&path)? {
                pending.push(entry?.path());
            }
        } else {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn info_report(path: &Path) -> Result<InfoReport, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let stream_info = StreamInfo::read(&mut file)?;
    let blocks = read_metadata_blocks(&mut file)?;
    let vendor = read_vorbis_comments(&mut file).ok().map(|c| c.vendor);
    let firmware = read_firmware(&mut file).ok();
    Ok(InfoReport {
        path: path.to_owned(),
        blake3: sensorfix::files::checksum(path)?,
        stream_info,
        blocks,
        vendor,
        firmware,
    })
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

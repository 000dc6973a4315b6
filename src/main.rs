use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uf2tool::header::{flags, DEFAULT_BLOCK_PAYLOAD_SIZE};
use uf2tool::{Family, FileOptions, FileSummary, MagicOverrides, Uf2File};

/// Pico flash is mapped at 0x10000000; MicroPython keeps its filesystem
/// 0xa0000 into flash.
const DEFAULT_FS_OFFSET: u32 = 0x1000_0000 + 0xa_0000;

#[derive(Parser)]
#[command(name = "uf2", about = "Inspect, build and edit UF2 firmware files")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a UF2 file
    Info {
        input: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every block
    List {
        input: PathBuf,
    },
    /// Write the payload of a UF2 file to a raw binary
    Extract {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Only blocks starting at or above this address (decimal, 0x hex, or bare hex like a0000)
        #[arg(long, default_value = "0", value_parser = parse_u32)]
        offset_start: u32,
        /// Only blocks starting below this address (same forms as --offset-start)
        #[arg(long, value_parser = parse_u32)]
        offset_end: Option<u32>,
        /// Pad address gaps with zero bytes
        #[arg(long)]
        fill_gaps: bool,
    },
    /// Build a UF2 file from a raw binary
    Create {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target address of the first byte (decimal, 0x hex, or bare hex like a0000)
        #[arg(short, long, value_parser = parse_u32)]
        address: u32,
        /// Family name (see `uf2 families`) or numeric id
        #[arg(short, long, default_value = "RP2040", value_parser = parse_family)]
        family: u32,
        /// Payload bytes per block (1-476)
        #[arg(long, default_value_t = DEFAULT_BLOCK_PAYLOAD_SIZE)]
        chunk_size: usize,
        #[arg(long)]
        fill_gaps: bool,
        /// Replacement for the second start magic number
        #[arg(long, value_parser = parse_u32)]
        magic_start: Option<u32>,
        /// Replacement for the final magic number
        #[arg(long, value_parser = parse_u32)]
        magic_end: Option<u32>,
    },
    /// Add a binary image to an existing UF2 file
    Inject {
        base: PathBuf,
        image: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Target address of the image (decimal, 0x hex, or bare hex like a0000)
        #[arg(long, default_value_t = DEFAULT_FS_OFFSET, value_parser = parse_u32)]
        offset: u32,
        /// Keep address gaps instead of padding them
        #[arg(long)]
        no_fill_gaps: bool,
    },
    /// List known board families
    Families,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json } => {
            let uf2     = Uf2File::open(&input)?;
            let summary = FileSummary::of(&uf2);
            if json {
                println!("{}", summary.to_json()?);
            } else {
                println!("── UF2 file ─────────────────────────────────────────────");
                println!("  Path           {}", input.display());
                print!("{summary}");
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let uf2 = Uf2File::open(&input)?;
            println!("{:>6} {:>11} {:>5} {:>10}  {:<24} Data",
                     "Index", "Number", "Size", "Address", "Flags");
            for (i, block) in uf2.iter().enumerate() {
                let h = &block.header;
                let preview = &block.payload()[..block.payload().len().min(8)];
                println!("{:>6} {:>5}/{:<5} {:>5} {:#010x}  {:<24} {}",
                    i, h.block_number, h.total_blocks, block.payload().len(),
                    h.address, flags::describe(h.flags), hex::encode(preview));
            }
        }

        // ── Extract ──────────────────────────────────────────────────────────
        Commands::Extract { input, output, offset_start, offset_end, fill_gaps } => {
            info!("loading {}", input.display());
            let mut uf2 = Uf2File::open(&input)?;
            uf2.sort_blocks();
            if fill_gaps {
                uf2.generate_blocks_for_gaps()?;
            }
            let data = uf2.extract_payload(offset_start, offset_end);
            info!("extracted {} bytes of payload", data.len());
            std::fs::write(&output, &data)?;
            println!("Wrote {} bytes to {}", data.len(), output.display());
        }

        // ── Create ───────────────────────────────────────────────────────────
        Commands::Create { input, output, address, family, chunk_size, fill_gaps, magic_start, magic_end } => {
            let opts = FileOptions {
                family_id: family,
                fill_gaps,
                magic: MagicOverrides::new(magic_start, magic_end),
                ..Default::default()
            };
            let mut uf2 = Uf2File::with_options(opts);
            let data = std::fs::read(&input)?;
            let added = uf2.append_payload_chunked(&data, address, chunk_size)?;
            uf2.save(&output)?;
            println!("Created: {} ({added} blocks)", output.display());
        }

        // ── Inject ───────────────────────────────────────────────────────────
        Commands::Inject { base, image, output, offset, no_fill_gaps } => {
            let opts = FileOptions { fill_gaps: !no_fill_gaps, ..Default::default() };
            info!("loading {}", base.display());
            let mut uf2 = Uf2File::open_with(&base, opts)?;
            info!("injecting {} @ {offset:#x}", image.display());
            uf2.append_payload(&std::fs::read(&image)?, offset)?;
            uf2.save(&output)?;
            println!("Resulting UF2 file: {} ({} blocks)", output.display(), uf2.len());
        }

        // ── Families ─────────────────────────────────────────────────────────
        Commands::Families => {
            println!("{:<14} {:<12} Description", "Name", "Id");
            for fam in Family::all() {
                println!("{:<14} {:#010x}   {}", fam.name, fam.id, fam.description);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Decimal first, then hexadecimal with or without a `0x` prefix. Bare input
/// that is not decimal is read as hex, so `ff` is 255 but `10` is ten.
fn parse_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|e| format!("'{s}': {e}"));
    }
    s.parse::<u32>()
        .or_else(|_| u32::from_str_radix(s, 16))
        .map_err(|e| format!("'{s}': {e}"))
}

fn parse_family(s: &str) -> Result<u32, String> {
    match Family::by_name(s) {
        Some(fam) => Ok(fam.id),
        None      => parse_u32(s).map_err(|_| format!("unknown family '{s}'")),
    }
}

use clap::{Parser, Subcommand};
use modpak::archive::ArchiveReader;
use modpak::builder::{build_with_options, BuildOptions};
use modpak::header::Header;
use modpak::ContentSource;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modpak", about = "Pack, unpack and inspect .modpak mod archives")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a mod directory into a .modpak archive
    Pack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Follow symbolic links inside the mod directory
        #[arg(long)]
        follow_links: bool,
        /// Glob pattern of files to leave out (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,
    },
    /// Unpack a .modpak archive
    Unpack {
        input: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// List archive contents
    List {
        input: PathBuf,
        #[arg(short, long, default_value = "*")]
        pattern: String,
        /// Only list top-level entries
        #[arg(long)]
        top_level: bool,
    },
    /// Show archive metadata
    Info {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output, follow_links, exclude } => {
            let opts = BuildOptions { follow_links, exclude };
            let summary = build_with_options(&input, &output, &opts)?;
            println!(
                "Created: {} ({} files, {} B -> {} B)",
                output.display(), summary.files, summary.uncompressed_bytes, summary.archive_bytes
            );
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output_dir } => {
            let ar = ArchiveReader::open(&input)?;
            let count = ar.extract_all(&output_dir)?;
            println!("Unpacked {count} files to: {}", output_dir.display());
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, pattern, top_level } => {
            let ar = ArchiveReader::open(&input)?;
            for path in ar.enumerate_files(&pattern, !top_level)? {
                println!("{path}");
            }
        }

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let ar = ArchiveReader::open(&input)?;
            let header = Header::read(std::fs::File::open(&input)?)?;
            let entries = ar.entries()?;
            let total: u64 = entries.iter().map(|e| e.uncompressed_size).sum();
            let stored: u64 = entries.iter().map(|e| e.compressed_size).sum();

            println!("── .modpak Archive ──────────────────────────────────────");
            println!("  Path           {}", input.display());
            println!("  Format version {}", header.version);
            println!("  TOC offset     {} B", header.toc_offset);
            println!("  Files          {}", entries.len());
            println!("  Uncompressed   {total} B");
            println!("  Stored         {stored} B");
            match ar.manifest() {
                Ok(m)  => println!("  Mod id         {}", m.id),
                Err(e) => println!("  Mod id         ({e})"),
            }
            println!();
            println!("{:<40} {:>12} {:>12}  BLAKE3", "Path", "Size", "Stored");
            for entry in &entries {
                let data = ar.read_file(&entry.path)?;
                let digest = blake3::hash(&data);
                println!("{:<40} {:>12} {:>12}  {}",
                    entry.path, entry.uncompressed_size, entry.compressed_size,
                    hex::encode(&digest.as_bytes()[..6]));
            }
        }
    }

    Ok(())
}

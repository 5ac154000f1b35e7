//! piccord: watermark images per user and trace leaked copies back.
//!
//! Run examples:
//! # Watermark an image for a user, with a label and a timestamp
//! cargo run --bin piccord -- embed -i photo.png -o shared.png \
//!     --user 1234 --label alice --timestamp
//!
//! # Find out who a leaked copy was shown to
//! cargo run --bin piccord -- decode -w leaked.png -r photo.png

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::{error, info, warn};
use piccord_watermark::{
    recover_mask, ChannelMask, IdentityTable, WatermarkConfig, WatermarkError, WatermarkSession,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const IDENTITY_DB_FILE: &str = "identities.bin";
/// Labels are cut to this many characters before painting.
const MAX_LABEL_CHARS: usize = 100;

#[derive(Parser)]
#[command(version, about = "Per-user forensic image watermarking", long_about = None)]
struct Cli {
    /// JSON config file (timezone, label layout, default channels)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Identity table mapping external user ids to 16-bit ids
    #[arg(long, global = true, default_value = IDENTITY_DB_FILE)]
    identity_db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct MarkArgs {
    /// Internal 16-bit id to embed
    #[arg(long, conflicts_with = "user", required_unless_present = "user")]
    id: Option<u16>,

    /// External user id; looked up (or allocated) in the identity table
    #[arg(short, long)]
    user: Option<String>,

    /// Text label tiled over the image
    #[arg(short, long)]
    label: Option<String>,

    /// Stamp the current time in the bottom-right corner
    #[arg(short, long)]
    timestamp: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark a single image
    Embed {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        mark: MarkArgs,
    },
    /// Watermark several images at once for the same user
    Batch {
        /// Directory the watermarked copies are written to
        #[arg(short, long)]
        out_dir: PathBuf,

        #[command(flatten)]
        mark: MarkArgs,

        inputs: Vec<PathBuf>,
    },
    /// Write the per-channel difference sheet of a watermarked image
    Inspect {
        #[arg(short, long)]
        watermarked: PathBuf,

        /// The unwatermarked original
        #[arg(short = 'r', long)]
        original: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Recover the embedded id from a watermarked image
    Decode {
        #[arg(short, long)]
        watermarked: PathBuf,

        #[arg(short = 'r', long)]
        original: PathBuf,

        /// Channels the id was painted on (defaults to the config's id channels)
        #[arg(long)]
        channels: Option<ChannelMask>,
    },
    /// Show which external user an internal id belongs to
    Whois {
        #[arg(long)]
        id: u16,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WatermarkConfig::load(path)
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => WatermarkConfig::default(),
    };

    match &cli.command {
        Commands::Embed { input, output, mark } => {
            let id = resolve_id(mark, &cli.identity_db)?;
            handle_embed(input, output, id, mark, &config)?;
        }
        Commands::Batch { out_dir, mark, inputs } => {
            let id = resolve_id(mark, &cli.identity_db)?;
            handle_batch(out_dir, inputs, id, mark, &config)?;
        }
        Commands::Inspect { watermarked, original, output } => {
            handle_inspect(watermarked, original, output)?;
        }
        Commands::Decode { watermarked, original, channels } => {
            let channels = channels.unwrap_or(config.channels.id);
            handle_decode(watermarked, original, channels, &cli.identity_db)?;
        }
        Commands::Whois { id } => {
            let table = IdentityTable::load(&cli.identity_db)?;
            match table.record(*id) {
                Some(record) => println!(
                    "{} -> {} (first seen {}, last seen {})",
                    id, record.external_id, record.created_at, record.last_accessed_at
                ),
                None => println!("{} is not assigned", id),
            }
        }
    }

    Ok(())
}

// -------------------------------------------------------------------
// --- EMBEDDING ---
// -------------------------------------------------------------------

fn resolve_id(mark: &MarkArgs, identity_db: &Path) -> Result<u16> {
    if let Some(id) = mark.id {
        return Ok(id);
    }
    let Some(user) = &mark.user else {
        bail!("either --id or --user is required");
    };
    let mut table = IdentityTable::load(identity_db)?;
    let id = table.get_or_allocate(user)?;
    table.save(identity_db)?;
    println!("User '{}' has internal id {}", user, id);
    Ok(id)
}

/// Paints id, label and timestamp as requested and composes the result.
fn watermark(
    original: &RgbaImage,
    id: u16,
    mark: &MarkArgs,
    config: &WatermarkConfig,
) -> Result<RgbaImage> {
    let mut session = WatermarkSession::with_config(original, config.clone())?;
    session.paint_id(id, config.channels.id);
    if let Some(label) = &mark.label {
        let label: String = label.chars().take(MAX_LABEL_CHARS).collect();
        session.paint_label(&label, config.channels.label);
    }
    if mark.timestamp {
        session.paint_timestamp(config.channels.timestamp)?;
    }
    Ok(session.compose())
}

fn handle_embed(
    input: &Path,
    output: &Path,
    id: u16,
    mark: &MarkArgs,
    config: &WatermarkConfig,
) -> Result<()> {
    let original = image::open(input)
        .with_context(|| format!("reading '{}'", input.display()))?
        .to_rgba8();
    println!("Read '{}' ({}x{})", input.display(), original.width(), original.height());

    let marked = watermark(&original, id, mark, config)?;
    save_png(marked, output)?;
    println!("Saved watermarked image to '{}'", output.display());
    Ok(())
}

/// One session per image, each on its own blocking task.
fn handle_batch(
    out_dir: &Path,
    inputs: &[PathBuf],
    id: u16,
    mark: &MarkArgs,
    config: &WatermarkConfig,
) -> Result<()> {
    if inputs.is_empty() {
        bail!("batch needs at least one input image");
    }
    fs::create_dir_all(out_dir)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let failures = runtime.block_on(async {
        let mut handles = Vec::with_capacity(inputs.len());
        for (input, name) in inputs.iter().zip(output_names(inputs)) {
            let input = input.clone();
            let output = out_dir.join(name);
            let mark = mark.clone();
            let config = config.clone();
            handles.push(tokio::task::spawn_blocking(move || -> Result<PathBuf> {
                let original = image::open(&input)
                    .with_context(|| format!("reading '{}'", input.display()))?
                    .to_rgba8();
                let marked = watermark(&original, id, &mark, &config)?;
                save_png(marked, &output)?;
                Ok(output)
            }));
        }

        let mut failures = 0usize;
        for handle in handles {
            match handle.await {
                Ok(Ok(path)) => println!("  ✓ {}", path.display()),
                Ok(Err(e)) => {
                    error!("Watermarking failed: {:#}", e);
                    failures += 1;
                }
                Err(e) => {
                    error!("Worker task panicked: {}", e);
                    failures += 1;
                }
            }
        }
        failures
    });

    println!("Watermarked {} of {} images", inputs.len() - failures, inputs.len());
    if failures > 0 {
        bail!("{} images failed", failures);
    }
    Ok(())
}

/// `<stem>.png` for each input. Inputs sharing a stem (`shots/a.png` and
/// `raw/a.jpg`) get `-1`, `-2`, ... appended so no output overwrites another.
fn output_names(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let mut name = format!("{}.png", stem);
            let mut n = 1;
            while !taken.insert(name.clone()) {
                name = format!("{}-{}.png", stem, n);
                n += 1;
            }
            PathBuf::from(name)
        })
        .collect()
}

fn save_png(img: RgbaImage, path: &Path) -> Result<()> {
    DynamicImage::ImageRgba8(img)
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("writing '{}'", path.display()))?;
    info!("Wrote '{}'", path.display());
    Ok(())
}

// -------------------------------------------------------------------
// --- TRACING ---
// -------------------------------------------------------------------

fn load_pair(watermarked: &Path, original: &Path) -> Result<(DynamicImage, DynamicImage)> {
    let wm = image::open(watermarked)
        .with_context(|| format!("reading '{}'", watermarked.display()))?;
    let orig =
        image::open(original).with_context(|| format!("reading '{}'", original.display()))?;
    Ok((wm, orig))
}

fn handle_inspect(watermarked: &Path, original: &Path, output: &Path) -> Result<()> {
    let (wm, orig) = load_pair(watermarked, original)?;
    let recovered = recover_mask(&wm, &orig)?;
    save_png(recovered.inspection_sheet(), output)?;
    println!("Saved inspection sheet to '{}'", output.display());
    Ok(())
}

fn handle_decode(
    watermarked: &Path,
    original: &Path,
    channels: ChannelMask,
    identity_db: &Path,
) -> Result<()> {
    let (wm, orig) = load_pair(watermarked, original)?;
    let recovered = recover_mask(&wm, &orig)?;

    if !recovered.has_id_signal(channels)? {
        warn!("No grid cell on channels '{}' differs from the original", channels);
        println!("✗ No id signal on channels '{}'", channels);
        println!("  → The image is unwatermarked, foreign, or carries id 0");
        bail!("no id to attribute");
    }

    match recovered.decode_id(channels) {
        Ok(id) => {
            println!("Recovered id: {}", id);
            let table = IdentityTable::load(identity_db)?;
            match table.external_id(id) {
                Some(user) => println!("Shown to user: {}", user),
                None => println!("Id {} is not in the identity table", id),
            }
            Ok(())
        }
        Err(WatermarkError::ChecksumMismatch { payload, stored, computed }) => {
            println!(
                "✗ Checksum mismatch (payload {}, stored {}, computed {})",
                payload, stored, computed
            );
            println!("  → The image may be foreign, heavily edited, or carry id 65535");
            bail!("could not recover a trustworthy id");
        }
        Err(e) => Err(e.into()),
    }
}

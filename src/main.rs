use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use autocompress::batch::{compress_batch, BatchInput, BatchSummary};
use autocompress::pdf::{recompress_pdf, DEFAULT_DPI};
use autocompress::{
    format_file_size, Budget, CompressionRequest, OutputCodec, SearchConfig, SizeUnit,
};
use clap::{Args, Parser, Subcommand};

/// Compress images, optionally to a maximum file size
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress one or more image files
    Image {
        /// Input images (JPEG, PNG, WEBP, BMP, TIFF)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory for compressed_<name> outputs
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        search: SearchArgs,
    },
    /// Re-encode the pages of a scanned PDF
    Pdf {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file
        output: PathBuf,

        /// Rasterization density
        #[arg(long, default_value_t = DEFAULT_DPI)]
        dpi: u32,

        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// Output format: jpeg, png, webp, bmp, tiff
    #[arg(long, default_value = "jpeg")]
    format: String,

    /// Baseline quality (1-100), ignored by lossless formats
    #[arg(long, default_value_t = 85)]
    quality: u8,

    /// Maximum output size, in --unit
    #[arg(long)]
    max_size: Option<f64>,

    /// Unit of --max-size: kb or mb
    #[arg(long, default_value = "kb")]
    unit: String,
}

impl TargetArgs {
    fn request(&self) -> Result<CompressionRequest> {
        let codec: OutputCodec = self.format.parse()?;
        let mut request = CompressionRequest::new(codec, self.quality);
        if let Some(amount) = self.max_size {
            let unit: SizeUnit = self.unit.parse()?;
            request = request.with_budget(Budget::new(amount, unit))?;
        }
        Ok(request)
    }
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Quality points dropped per attempt
    #[arg(long, default_value_t = SearchConfig::default().quality_step)]
    quality_step: u8,

    /// Lowest quality the search will try
    #[arg(long, default_value_t = SearchConfig::default().quality_floor)]
    quality_floor: u8,

    /// Encode attempts per quality descent
    #[arg(long, default_value_t = SearchConfig::default().max_quality_attempts)]
    max_attempts: u32,

    /// Dimension multiplier per downscale step
    #[arg(long, default_value_t = SearchConfig::default().shrink_ratio)]
    shrink_ratio: f32,

    /// Maximum number of downscale steps
    #[arg(long, default_value_t = SearchConfig::default().max_downscale_steps)]
    max_downscales: u32,
}

impl SearchArgs {
    fn config(&self) -> Result<SearchConfig> {
        let config = SearchConfig {
            quality_step: self.quality_step,
            quality_floor: self.quality_floor,
            max_quality_attempts: self.max_attempts,
            shrink_ratio: self.shrink_ratio,
            max_downscale_steps: self.max_downscales,
            ..SearchConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}

fn run_images(
    inputs: &[PathBuf],
    output_dir: &Path,
    target: &TargetArgs,
    search: &SearchArgs,
) -> Result<()> {
    let request = target.request()?;
    let config = search.config()?;
    if !output_dir.is_dir() {
        bail!("Output directory {:?} does not exist", output_dir);
    }

    let inputs = inputs
        .iter()
        .map(|path| {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(BatchInput::new(name, bytes))
        })
        .collect::<Result<Vec<_>>>()?;

    let start = Instant::now();
    let items = compress_batch(&inputs, &request, &config);
    for item in &items {
        println!("{}", item.describe());
        if let Some(path) = item
            .write_to_dir(output_dir)
            .with_context(|| format!("Failed to write output for {}", item.name))?
        {
            println!("  -> {}", path.display());
        }
    }

    let summary = BatchSummary::from_items(&items);
    println!("{}", summary.describe());
    println!("Done in {:.2?}", start.elapsed());
    Ok(())
}

fn run_pdf(
    input: &Path,
    output: &Path,
    dpi: u32,
    target: &TargetArgs,
    search: &SearchArgs,
) -> Result<()> {
    let request = target.request()?;
    let config = search.config()?;

    println!("Loading PDF: {:?}", input);
    let bytes = std::fs::read(input).context("Failed to load PDF")?;
    let start = Instant::now();
    let compressed =
        recompress_pdf(&bytes, dpi, &request, &config).context("Failed to compress PDF")?;
    std::fs::write(output, &compressed).context("Failed to save PDF")?;

    println!("Original size: {}", format_file_size(bytes.len() as u64));
    println!("New size:      {}", format_file_size(compressed.len() as u64));
    println!("Done in {:.2?}", start.elapsed());
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Image {
            inputs,
            output_dir,
            target,
            search,
        } => run_images(inputs, output_dir, target, search),
        Command::Pdf {
            input,
            output,
            dpi,
            target,
            search,
        } => run_pdf(input, output, *dpi, target, search),
    }
}

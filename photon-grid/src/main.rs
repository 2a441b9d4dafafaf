use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use photon_grid_lib::batch::{build_paths, execute, run, ProcessConfig};
use photon_grid_lib::common::{
    DEFAULT_CHUNK_SIZE, DEFAULT_MIN_SPLAT_RATIO, DEFAULT_PHI_STEPS, DEFAULT_THETA_STEPS,
};
use photon_grid_lib::metrics::{read_distribution, Divergence};
use photon_grid_lib::{read_bundle, read_bundle_async, GridShape, PhotonBundle, PhotonFormat};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "Photon Grid",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Builds hemispherical PDF grids from renderer photon bundles"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a directory of raw renderer output into training shards.
    Process {
        #[arg(
            short = 'i',
            long = "raw",
            value_name = "RAW_DIR",
            env = "PHOTON_GRID_RAW",
            help = "Directory holding pdf_*.exr and photons_*.bin files."
        )]
        raw: PathBuf,

        #[arg(
            short = 'o',
            long = "renders",
            value_name = "RENDERS_DIR",
            env = "PHOTON_GRID_RENDERS",
            help = "Directory receiving the iteration-NNNN shards."
        )]
        renders: PathBuf,

        #[arg(
            short = 'c',
            long = "chunk-size",
            value_name = "CHUNK_SIZE",
            default_value_t = DEFAULT_CHUNK_SIZE,
            help = "Number of pairs per shard."
        )]
        chunk_size: usize,

        #[arg(
            short = 'w',
            long = "workers",
            value_name = "WORKERS",
            default_value = "1",
            help = "Set the number of shards converted concurrently."
        )]
        workers: usize,

        #[arg(long = "no-fat", help = "Skip the unbinned photon-fat exports.")]
        no_fat: bool,

        #[command(flatten)]
        grid: GridArgs,
    },

    /// Convert one PDF image and photon bundle pair.
    Convert {
        #[arg(long = "pdf", value_name = "PDF_IN", help = "Input PDF image (.exr).")]
        pdf_in: PathBuf,

        #[arg(long = "photons", value_name = "PHOTONS_IN", help = "Input photon bundle (.bin).")]
        photons_in: PathBuf,

        #[arg(long = "pdf-out", value_name = "PDF_OUT", help = "Output greyscale PDF image.")]
        pdf_out: PathBuf,

        #[arg(long = "grid-out", value_name = "GRID_OUT", help = "Output grid (.dat).")]
        grid_out: PathBuf,

        #[command(flatten)]
        grid: GridArgs,
    },

    /// Print the contents of a photon bundle.
    Dump {
        #[arg(value_name = "INPUT", help = "Path to the photon bundle.")]
        input: PathBuf,

        #[arg(long = "depth", help = "Records carry a trailing bounce depth.")]
        depth: bool,

        #[arg(
            short = 'a',
            long = "async",
            default_value = "false",
            help = "Read the bundle asynchronously."
        )]
        async_mode: bool,
    },

    /// Compare two PDFs, each a .dat grid export or an .exr image.
    Compare {
        #[arg(value_name = "LEFT", help = "First PDF (.dat or .exr).")]
        left: PathBuf,

        #[arg(value_name = "RIGHT", help = "Second PDF (.dat or .exr).")]
        right: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(
        long = "phi-steps",
        value_name = "PHI_STEPS",
        default_value_t = DEFAULT_PHI_STEPS,
        help = "Grid resolution along phi."
    )]
    phi_steps: usize,

    #[arg(
        long = "theta-steps",
        value_name = "THETA_STEPS",
        default_value_t = DEFAULT_THETA_STEPS,
        help = "Grid resolution along theta."
    )]
    theta_steps: usize,

    #[arg(long = "depth", help = "Photon records carry a trailing bounce depth.")]
    depth: bool,

    #[arg(
        long = "min-splat-ratio",
        value_name = "RATIO",
        default_value_t = DEFAULT_MIN_SPLAT_RATIO,
        help = "Warn when fewer photons than this fraction land in the grid."
    )]
    min_splat_ratio: f64,
}

fn photon_format(depth: bool) -> PhotonFormat {
    if depth {
        PhotonFormat::WithDepth
    } else {
        PhotonFormat::V1
    }
}

impl GridArgs {
    fn config(&self) -> Result<ProcessConfig> {
        Ok(ProcessConfig {
            grid_shape: GridShape::new(self.phi_steps, self.theta_steps)?,
            format: photon_format(self.depth),
            min_splat_ratio: self.min_splat_ratio,
            ..Default::default()
        })
    }
}

fn print_bundle(bundle: &PhotonBundle) {
    let v = |v: photon_grid_lib::Vector| format!("({:.6}, {:.6}, {:.6})", v.x, v.y, v.z);
    println!(
        "Position: {} | Normal: {} | Wi: {}",
        v(bundle.position),
        v(bundle.normal),
        v(bundle.wi)
    );
    println!("{}", bundle.len());
    for photon in &bundle.photons {
        println!("{}", photon);
    }
}

fn dump(input: &Path, format: PhotonFormat, async_mode: bool) -> Result<()> {
    let bundle = if async_mode {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(read_bundle_async(input, format))
    } else {
        read_bundle(input, format)
    }
    .with_context(|| format!("Error reading photon bundle {}", input.display()))?;

    print_bundle(&bundle);
    Ok(())
}

fn compare(left: &Path, right: &Path) -> Result<()> {
    let to_f64 = |values: Vec<f32>| values.into_iter().map(f64::from).collect::<Vec<_>>();
    let p = to_f64(read_distribution(left)?);
    let q = to_f64(read_distribution(right)?);

    let divergence = Divergence::between(&p, &q)
        .with_context(|| format!("Cannot compare {} and {}", left.display(), right.display()))?;
    println!("KL: {:.6}", divergence.kl);
    println!("Chi-squared: {:.6}", divergence.chi_squared);
    println!("L1: {:.6}", divergence.l1);
    println!("L2: {:.6}", divergence.l2);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let start = Instant::now();

    match cli.command {
        Command::Process {
            raw,
            renders,
            chunk_size,
            workers,
            no_fat,
            grid,
        } => {
            println!("Input: {} | Output: {}", raw.display(), renders.display());
            let config = ProcessConfig {
                chunk_size,
                workers,
                write_fat: !no_fat,
                ..grid.config()?
            };
            let paths = build_paths(raw, renders);
            let report = run(&paths, &config).context("Batch conversion failed")?;
            for failure in &report.failures {
                eprintln!(
                    "Failed: id {} block {}: {}",
                    failure.parts.identifier, failure.parts.block, failure.message
                );
            }
            println!(
                "Wrote {} items in {} shards ({} empty PDFs skipped, {} failures).",
                report.written,
                report.shards,
                report.skipped_zero,
                report.failures.len()
            );
        }
        Command::Convert {
            pdf_in,
            photons_in,
            pdf_out,
            grid_out,
            grid,
        } => {
            let stats = execute(&pdf_in, &photons_in, &pdf_out, &grid_out, &grid.config()?)
                .with_context(|| format!("Error converting {}", photons_in.display()))?;
            println!(
                "Splatted {}/{} photons. Successfully wrote to '{}'.",
                stats.splatted,
                stats.attempted(),
                grid_out.display()
            );
        }
        Command::Dump {
            input,
            depth,
            async_mode,
        } => dump(&input, photon_format(depth), async_mode)?,
        Command::Compare { left, right } => compare(&left, &right)?,
    }

    log::debug!("Time: {} ms", start.elapsed().as_millis());
    Ok(())
}

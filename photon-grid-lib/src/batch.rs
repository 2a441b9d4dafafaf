use crate::common::{DEFAULT_CHUNK_SIZE, DEFAULT_MIN_SPLAT_RATIO};
use crate::error::{PhotonError, Result};
use crate::grid::{
    build_grid, FatPhotonDataset, GridShape, PhiThetaGrid, PhotonRepresentation, SplatStats,
};
use crate::read_bundle;
use crate::structures::{PhotonBundle, PhotonFormat};
use foldhash::{HashSet, HashSetExt};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

const PDF_PREFIX: &str = "pdf_";
const PDF_EXTENSION: &str = ".exr";
const PHOTON_PREFIX: &str = "photons_";
const PHOTON_EXTENSION: &str = ".bin";
const BLOCK_SEPARATOR: &str = "-block_";

/// Identifier and block of one renderer artifact pair, e.g. `("0001", "0x0")`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Parts {
    pub identifier: String,
    pub block: String,
}

impl Parts {
    pub fn new(identifier: impl Into<String>, block: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            block: block.into(),
        }
    }

    pub fn pdf_file_name(&self) -> String {
        format!(
            "{}{}{}{}{}",
            PDF_PREFIX, self.identifier, BLOCK_SEPARATOR, self.block, PDF_EXTENSION
        )
    }

    pub fn photon_file_name(&self) -> String {
        format!(
            "{}{}{}{}{}",
            PHOTON_PREFIX, self.identifier, BLOCK_SEPARATOR, self.block, PHOTON_EXTENSION
        )
    }
}

#[inline]
fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_parts(file_name: &str, prefix: &str, extension: &str) -> Option<Parts> {
    let stem = file_name.strip_prefix(prefix)?.strip_suffix(extension)?;
    let split = memchr::memmem::find(stem.as_bytes(), BLOCK_SEPARATOR.as_bytes())?;
    let identifier = &stem[..split];
    let block = &stem[split + BLOCK_SEPARATOR.len()..];

    let x = memchr::memchr(b'x', block.as_bytes())?;
    if !is_digits(identifier) || !is_digits(&block[..x]) || !is_digits(&block[x + 1..]) {
        return None;
    }
    Some(Parts::new(identifier, block))
}

/// Parts of a `pdf_<digits>-block_<digits>x<digits>.exr` file name.
pub fn parse_pdf_name(file_name: &str) -> Option<Parts> {
    parse_parts(file_name, PDF_PREFIX, PDF_EXTENSION)
}

/// Parts of a `photons_<digits>-block_<digits>x<digits>.bin` file name.
pub fn parse_photon_name(file_name: &str) -> Option<Parts> {
    parse_parts(file_name, PHOTON_PREFIX, PHOTON_EXTENSION)
}

pub fn build_pdf_path(root: &Path, parts: &Parts) -> PathBuf {
    root.join(parts.pdf_file_name())
}

pub fn build_photon_path(root: &Path, parts: &Parts) -> PathBuf {
    root.join(parts.photon_file_name())
}

/// Sorted parts that have both a PDF image and a photon bundle in `raw_root`.
///
/// Renders are sometimes only partially written, so an artifact without its
/// counterpart is ignored rather than reported.
pub fn valid_parts(raw_root: &Path) -> Result<Vec<Parts>> {
    let mut pdf_parts = HashSet::new();
    let mut photon_parts = HashSet::new();

    for entry in fs::read_dir(raw_root).map_err(|e| PhotonError::io(raw_root, e))? {
        let entry = entry.map_err(|e| PhotonError::io(raw_root, e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };

        if let Some(parts) = parse_pdf_name(name) {
            pdf_parts.insert(parts);
        } else if let Some(parts) = parse_photon_name(name) {
            photon_parts.insert(parts);
        }
    }

    let mut parts: Vec<Parts> = pdf_parts.intersection(&photon_parts).cloned().collect();
    parts.sort();

    log::debug!(
        "Found {} PDF images, {} photon bundles, {} complete pairs in {:?}",
        pdf_parts.len(),
        photon_parts.len(),
        parts.len(),
        raw_root
    );
    Ok(parts)
}

/// Input and output roots of a batch conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSet {
    pub raw_root: PathBuf,
    pub renders_root: PathBuf,
}

pub fn build_paths(raw_root: impl Into<PathBuf>, renders_root: impl Into<PathBuf>) -> PathSet {
    PathSet {
        raw_root: raw_root.into(),
        renders_root: renders_root.into(),
    }
}

impl PathSet {
    pub fn pdf_input(&self, parts: &Parts) -> PathBuf {
        build_pdf_path(&self.raw_root, parts)
    }

    pub fn photon_input(&self, parts: &Parts) -> PathBuf {
        build_photon_path(&self.raw_root, parts)
    }

    pub fn shard_root(&self, iteration: usize) -> PathBuf {
        self.renders_root.join(format!("iteration-{:04}", iteration))
    }
}

/// Output file names of item `index` within a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardItemPaths {
    pub pdf: PathBuf,
    pub grid: PathBuf,
    pub fat: PathBuf,
}

impl ShardItemPaths {
    pub fn new(shard_root: &Path, index: usize) -> Self {
        Self {
            pdf: shard_root.join(format!("pdf_{:05}.exr", index)),
            grid: shard_root.join(format!("photon-bundle_{:05}.dat", index)),
            fat: shard_root.join(format!("photon-fat_{:05}.dat", index)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessConfig {
    pub chunk_size: usize,
    pub grid_shape: GridShape,
    pub format: PhotonFormat,
    /// Shards converted concurrently. 1 keeps everything on the calling thread.
    pub workers: usize,
    pub write_fat: bool,
    /// Below this splat ratio a bundle is reported as suspicious.
    pub min_splat_ratio: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            grid_shape: GridShape::default(),
            format: PhotonFormat::default(),
            workers: 1,
            write_fat: true,
            min_splat_ratio: DEFAULT_MIN_SPLAT_RATIO,
        }
    }
}

/// Single-channel PDF image, one mean value per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfImage {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f32>,
}

impl PdfImage {
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|&v| v == 0.0)
    }

    /// Writes the image as RGB with the value replicated in every channel.
    pub fn write(&self, path: &Path) -> Result<()> {
        exr::prelude::write_rgb_file(path, self.width, self.height, |x, y| {
            let v = self.values[y * self.width + x];
            (v, v, v)
        })
        .map_err(|e| PhotonError::image(path, e))
    }
}

/// Reads the first RGB layer of an EXR and averages R, G and B per pixel.
pub fn convert_rgb_to_single_channel(path: &Path) -> Result<PdfImage> {
    let image = exr::prelude::read_first_rgba_layer_from_file(
        path,
        |resolution, _| PdfImage {
            width: resolution.width(),
            height: resolution.height(),
            values: vec![0.0; resolution.width() * resolution.height()],
        },
        |image: &mut PdfImage, position, (r, g, b, _): (f32, f32, f32, f32)| {
            image.values[position.y() * image.width + position.x()] = (r + g + b) / 3.0;
        },
    )
    .map_err(|e| PhotonError::image(path, e))?;

    Ok(image.layer_data.channel_data.pixels)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitFailure {
    pub parts: Parts,
    pub message: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchReport {
    pub shards: usize,
    pub written: usize,
    pub skipped_zero: usize,
    pub failures: Vec<UnitFailure>,
    pub stats: SplatStats,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.shards += other.shards;
        self.written += other.written;
        self.skipped_zero += other.skipped_zero;
        self.failures.extend(other.failures);
        self.stats.merge(&other.stats);
    }
}

enum UnitOutcome {
    Written(SplatStats),
    SkippedZero,
}

fn export_bundle(
    bundle: &PhotonBundle,
    outputs: &ShardItemPaths,
    config: &ProcessConfig,
) -> Result<SplatStats> {
    let mut grid = PhiThetaGrid::new(config.grid_shape);
    let stats = build_grid(bundle, &mut grid)?;
    grid.export_dat(&outputs.grid)?;

    if config.write_fat {
        let mut fat = FatPhotonDataset::new(bundle.format.has_depth());
        build_grid(bundle, &mut fat)?;
        fat.export_dat(&outputs.fat)?;
    }
    Ok(stats)
}

fn check_splat_ratio(stats: &SplatStats, config: &ProcessConfig, source: &Path) {
    if stats.ratio() < config.min_splat_ratio {
        log::warn!(
            "Low splat ratio for {:?}: {}/{} photons ({:.1}%)",
            source,
            stats.splatted,
            stats.attempted(),
            stats.ratio() * 100.0
        );
    }
}

fn convert_unit(
    paths: &PathSet,
    config: &ProcessConfig,
    parts: &Parts,
    outputs: &ShardItemPaths,
) -> Result<UnitOutcome> {
    let pdf_path = paths.pdf_input(parts);
    let pdf = convert_rgb_to_single_channel(&pdf_path)?;
    if pdf.is_zero() {
        log::debug!("Skipping all-zero PDF {:?}", pdf_path);
        return Ok(UnitOutcome::SkippedZero);
    }

    let photon_path = paths.photon_input(parts);
    let bundle = read_bundle(&photon_path, config.format).map_err(|e| match e {
        PhotonError::Decode(reason) => {
            PhotonError::Decode(format!("{:?}: {}", photon_path, reason))
        }
        other => other,
    })?;

    pdf.write(&outputs.pdf)?;
    let stats = export_bundle(&bundle, outputs, config)?;
    check_splat_ratio(&stats, config, &photon_path);

    Ok(UnitOutcome::Written(stats))
}

fn process_shard(
    paths: &PathSet,
    config: &ProcessConfig,
    iteration: usize,
    chunk: &[Parts],
) -> Result<BatchReport> {
    let shard_root = paths.shard_root(iteration);
    fs::create_dir_all(&shard_root).map_err(|e| PhotonError::io(&shard_root, e))?;
    log::info!(
        "Creating shard {} with {} items at {:?}",
        iteration,
        chunk.len(),
        shard_root
    );

    let mut report = BatchReport {
        shards: 1,
        ..Default::default()
    };
    for (i, parts) in chunk.iter().enumerate() {
        let outputs = ShardItemPaths::new(&shard_root, i);
        match convert_unit(paths, config, parts, &outputs) {
            Ok(UnitOutcome::Written(stats)) => {
                report.written += 1;
                report.stats.merge(&stats);
            }
            Ok(UnitOutcome::SkippedZero) => report.skipped_zero += 1,
            Err(e) => {
                log::warn!(
                    "Failed to convert id {} block {}: {}",
                    parts.identifier,
                    parts.block,
                    e
                );
                report.failures.push(UnitFailure {
                    parts: parts.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

/// Converts every complete pair under `paths.raw_root` into shards of
/// `config.chunk_size` items below `paths.renders_root`.
///
/// A pair that fails to convert is logged and listed in the report; the
/// remaining pairs are still converted.
pub fn run(paths: &PathSet, config: &ProcessConfig) -> Result<BatchReport> {
    fs::create_dir_all(&paths.renders_root).map_err(|e| PhotonError::io(&paths.renders_root, e))?;

    let parts = valid_parts(&paths.raw_root)?;
    let chunks: Vec<&[Parts]> = parts.chunks(config.chunk_size.max(1)).collect();

    let shard_reports: Vec<BatchReport> = if config.workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()?;
        pool.install(|| {
            chunks
                .par_iter()
                .enumerate()
                .map(|(iteration, chunk)| process_shard(paths, config, iteration, chunk))
                .collect::<Result<Vec<_>>>()
        })?
    } else {
        chunks
            .iter()
            .enumerate()
            .map(|(iteration, chunk)| process_shard(paths, config, iteration, chunk))
            .collect::<Result<Vec<_>>>()?
    };

    let mut report = BatchReport::default();
    for shard in shard_reports {
        report.merge(shard);
    }

    log::info!(
        "Wrote {} items in {} shards, skipped {} empty PDFs, {} failures, splat ratio {:.1}%",
        report.written,
        report.shards,
        report.skipped_zero,
        report.failures.len(),
        report.stats.ratio() * 100.0
    );
    Ok(report)
}

/// Converts a single PDF image and photon bundle pair. Unlike [`run`], the
/// image is written even when it is all zero.
pub fn execute(
    pdf_in: &Path,
    photon_in: &Path,
    pdf_out: &Path,
    grid_out: &Path,
    config: &ProcessConfig,
) -> Result<SplatStats> {
    let pdf = convert_rgb_to_single_channel(pdf_in)?;
    pdf.write(pdf_out)?;

    let bundle = read_bundle(photon_in, config.format)?;
    let mut grid = PhiThetaGrid::new(config.grid_shape);
    let stats = build_grid(&bundle, &mut grid)?;
    grid.export_dat(grid_out)?;
    check_splat_ratio(&stats, config, photon_in);

    Ok(stats)
}

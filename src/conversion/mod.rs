//! Conversion pipeline: one reader, one writer, and the report between them.
//!
//! [`convert`] reads the source into a [`Dataset`], analyses what the target
//! format can and cannot hold, writes it, and returns a
//! [`ConversionReport`] with input and output counts.
//!
//! # Destination handling
//!
//! **Writing VOC or YOLO removes the destination directory and everything in
//! it before writing.** This matches the legacy tools and keeps stale label
//! files from leaking into a new dataset. Writing COCO only creates the
//! parent directory of the output file and never touches its siblings.
//!
//! A conversion whose destination is the input, or would delete the input
//! (or the images used to size YOLO labels), is refused up front.
//!
//! Writes are not atomic: a failure part way through a directory write
//! leaves the destination partially populated.

pub mod report;

pub use report::{
    ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity, ConversionStats,
};

pub use crate::ir::io_yolo::ImageSizes;
pub use crate::ir::ErrorPolicy;

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::DetconvError;
use crate::ir::io_coco_json::{read_coco_json, write_coco_json};
use crate::ir::io_voc_xml::{read_voc_dir, write_voc_dir};
use crate::ir::io_yolo::{has_dense_ids, read_yolo_dir, write_yolo_dir};
use crate::ir::{BoxPolicy, Category, CategoryPolicy, Dataset, PixelRounding, ReadOptions};

/// Annotation formats the pipeline can read and write.
///
/// This mirrors the CLI's format flag but is decoupled from clap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Coco,
    Voc,
    Yolo,
}

impl Format {
    pub fn name(&self) -> &'static str {
        match self {
            Format::Coco => "coco",
            Format::Voc => "voc",
            Format::Yolo => "yolo",
        }
    }

    /// True for formats written as a directory of per-image files.
    pub fn is_directory(&self) -> bool {
        matches!(self, Format::Voc | Format::Yolo)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = DetconvError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "coco" => Ok(Format::Coco),
            "voc" => Ok(Format::Voc),
            "yolo" => Ok(Format::Yolo),
            _ => Err(DetconvError::UnsupportedFormat(format!(
                "'{raw}' (supported: coco, voc, yolo)"
            ))),
        }
    }
}

/// Everything a conversion can be configured with.
#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    /// How VOC readers mint category ids; an explicit list also stands in
    /// for a missing YOLO `classes.txt`.
    pub category_policy: CategoryPolicy,
    /// Image dimensions for YOLO input. Required when reading YOLO.
    pub image_sizes: Option<ImageSizes>,
    pub box_policy: BoxPolicy,
    pub pixel_rounding: PixelRounding,
    pub error_policy: ErrorPolicy,
    /// Restrict a VOC read to `ImageSets/Main/<split>.txt`.
    pub voc_split: Option<String>,
}

impl ConvertOptions {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            category_policy: self.category_policy.clone(),
            box_policy: self.box_policy,
            error_policy: self.error_policy,
        }
    }
}

/// Reads a dataset in `format` from `path`.
pub fn read(format: Format, path: &Path, options: &ConvertOptions) -> Result<Dataset, DetconvError> {
    if !path.exists() {
        return Err(DetconvError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    if options.voc_split.is_some() && format != Format::Voc {
        log::warn!("--voc-split only applies to VOC input; ignoring it");
    }

    let dataset = match format {
        Format::Coco => {
            if options.category_policy != CategoryPolicy::Insertion {
                log::warn!(
                    "COCO input keeps its own category ids; '{}' category policy is ignored",
                    options.category_policy.name()
                );
            }
            read_coco_json(path, options.box_policy)?
        }
        Format::Voc => read_voc_dir(path, options.voc_split.as_deref(), &options.read_options())?,
        Format::Yolo => {
            let sizes = options.image_sizes.as_ref().ok_or_else(|| {
                DetconvError::InvalidOption(
                    "reading YOLO labels needs image sizes: pass the image directory".to_string(),
                )
            })?;
            read_yolo_dir(path, sizes, &options.read_options())?
        }
    };

    log::info!(
        "read {format} from {}: {}",
        path.display(),
        dataset_stats(&dataset)
    );
    Ok(dataset)
}

/// Writes `dataset` in `format` to `dest` and returns what was written.
///
/// For VOC and YOLO, `dest` is deleted and recreated first.
pub fn write(
    dataset: &Dataset,
    format: Format,
    dest: &Path,
    options: &ConvertOptions,
) -> Result<ConversionStats, DetconvError> {
    match format {
        Format::Coco => write_coco_json(dest, dataset, options.pixel_rounding)?,
        Format::Voc => {
            prepare_output_dir(dest)?;
            write_voc_dir(dest, dataset, options.pixel_rounding)?;
        }
        Format::Yolo => {
            prepare_output_dir(dest)?;
            write_yolo_dir(dest, dataset)?;
        }
    }

    let stats = output_stats(dataset, format);
    log::info!("wrote {format} to {}: {stats}", dest.display());
    Ok(stats)
}

/// Converts `source` (in `from`) into `dest` (in `to`).
pub fn convert(
    from: Format,
    source: &Path,
    to: Format,
    dest: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport, DetconvError> {
    check_destination(source, to, dest, options)?;

    let dataset = read(from, source, options)?;
    let mut report = build_conversion_report(&dataset, from, to, options);

    if to.is_directory() && dest.exists() {
        report.add(ConversionIssue::info(
            ConversionIssueCode::DestinationPurged,
            format!(
                "existing destination {} was removed before writing",
                dest.display()
            ),
        ));
    }

    report.output = write(&dataset, to, dest, options)?;
    Ok(report)
}

/// Counts for a dataset as held in memory.
pub fn dataset_stats(dataset: &Dataset) -> ConversionStats {
    ConversionStats {
        images: dataset.images.len(),
        categories: dataset.categories.len(),
        bboxes: dataset.annotations.len(),
    }
}

/// Counts for `dataset` as `format` writes it.
pub fn output_stats(dataset: &Dataset, format: Format) -> ConversionStats {
    let mut stats = dataset_stats(dataset);
    if format == Format::Yolo {
        stats.images = images_with_annotations(dataset);
    }
    stats
}

/// Build a conversion report analyzing what the target format keeps.
///
/// Output counts are the expected ones; [`convert`] replaces them with what
/// was actually written.
pub fn build_conversion_report(
    dataset: &Dataset,
    from: Format,
    to: Format,
    options: &ConvertOptions,
) -> ConversionReport {
    let mut report = ConversionReport::new(from.name(), to.name());
    report.input = dataset_stats(dataset);
    report.output = output_stats(dataset, to);

    match from {
        Format::Voc => report.add(ConversionIssue::info(
            ConversionIssueCode::CategoryIdsReminted,
            format!(
                "VOC has no category ids; ids assigned by '{}' policy starting at 0",
                options.category_policy.name()
            ),
        )),
        Format::Yolo => report.add(ConversionIssue::info(
            ConversionIssueCode::CategoryIdsReminted,
            "YOLO category ids follow classes.txt line order starting at 0",
        )),
        Format::Coco => {}
    }

    match to {
        Format::Coco => add_quantization_note(&mut report, options.pixel_rounding),
        Format::Voc => {
            if from != Format::Voc {
                report.add(ConversionIssue::info(
                    ConversionIssueCode::DropCategoryIds,
                    "VOC keeps category names only; numeric ids are discarded",
                ));
            }
            analyze_box_only_target(dataset, &mut report);
            add_quantization_note(&mut report, options.pixel_rounding);
        }
        Format::Yolo => {
            analyze_box_only_target(dataset, &mut report);
            analyze_to_yolo(dataset, &mut report);
        }
    }

    report
}

/// VOC and YOLO hold names and boxes only.
fn analyze_box_only_target(dataset: &Dataset, report: &mut ConversionReport) {
    let with_supercategory = dataset
        .categories
        .iter()
        .filter(|cat| cat.supercategory.is_some())
        .count();
    if with_supercategory > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropCategorySupercategory,
            format!("{with_supercategory} category(s) have a supercategory that will be dropped"),
        ));
    }

    let with_segmentation = dataset
        .annotations
        .iter()
        .filter(|ann| ann.segmentation.is_some())
        .count();
    if with_segmentation > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropSegmentation,
            format!("{with_segmentation} annotation(s) have polygons that will be dropped"),
        ));
    }
}

fn analyze_to_yolo(dataset: &Dataset, report: &mut ConversionReport) {
    let empty = dataset.images.len() - images_with_annotations(dataset);
    if empty > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropImagesWithoutAnnotations,
            format!("{empty} image(s) have no annotations and get no YOLO label file"),
        ));
    }

    let mut sorted: Vec<&Category> = dataset.categories.iter().collect();
    sorted.sort_by_key(|cat| cat.id);
    if !has_dense_ids(&sorted) {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::YoloClassCompaction,
            format!(
                "category ids are not 0..{}; YOLO class indices are renumbered in id order",
                sorted.len()
            ),
        ));
    }
}

fn add_quantization_note(report: &mut ConversionReport, rounding: PixelRounding) {
    let message = match rounding {
        PixelRounding::Truncate => "absolute coordinates are truncated toward zero to whole pixels",
        PixelRounding::Round => {
            "absolute coordinates are rounded to whole pixels; values may differ by 1 px from legacy output"
        }
    };
    report.add(ConversionIssue::info(
        ConversionIssueCode::PixelQuantization,
        message,
    ));
}

fn images_with_annotations(dataset: &Dataset) -> usize {
    let annotated: HashSet<_> = dataset.annotations.iter().map(|ann| ann.image_id).collect();
    dataset
        .images
        .iter()
        .filter(|image| annotated.contains(&image.id))
        .count()
}

/// Refuses destinations that would overwrite or delete conversion inputs.
fn check_destination(
    source: &Path,
    to: Format,
    dest: &Path,
    options: &ConvertOptions,
) -> Result<(), DetconvError> {
    let source_abs = absolute(source);
    let dest_abs = absolute(dest);

    if source_abs == dest_abs {
        return Err(DetconvError::InvalidOption(format!(
            "destination {} is the input itself",
            dest.display()
        )));
    }

    if to.is_directory() {
        if source_abs.starts_with(&dest_abs) {
            return Err(DetconvError::InvalidOption(format!(
                "destination {} contains the input {}, which writing {to} would delete",
                dest.display(),
                source.display()
            )));
        }
        if let Some(ImageSizes::Probe(images)) = &options.image_sizes {
            if absolute(images).starts_with(&dest_abs) {
                return Err(DetconvError::InvalidOption(format!(
                    "destination {} contains the image directory {}, which writing {to} would delete",
                    dest.display(),
                    images.display()
                )));
            }
        }
    }

    Ok(())
}

/// Canonical form of `path`, resolving through its nearest existing ancestor
/// when `path` itself does not exist yet.
fn absolute(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn prepare_output_dir(dest: &Path) -> Result<(), DetconvError> {
    if dest.exists() {
        if !dest.is_dir() {
            return Err(DetconvError::InvalidOption(format!(
                "destination {} exists and is not a directory",
                dest.display()
            )));
        }
        log::info!("removing existing destination {}", dest.display());
        fs::remove_dir_all(dest).map_err(DetconvError::io(dest))?;
    }
    fs::create_dir_all(dest).map_err(DetconvError::io(dest))
}

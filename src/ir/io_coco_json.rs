//! COCO JSON reader and writer.
//!
//! A COCO dataset is one JSON document with `images`, `annotations` and
//! `categories` arrays. Boxes are `[x, y, width, height]` in absolute pixels,
//! which is the model's own form, so no geometry transform happens here.
//!
//! # Reading
//!
//! Ids are taken exactly as given; nothing is re-minted. The reader still
//! enforces the dataset invariants: unique image file names, unique
//! category ids and names, and annotations that point at existing images
//! and categories.
//!
//! # Writing
//!
//! Output follows the schema the legacy converters emitted, down to the
//! fields downstream tools look for:
//! - `"type": "instances"` at the top level
//! - `license`, `flickr_url`, `coco_url`, `date_captured` on every image
//! - `segmentation`, `area`, `iscrowd = 0`, `ignore = 0` on every annotation
//!
//! Boxes are written as integers (see [`PixelRounding`]). When an annotation
//! carries no polygon, `segmentation` is synthesised from the box corners,
//! starting top-left and going down the left edge first. That polygon is a
//! compatibility shim, not a real mask.
//!
//! Lists are sorted by id so output is reproducible.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{Annotation, Category, Dataset, Image};
use super::{AnnotationId, BBoxXYWH, BoxPolicy, CategoryId, ImageId, PixelRounding};
use crate::error::DetconvError;

const MEMORY_PATH: &str = "<memory>";
const DEFAULT_SUPERCATEGORY: &str = "none";

#[derive(Debug, Deserialize)]
struct CocoInput {
    images: Vec<CocoImageIn>,

    #[serde(default)]
    annotations: Vec<CocoAnnotationIn>,

    categories: Vec<CocoCategoryIn>,
}

#[derive(Debug, Deserialize)]
struct CocoImageIn {
    id: u64,
    file_name: String,
    width: u32,
    height: u32,

    #[serde(default)]
    date_captured: Value,
}

#[derive(Debug, Deserialize)]
struct CocoCategoryIn {
    id: u64,
    name: String,

    #[serde(default)]
    supercategory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotationIn {
    id: u64,
    image_id: u64,
    category_id: u64,
    bbox: [f64; 4],

    /// Polygons or RLE. Only polygon lists are kept.
    #[serde(default)]
    segmentation: Value,
}

#[derive(Debug, Serialize)]
struct CocoOutput<'a> {
    images: Vec<CocoImageOut<'a>>,

    #[serde(rename = "type")]
    kind: &'static str,

    annotations: Vec<CocoAnnotationOut>,

    categories: Vec<CocoCategoryOut<'a>>,
}

#[derive(Debug, Serialize)]
struct CocoImageOut<'a> {
    id: u64,
    file_name: &'a str,
    width: u32,
    height: u32,
    license: Option<u64>,
    flickr_url: Option<&'a str>,
    coco_url: Option<&'a str>,
    date_captured: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CocoAnnotationOut {
    segmentation: Value,
    area: i64,
    iscrowd: u8,
    ignore: u8,
    image_id: u64,
    bbox: [i64; 4],
    category_id: u64,
    id: u64,
}

#[derive(Debug, Serialize)]
struct CocoCategoryOut<'a> {
    supercategory: &'a str,
    id: u64,
    name: &'a str,
}

/// Reads a dataset from a COCO JSON file.
///
/// # Errors
/// `PathNotFound` if `path` does not exist, `FormatError` for malformed
/// JSON or missing required fields, `DuplicateImage` for a repeated
/// `file_name`, `UnknownCategory` for an annotation whose `category_id` is
/// not declared.
pub fn read_coco_json(path: &Path, box_policy: BoxPolicy) -> Result<Dataset, DetconvError> {
    if !path.exists() {
        return Err(DetconvError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(DetconvError::format(path, "expected a COCO JSON file"));
    }

    let file = File::open(path).map_err(DetconvError::io(path))?;
    let coco: CocoInput = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| DetconvError::format(path, source.to_string()))?;

    coco_to_ir(coco, path, box_policy)
}

/// Reads a dataset from a COCO JSON string.
pub fn from_coco_str(json: &str) -> Result<Dataset, DetconvError> {
    let path = Path::new(MEMORY_PATH);
    let coco: CocoInput = serde_json::from_str(json)
        .map_err(|source| DetconvError::format(path, source.to_string()))?;
    coco_to_ir(coco, path, BoxPolicy::default())
}

/// Reads a dataset from COCO JSON bytes.
pub fn from_coco_slice(bytes: &[u8]) -> Result<Dataset, DetconvError> {
    let path = Path::new(MEMORY_PATH);
    let coco: CocoInput = serde_json::from_slice(bytes)
        .map_err(|source| DetconvError::format(path, source.to_string()))?;
    coco_to_ir(coco, path, BoxPolicy::default())
}

/// Writes a dataset to a COCO JSON file.
///
/// Only `path` itself is created or replaced; missing parent directories are
/// created and nothing else in them is touched.
pub fn write_coco_json(
    path: &Path,
    dataset: &Dataset,
    rounding: PixelRounding,
) -> Result<(), DetconvError> {
    let coco = ir_to_coco(dataset, path, rounding)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(DetconvError::io(parent))?;
    }

    let file = File::create(path).map_err(DetconvError::io(path))?;
    serde_json::to_writer(BufWriter::new(file), &coco)
        .map_err(|source| DetconvError::format(path, source.to_string()))
}

/// Writes a dataset to a COCO JSON string.
pub fn to_coco_string(dataset: &Dataset, rounding: PixelRounding) -> Result<String, DetconvError> {
    let path = Path::new(MEMORY_PATH);
    let coco = ir_to_coco(dataset, path, rounding)?;
    serde_json::to_string(&coco).map_err(|source| DetconvError::format(path, source.to_string()))
}

fn coco_to_ir(
    coco: CocoInput,
    path: &Path,
    box_policy: BoxPolicy,
) -> Result<Dataset, DetconvError> {
    let mut categories: Vec<Category> = Vec::with_capacity(coco.categories.len());
    let mut category_ids: HashSet<u64> = HashSet::with_capacity(coco.categories.len());
    let mut category_names: HashSet<String> = HashSet::with_capacity(coco.categories.len());
    for cat in coco.categories {
        if !category_ids.insert(cat.id) {
            return Err(DetconvError::format(
                path,
                format!("category id {} is declared twice", cat.id),
            ));
        }
        if !category_names.insert(cat.name.clone()) {
            return Err(DetconvError::format(
                path,
                format!("category name '{}' is declared twice", cat.name),
            ));
        }
        categories.push(Category {
            id: CategoryId::new(cat.id),
            name: cat.name,
            supercategory: cat.supercategory,
        });
    }

    let mut images: Vec<Image> = Vec::with_capacity(coco.images.len());
    let mut file_names: HashSet<String> = HashSet::with_capacity(coco.images.len());
    let mut image_sizes: HashMap<u64, (u32, u32)> = HashMap::with_capacity(coco.images.len());
    for img in coco.images {
        if img.file_name.trim().is_empty() {
            return Err(DetconvError::format(
                path,
                format!("image {} has an empty file_name", img.id),
            ));
        }
        if img.width == 0 || img.height == 0 {
            return Err(DetconvError::format(
                path,
                format!(
                    "image '{}' has invalid size {}x{}",
                    img.file_name, img.width, img.height
                ),
            ));
        }
        if !file_names.insert(img.file_name.clone()) {
            return Err(DetconvError::DuplicateImage {
                path: path.to_path_buf(),
                file_name: img.file_name,
            });
        }
        if image_sizes.insert(img.id, (img.width, img.height)).is_some() {
            return Err(DetconvError::format(
                path,
                format!("image id {} is declared twice", img.id),
            ));
        }

        let mut image = Image::new(img.id, img.file_name, img.width, img.height);
        image.date_captured = img.date_captured.as_str().map(ToOwned::to_owned);
        images.push(image);
    }

    let mut annotations = Vec::with_capacity(coco.annotations.len());
    for ann in coco.annotations {
        let (width, height) = image_sizes
            .get(&ann.image_id)
            .copied()
            .ok_or_else(|| {
                DetconvError::format(
                    path,
                    format!(
                        "annotation {} references missing image {}",
                        ann.id, ann.image_id
                    ),
                )
            })?;
        if !category_ids.contains(&ann.category_id) {
            return Err(DetconvError::UnknownCategory {
                category: format!("#{}", ann.category_id),
                path: Some(path.to_path_buf()),
            });
        }

        let [x, y, w, h] = ann.bbox;
        let bbox = match box_policy.apply(BBoxXYWH::new(x, y, w, h), width, height) {
            Ok(Some(bbox)) => bbox,
            Ok(None) => {
                log::warn!(
                    "{}: dropping annotation {} outside image {}",
                    path.display(),
                    ann.id,
                    ann.image_id
                );
                continue;
            }
            Err(message) => {
                return Err(DetconvError::format(
                    path,
                    format!("{message} in annotation {}", ann.id),
                ))
            }
        };

        let mut annotation = Annotation::new(
            AnnotationId::new(ann.id),
            ImageId::new(ann.image_id),
            CategoryId::new(ann.category_id),
            bbox,
        );
        annotation.segmentation = polygons(&ann.segmentation);
        annotations.push(annotation);
    }

    Ok(Dataset {
        categories,
        images,
        annotations,
    })
}

/// Extracts `[[x1, y1, x2, y2, ...], ...]` polygon lists; anything else
/// (RLE objects, empty lists) yields `None`.
fn polygons(segmentation: &Value) -> Option<Vec<Vec<f64>>> {
    let rings = segmentation.as_array()?;
    let parsed: Option<Vec<Vec<f64>>> = rings
        .iter()
        .map(|ring| ring.as_array()?.iter().map(Value::as_f64).collect())
        .collect();
    parsed.filter(|rings| !rings.is_empty() && rings.iter().all(|ring| !ring.is_empty()))
}

fn ir_to_coco<'a>(
    dataset: &'a Dataset,
    output: &Path,
    rounding: PixelRounding,
) -> Result<CocoOutput<'a>, DetconvError> {
    // Reference check only; output order is by id, not by image.
    dataset.annotations_by_image(output)?;

    let mut images: Vec<CocoImageOut<'a>> = dataset
        .images
        .iter()
        .map(|img| CocoImageOut {
            id: img.id.as_u64(),
            file_name: &img.file_name,
            width: img.width,
            height: img.height,
            license: None,
            flickr_url: None,
            coco_url: None,
            date_captured: img.date_captured.as_deref(),
        })
        .collect();
    images.sort_by_key(|img| img.id);

    let mut categories: Vec<CocoCategoryOut<'a>> = dataset
        .categories
        .iter()
        .map(|cat| CocoCategoryOut {
            supercategory: cat.supercategory.as_deref().unwrap_or(DEFAULT_SUPERCATEGORY),
            id: cat.id.as_u64(),
            name: &cat.name,
        })
        .collect();
    categories.sort_by_key(|cat| cat.id);

    let mut annotations: Vec<CocoAnnotationOut> = Vec::with_capacity(dataset.annotations.len());
    for ann in &dataset.annotations {
        let ([x, y, w, h], right, bottom, area) =
            integer_box(&ann.bbox, rounding).ok_or_else(|| {
                DetconvError::format(
                    output,
                    format!("annotation {} box exceeds integer range", ann.id.as_u64()),
                )
            })?;
        let segmentation = match &ann.segmentation {
            Some(rings) => serde_json::json!(rings),
            None => serde_json::json!([[x, y, x, bottom, right, bottom, right, y]]),
        };

        annotations.push(CocoAnnotationOut {
            segmentation,
            area,
            iscrowd: 0,
            ignore: 0,
            image_id: ann.image_id.as_u64(),
            bbox: [x, y, w, h],
            category_id: ann.category_id.as_u64(),
            id: ann.id.as_u64(),
        });
    }
    annotations.sort_by_key(|ann| ann.id);

    Ok(CocoOutput {
        images,
        kind: "instances",
        annotations,
        categories,
    })
}

/// Integer box plus its right edge, bottom edge and area, or `None` when a
/// value does not fit in `i64`.
fn integer_box(bbox: &BBoxXYWH, rounding: PixelRounding) -> Option<([i64; 4], i64, i64, i64)> {
    const LIMIT: f64 = i64::MAX as f64;
    if [bbox.x, bbox.y, bbox.w, bbox.h]
        .iter()
        .any(|value| !value.is_finite() || value.abs() >= LIMIT)
    {
        return None;
    }

    let [x, y, w, h] = bbox.to_pixels(rounding);
    Some((
        [x, y, w, h],
        x.checked_add(w)?,
        y.checked_add(h)?,
        w.checked_mul(h)?,
    ))
}

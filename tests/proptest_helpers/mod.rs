#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use detconv::ir::{Annotation, BBoxXYWH, Category, CategoryId, Dataset, Image, ImageId};
use proptest::prelude::*;
use proptest::sample::Index;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Drift from YOLO's 5-decimal text on images up to 2000 px.
pub const EPS_YOLO_TEXT: f64 = 0.05;

/// Drift once YOLO output is written back as whole COCO pixels.
pub const EPS_PIXEL: f64 = 1.0;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Box semantics independent of ids: which image, which category, where.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnSem {
    pub image_file: String,
    pub category: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

pub fn ann_semantics(dataset: &Dataset) -> Result<Vec<AnnSem>, String> {
    let image_by_id: BTreeMap<ImageId, &str> = dataset
        .images
        .iter()
        .map(|img| (img.id, img.file_name.as_str()))
        .collect();
    let category_by_id: BTreeMap<CategoryId, &str> = dataset
        .categories
        .iter()
        .map(|cat| (cat.id, cat.name.as_str()))
        .collect();

    let mut out = Vec::with_capacity(dataset.annotations.len());
    for ann in &dataset.annotations {
        let image_file = image_by_id
            .get(&ann.image_id)
            .ok_or_else(|| format!("annotation {} references missing image", ann.id))?;
        let category = category_by_id
            .get(&ann.category_id)
            .ok_or_else(|| format!("annotation {} references missing category", ann.id))?;

        out.push(AnnSem {
            image_file: image_file.to_string(),
            category: category.to_string(),
            x: ann.bbox.x,
            y: ann.bbox.y,
            w: ann.bbox.w,
            h: ann.bbox.h,
        });
    }

    out.sort_by(ann_sem_cmp);
    Ok(out)
}

/// Pairs every box in `a` with its closest unused box in `b` (same image,
/// same category) and fails if any pair is further apart than `eps`.
pub fn assert_annotations_equivalent(a: &Dataset, b: &Dataset, eps: f64) -> Result<(), String> {
    let left = ann_semantics(a)?;
    let right = ann_semantics(b)?;

    if left.len() != right.len() {
        return Err(format!(
            "annotation count mismatch: left={} right={}",
            left.len(),
            right.len()
        ));
    }

    let mut used = vec![false; right.len()];
    for l in &left {
        let best = right
            .iter()
            .enumerate()
            .filter(|(i, r)| !used[*i] && r.image_file == l.image_file && r.category == l.category)
            .map(|(i, r)| (i, distance(l, r)))
            .min_by(|x, y| x.1.total_cmp(&y.1));

        match best {
            Some((i, d)) if d <= eps => used[i] = true,
            Some((i, d)) => {
                return Err(format!(
                    "annotation mismatch ({d} px): {l:?} vs {:?}",
                    right[i]
                ))
            }
            None => return Err(format!("no counterpart for {l:?}")),
        }
    }
    Ok(())
}

fn distance(a: &AnnSem, b: &AnnSem) -> f64 {
    [
        (a.x - b.x).abs(),
        (a.y - b.y).abs(),
        (a.w - b.w).abs(),
        (a.h - b.h).abs(),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

pub fn category_names(dataset: &Dataset) -> BTreeSet<String> {
    dataset.categories.iter().map(|c| c.name.clone()).collect()
}

/// Names of categories that at least one annotation uses; the only ones a
/// VOC directory can carry.
pub fn used_category_names(dataset: &Dataset) -> BTreeSet<String> {
    let used: BTreeSet<CategoryId> = dataset.annotations.iter().map(|a| a.category_id).collect();
    dataset
        .categories
        .iter()
        .filter(|c| used.contains(&c.id))
        .map(|c| c.name.clone())
        .collect()
}

pub fn image_dims_by_file_name(dataset: &Dataset) -> BTreeMap<String, (u32, u32)> {
    dataset
        .images
        .iter()
        .map(|img| (img.file_name.clone(), (img.width, img.height)))
        .collect()
}

fn ann_sem_cmp(a: &AnnSem, b: &AnnSem) -> std::cmp::Ordering {
    a.image_file
        .cmp(&b.image_file)
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.x.total_cmp(&b.x))
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.w.total_cmp(&b.w))
        .then_with(|| a.h.total_cmp(&b.h))
}

/// Picks an integer span `[lo, hi)` with `0 <= lo < hi <= extent`.
fn integer_span(extent: u32, a: f64, b: f64) -> (f64, f64) {
    let extent = f64::from(extent);
    let lo = (a * (extent - 1.0)).floor();
    let hi = lo + 1.0 + (b * (extent - lo - 1.0)).floor();
    (lo, hi)
}

/// Datasets with dense category ids, unique file names and integer boxes
/// that lie inside their image.
pub fn arb_dataset(
    max_images: usize,
    max_categories: usize,
    max_annotations: usize,
) -> BoxedStrategy<Dataset> {
    (
        prop::collection::vec((16u32..2000, 16u32..2000), 1..=max_images),
        1..=max_categories,
        prop::collection::vec(
            (
                any::<Index>(),
                any::<Index>(),
                0.0f64..1.0,
                0.0f64..1.0,
                0.0f64..1.0,
                0.0f64..1.0,
            ),
            0..=max_annotations,
        ),
    )
        .prop_map(|(sizes, category_count, raw_annotations)| {
            let categories: Vec<Category> = (0..category_count)
                .map(|i| Category::new(i as u64, format!("class_{i}")))
                .collect();
            let images: Vec<Image> = sizes
                .iter()
                .enumerate()
                .map(|(i, (w, h))| Image::new(i as u64 + 1, format!("img_{i:03}.jpg"), *w, *h))
                .collect();

            let annotations = raw_annotations
                .into_iter()
                .enumerate()
                .map(|(i, (image_idx, category_idx, ax, bx, ay, by))| {
                    let image = &images[image_idx.index(images.len())];
                    let (xmin, xmax) = integer_span(image.width, ax, bx);
                    let (ymin, ymax) = integer_span(image.height, ay, by);
                    Annotation::new(
                        i as u64 + 1,
                        image.id,
                        category_idx.index(category_count) as u64,
                        BBoxXYWH::new(xmin, ymin, xmax - xmin, ymax - ymin),
                    )
                })
                .collect();

            Dataset {
                categories,
                images,
                annotations,
            }
        })
        .boxed()
}

//! YOLO reader and writer.
//!
//! A YOLO label directory holds `classes.txt` (one category name per line,
//! line index = class id) and one `<stem>.txt` per image, each line being
//! `<class> <xc> <yc> <w> <h>` with the box normalized by the image size.
//!
//! Label files carry no image dimensions, so reading needs an
//! [`ImageSizes`] source: either a directory of images to probe or a
//! precomputed table. Images that have no label file are read as images with
//! zero annotations, and the writer mirrors that: an image without
//! annotations gets no label file at all.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use super::model::{Annotation, Category, Dataset, DatasetBuilder, Image, ImageDraft, ObjectDraft};
use super::{
    BBoxXYWH, BBoxXYWHN, CategoryId, CategoryPolicy, CategoryRegistry, ReadOptions,
    IMAGE_EXTENSIONS,
};
use crate::error::DetconvError;

const LABEL_EXTENSION: &str = "txt";
const CLASSES_FILE: &str = "classes.txt";

/// Where the YOLO reader gets image dimensions from.
#[derive(Clone, Debug)]
pub enum ImageSizes {
    /// Probe every image directly inside this directory.
    Probe(PathBuf),
    /// `file_name -> (width, height)`, for callers that already know the sizes.
    Table(BTreeMap<String, (u32, u32)>),
}

/// Read a YOLO label directory into IR.
///
/// Category names come from `classes.txt` in `path`. When that file is
/// missing, an explicit category list in `options` stands in for it.
/// Other category policies do not apply: class ids are fixed by the file.
pub fn read_yolo_dir(
    path: &Path,
    sizes: &ImageSizes,
    options: &ReadOptions,
) -> Result<Dataset, DetconvError> {
    if !path.exists() {
        return Err(DetconvError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_dir() {
        return Err(DetconvError::format(
            path,
            "expected a directory of YOLO label files",
        ));
    }

    let class_names = read_class_names(path, &options.category_policy)?;
    let registry = CategoryRegistry::explicit(class_names.iter().cloned())?;

    let images = image_table(sizes, options)?;
    let mut stems: HashMap<String, &str> = HashMap::new();
    for file_name in images.keys() {
        let stem = file_stem(file_name);
        if let Some(previous) = stems.insert(stem.clone(), file_name.as_str()) {
            options.error_policy.absorb(DetconvError::DuplicateImage {
                path: PathBuf::from(previous),
                file_name: file_name.clone(),
            })?;
        }
    }

    let mut labels: BTreeMap<String, PathBuf> = BTreeMap::new();
    for label_path in collect_files_with_extensions(path, &[LABEL_EXTENSION])? {
        if label_path.file_name().and_then(|name| name.to_str()) == Some(CLASSES_FILE) {
            continue;
        }
        let stem = label_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        if stems.contains_key(&stem) {
            labels.insert(stem, label_path);
        } else {
            options.error_policy.absorb(missing_image(sizes, &stem))?;
        }
    }

    let mut builder = DatasetBuilder::new(registry, options.box_policy);
    for (file_name, (width, height)) in &images {
        let stem = file_stem(file_name);
        if stems.get(&stem).copied() != Some(file_name.as_str()) {
            // Lost a stem collision that was skipped above.
            continue;
        }

        let result = match labels.get(&stem) {
            Some(label_path) => read_label_file(label_path, &class_names)
                .map(|rows| (label_path.as_path(), rows)),
            None => Ok((Path::new(file_name.as_str()), Vec::new())),
        };
        let (source, rows) = match result {
            Ok(found) => found,
            Err(err) => {
                options.error_policy.absorb(err)?;
                continue;
            }
        };

        let draft = ImageDraft {
            file_name: file_name.clone(),
            width: *width,
            height: *height,
            depth: None,
            objects: rows
                .into_iter()
                .map(|(category, bbox)| ObjectDraft {
                    category,
                    bbox: bbox.to_xywh(f64::from(*width), f64::from(*height)),
                })
                .collect(),
        };
        if let Err(err) = builder.commit(source, draft) {
            options.error_policy.absorb(err)?;
        }
    }

    Ok(builder.finish())
}

/// Write an IR dataset as a YOLO label directory.
///
/// Writes `classes.txt` and one `<stem>.txt` per image that has at least one
/// annotation. Class indices follow category id order; when ids are not
/// exactly `0..N` they are compacted and a warning is logged.
pub fn write_yolo_dir(path: &Path, dataset: &Dataset) -> Result<(), DetconvError> {
    let mut annotations_by_image = dataset.annotations_by_image(path)?;

    let classes_stem = file_stem(CLASSES_FILE);
    let mut stems: HashMap<&str, &str> = HashMap::new();
    for image in &dataset.images {
        if image.stem() == classes_stem && annotations_by_image.contains_key(&image.id) {
            return Err(DetconvError::format(
                &path.join(CLASSES_FILE),
                format!(
                    "labels for image '{}' would overwrite the class list",
                    image.file_name
                ),
            ));
        }
        if stems.insert(image.stem(), &image.file_name).is_some() {
            return Err(DetconvError::DuplicateImage {
                path: path.join(format!("{}.{LABEL_EXTENSION}", image.stem())),
                file_name: image.file_name.clone(),
            });
        }
    }

    let mut categories_sorted: Vec<&Category> = dataset.categories.iter().collect();
    categories_sorted.sort_by_key(|category| category.id);
    if !has_dense_ids(&categories_sorted) {
        log::warn!(
            "category ids are not 0..{}; writing YOLO class indices in id order",
            categories_sorted.len()
        );
    }
    let category_to_class: BTreeMap<CategoryId, usize> = categories_sorted
        .iter()
        .enumerate()
        .map(|(index, category)| (category.id, index))
        .collect();

    fs::create_dir_all(path).map_err(DetconvError::io(path))?;

    let classes_path = path.join(CLASSES_FILE);
    let classes: String = categories_sorted
        .iter()
        .map(|category| format!("{}\n", category.name))
        .collect();
    fs::write(&classes_path, classes).map_err(DetconvError::io(&classes_path))?;

    let jobs: Vec<(&Image, Vec<&Annotation>)> = dataset
        .images
        .iter()
        .filter_map(|image| {
            let mut annotations = annotations_by_image.remove(&image.id)?;
            annotations.sort_by_key(|annotation| annotation.id);
            Some((image, annotations))
        })
        .collect();

    let skipped = dataset.images.len() - jobs.len();
    if skipped > 0 {
        log::info!("{skipped} image(s) without annotations get no YOLO label file");
    }

    jobs.par_iter().try_for_each(|(image, annotations)| {
        let label_path = path.join(format!("{}.{LABEL_EXTENSION}", image.stem()));
        let mut content = String::new();
        for annotation in annotations {
            let class = category_to_class
                .get(&annotation.category_id)
                .copied()
                .ok_or_else(|| DetconvError::UnknownCategory {
                    category: format!("#{}", annotation.category_id),
                    path: Some(label_path.clone()),
                })?;
            content.push_str(&format_label_line(class, &annotation.bbox, image));
            content.push('\n');
        }
        fs::write(&label_path, content).map_err(DetconvError::io(&label_path))
    })
}

/// Renders one label line: class index, then the normalized center box with
/// five decimals.
pub fn format_label_line(class: usize, bbox: &BBoxXYWH, image: &Image) -> String {
    let n = bbox.to_xywhn(f64::from(image.width), f64::from(image.height));
    format!("{class} {:.5} {:.5} {:.5} {:.5}", n.xc, n.yc, n.wn, n.hn)
}

/// True when the sorted categories are numbered exactly `0..N`.
pub(crate) fn has_dense_ids(sorted: &[&Category]) -> bool {
    sorted
        .iter()
        .enumerate()
        .all(|(index, category)| category.id.as_u64() == index as u64)
}

fn read_class_names(dir: &Path, policy: &CategoryPolicy) -> Result<Vec<String>, DetconvError> {
    let classes_path = dir.join(CLASSES_FILE);
    if classes_path.is_file() {
        let names = read_classes_txt(&classes_path)?;
        if let CategoryPolicy::Explicit(explicit) = policy {
            if explicit != &names {
                log::warn!(
                    "{} takes precedence over the supplied category list",
                    classes_path.display()
                );
            }
        }
        return Ok(names);
    }

    match policy {
        CategoryPolicy::Explicit(names) => Ok(names.clone()),
        _ => Err(DetconvError::PathNotFound { path: classes_path }),
    }
}

fn read_classes_txt(path: &Path) -> Result<Vec<String>, DetconvError> {
    let data = fs::read_to_string(path).map_err(DetconvError::io(path))?;
    let lines: Vec<&str> = data.lines().map(str::trim).collect();
    let used = lines
        .iter()
        .rposition(|line| !line.is_empty())
        .map_or(0, |last| last + 1);

    let mut names: Vec<String> = Vec::with_capacity(used);
    for (line_idx, name) in lines[..used].iter().enumerate() {
        if name.is_empty() {
            return Err(DetconvError::format(
                path,
                format!("line {} is empty", line_idx + 1),
            ));
        }
        if names.iter().any(|known| known.as_str() == *name) {
            return Err(DetconvError::format(
                path,
                format!("line {}: class '{name}' is listed twice", line_idx + 1),
            ));
        }
        names.push((*name).to_string());
    }

    Ok(names)
}

/// Resolves the `file_name -> (width, height)` table, sorted by file name.
fn image_table(
    sizes: &ImageSizes,
    options: &ReadOptions,
) -> Result<BTreeMap<String, (u32, u32)>, DetconvError> {
    match sizes {
        ImageSizes::Table(table) => Ok(table.clone()),
        ImageSizes::Probe(dir) => {
            if !dir.is_dir() {
                return Err(DetconvError::PathNotFound { path: dir.clone() });
            }

            let mut files = collect_files_with_extensions(dir, &IMAGE_EXTENSIONS)?;
            files.sort_by_cached_key(|file| (file_stem_of(file), extension_rank(file)));
            // Keep the highest-priority extension per stem.
            files.dedup_by(|later, kept| {
                let same = file_stem_of(later) == file_stem_of(kept);
                if same {
                    log::debug!("ignoring {}: stem already taken", later.display());
                }
                same
            });

            let probed: Vec<(PathBuf, Result<(u32, u32), DetconvError>)> = files
                .into_par_iter()
                .map(|file| {
                    let size = read_image_dimensions(&file);
                    (file, size)
                })
                .collect();

            let mut table = BTreeMap::new();
            for (file, size) in probed {
                match size {
                    Ok(size) => {
                        let file_name = file
                            .file_name()
                            .map(|name| name.to_string_lossy().to_string())
                            .unwrap_or_default();
                        table.insert(file_name, size);
                    }
                    Err(err) => options.error_policy.absorb(err)?,
                }
            }
            Ok(table)
        }
    }
}

fn missing_image(sizes: &ImageSizes, stem: &str) -> DetconvError {
    let path = match sizes {
        ImageSizes::Probe(dir) => dir.join(format!("{stem}.*")),
        ImageSizes::Table(_) => PathBuf::from(format!("{stem}.*")),
    };
    DetconvError::PathNotFound { path }
}

fn read_label_file(
    path: &Path,
    class_names: &[String],
) -> Result<Vec<(String, BBoxXYWHN)>, DetconvError> {
    let bytes = fs::read(path).map_err(DetconvError::io(path))?;
    let content = std::str::from_utf8(&bytes).map_err(|source| {
        DetconvError::format(path, format!("file is not valid UTF-8: {source}"))
    })?;
    let mut rows = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        let line_num = line_idx + 1;
        let Some(parsed) = parse_label_line(line, path, line_num)? else {
            continue;
        };

        let name = class_names
            .get(parsed.class_id)
            .ok_or_else(|| DetconvError::UnknownCategory {
                category: format!("#{}", parsed.class_id),
                path: Some(path.to_path_buf()),
            })?;
        rows.push((
            name.clone(),
            BBoxXYWHN::new(parsed.cx, parsed.cy, parsed.w, parsed.h),
        ));
    }

    Ok(rows)
}

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    class_id: usize,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, DetconvError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Take at most 6 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();

    if tokens.len() < 5 {
        return Err(label_error(
            file_path,
            line_num,
            format!("expected 5 tokens, found {}", tokens.len()),
        ));
    }

    if tokens.len() > 5 {
        return Err(label_error(
            file_path,
            line_num,
            "segmentation/pose rows are not supported; expected a detection box".to_string(),
        ));
    }

    let class_id = tokens[0].parse::<usize>().map_err(|_| {
        label_error(
            file_path,
            line_num,
            format!(
                "invalid class id '{}'; expected non-negative integer",
                tokens[0]
            ),
        )
    })?;

    let cx = parse_f64_token(tokens[1], "x_center", file_path, line_num)?;
    let cy = parse_f64_token(tokens[2], "y_center", file_path, line_num)?;
    let w = parse_f64_token(tokens[3], "width", file_path, line_num)?;
    let h = parse_f64_token(tokens[4], "height", file_path, line_num)?;

    Ok(Some(YoloLabelRow {
        class_id,
        cx,
        cy,
        w,
        h,
    }))
}

/// Fuzz-only entrypoint for YOLO single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), DetconvError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1)?;
    Ok(())
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, DetconvError> {
    raw.parse::<f64>().map_err(|_| {
        label_error(
            file_path,
            line_num,
            format!("invalid {field_name} '{raw}'; expected floating-point number"),
        )
    })
}

fn label_error(path: &Path, line: usize, message: String) -> DetconvError {
    DetconvError::format(path, format!("line {line}: {message}"))
}

fn collect_files_with_extensions(
    root: &Path,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, DetconvError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).max_depth(1) {
        let entry = entry.map_err(|source| {
            DetconvError::format(root, format!("failed while traversing directory: {source}"))
        })?;

        if entry.file_type().is_file() && super::has_extension(entry.path(), extensions) {
            files.push(entry.path().to_path_buf());
        }
    }

    Ok(files)
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), DetconvError> {
    let size = imagesize::size(path).map_err(|source| {
        DetconvError::format(path, format!("cannot read image dimensions: {source}"))
    })?;

    let width: u32 = size.width.try_into().map_err(|_| {
        DetconvError::format(
            path,
            format!("image width {} does not fit in u32", size.width),
        )
    })?;

    let height: u32 = size.height.try_into().map_err(|_| {
        DetconvError::format(
            path,
            format!("image height {} does not fit in u32", size.height),
        )
    })?;

    Ok((width, height))
}

fn file_stem(file_name: &str) -> String {
    file_stem_of(Path::new(file_name))
}

fn file_stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension_rank(path: &Path) -> usize {
    IMAGE_EXTENSIONS
        .iter()
        .position(|ext| super::has_extension(path, &[*ext]))
        .unwrap_or(IMAGE_EXTENSIONS.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CategoryId, ErrorPolicy, ImageId};

    fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
        let row_stride = (width * 3).div_ceil(4) * 4;
        let pixel_array_size = row_stride * height;
        let file_size = 54 + pixel_array_size;

        let mut bytes = Vec::with_capacity(file_size as usize);
        bytes.extend_from_slice(b"BM");
        bytes.extend_from_slice(&file_size.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&54u32.to_le_bytes());

        bytes.extend_from_slice(&40u32.to_le_bytes());
        bytes.extend_from_slice(&(width as i32).to_le_bytes());
        bytes.extend_from_slice(&(height as i32).to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&24u16.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
        bytes.extend_from_slice(&2835u32.to_le_bytes());
        bytes.extend_from_slice(&2835u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        bytes.resize(file_size as usize, 0);
        bytes
    }

    fn write_bmp(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
    }

    fn sizes(entries: &[(&str, u32, u32)]) -> ImageSizes {
        ImageSizes::Table(
            entries
                .iter()
                .map(|(name, w, h)| (name.to_string(), (*w, *h)))
                .collect(),
        )
    }

    #[test]
    fn parse_label_line_accepts_valid_rows() {
        let parsed = parse_label_line("2 0.5 0.25 0.3 0.1", Path::new("a.txt"), 1)
            .expect("parse should succeed")
            .expect("line should produce a row");

        assert_eq!(
            parsed,
            YoloLabelRow {
                class_id: 2,
                cx: 0.5,
                cy: 0.25,
                w: 0.3,
                h: 0.1,
            }
        );
    }

    #[test]
    fn parse_label_line_skips_empty_rows() {
        let parsed = parse_label_line("   ", Path::new("a.txt"), 2).expect("parse should succeed");
        assert!(parsed.is_none());
    }

    #[test]
    fn parse_label_line_rejects_short_rows() {
        let err = parse_label_line("0 0.1 0.2", Path::new("a.txt"), 3).unwrap_err();
        assert!(matches!(err, DetconvError::FormatError { .. }));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn parse_label_line_rejects_segmentation_rows() {
        let err = parse_label_line("0 0.1 0.2 0.3 0.4 0.5", Path::new("a.txt"), 4).unwrap_err();
        assert!(matches!(err, DetconvError::FormatError { .. }));
    }

    #[test]
    fn label_line_matches_reference_case() {
        let image = Image::new(1u64, "a.jpg", 100, 200);
        let line = format_label_line(3, &BBoxXYWH::new(10.0, 20.0, 30.0, 40.0), &image);
        assert_eq!(line, "3 0.25000 0.20000 0.30000 0.20000");
    }

    #[test]
    fn classes_txt_ignores_trailing_blank_lines_only() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join(CLASSES_FILE);

        fs::write(&path, "cat\ndog\n\n\n").expect("write classes");
        assert_eq!(read_classes_txt(&path).unwrap(), vec!["cat", "dog"]);

        fs::write(&path, "cat\n\ndog\n").expect("write classes");
        let err = read_classes_txt(&path).unwrap_err();
        assert!(err.to_string().contains("line 2 is empty"));

        fs::write(&path, "cat\ncat\n").expect("write classes");
        assert!(matches!(
            read_classes_txt(&path).unwrap_err(),
            DetconvError::FormatError { .. }
        ));
    }

    #[test]
    fn explicit_list_stands_in_for_missing_classes_txt() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join("a.txt"), "1 0.5 0.5 0.5 0.5\n").unwrap();

        let err = read_yolo_dir(
            temp.path(),
            &sizes(&[("a.jpg", 10, 10)]),
            &ReadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DetconvError::PathNotFound { .. }));

        let options = ReadOptions {
            category_policy: CategoryPolicy::Explicit(vec!["cat".into(), "dog".into()]),
            ..ReadOptions::default()
        };
        let dataset =
            read_yolo_dir(temp.path(), &sizes(&[("a.jpg", 10, 10)]), &options).expect("read");
        assert_eq!(dataset.annotations[0].category_id, CategoryId(1));
    }

    #[test]
    fn probe_reads_sizes_and_keeps_unlabelled_images() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let labels = temp.path().join("labels");
        let images = temp.path().join("images");
        fs::create_dir_all(&labels).unwrap();

        write_bmp(&images.join("b.bmp"), 10, 10);
        write_bmp(&images.join("a.bmp"), 20, 10);
        fs::write(labels.join(CLASSES_FILE), "cat\ndog\n").unwrap();
        fs::write(labels.join("a.txt"), "1 0.5 0.5 0.5 0.5\n0 0.25 0.25 0.2 0.2\n").unwrap();

        let dataset = read_yolo_dir(&labels, &ImageSizes::Probe(images), &ReadOptions::default())
            .expect("read yolo dataset");

        assert_eq!(dataset.images.len(), 2);
        assert_eq!(dataset.images[0].file_name, "a.bmp");
        assert_eq!(dataset.images[0].width, 20);
        assert_eq!(dataset.images[1].id, ImageId(2));
        assert_eq!(dataset.annotations.len(), 2);
        assert_eq!(dataset.categories.len(), 2);

        let first = &dataset.annotations[0].bbox;
        assert!((first.x - 5.0).abs() < 1e-6);
        assert!((first.y - 2.5).abs() < 1e-6);
        assert!((first.w - 10.0).abs() < 1e-6);
        assert!((first.h - 5.0).abs() < 1e-6);
    }

    #[test]
    fn label_without_image_is_path_not_found_unless_skipped() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join(CLASSES_FILE), "cat\n").unwrap();
        fs::write(temp.path().join("ghost.txt"), "0 0.5 0.5 0.5 0.5\n").unwrap();

        let table = sizes(&[("real.jpg", 10, 10)]);
        let err = read_yolo_dir(temp.path(), &table, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DetconvError::PathNotFound { .. }));
        assert!(err.to_string().contains("ghost"));

        let options = ReadOptions {
            error_policy: ErrorPolicy::SkipAndLog,
            ..ReadOptions::default()
        };
        let dataset = read_yolo_dir(temp.path(), &table, &options).expect("read");
        assert_eq!(dataset.images.len(), 1);
        assert!(dataset.annotations.is_empty());
    }

    #[test]
    fn out_of_range_class_is_unknown_category() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join(CLASSES_FILE), "cat\n").unwrap();
        fs::write(temp.path().join("a.txt"), "4 0.5 0.5 0.5 0.5\n").unwrap();

        let err = read_yolo_dir(
            temp.path(),
            &sizes(&[("a.jpg", 10, 10)]),
            &ReadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DetconvError::UnknownCategory { ref category, .. } if category == "#4"
        ));
    }

    #[test]
    fn non_utf8_label_file_can_be_skipped() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(temp.path().join(CLASSES_FILE), "cat\n").unwrap();
        fs::write(temp.path().join("a.txt"), "0 0.5 0.5 0.5 0.5\n").unwrap();
        fs::write(temp.path().join("b.txt"), b"0 0.5 \xff 0.5 0.5\n").unwrap();
        let table = sizes(&[("a.jpg", 10, 10), ("b.jpg", 10, 10)]);

        let err = read_yolo_dir(temp.path(), &table, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, DetconvError::FormatError { .. }));

        let options = ReadOptions {
            error_policy: ErrorPolicy::SkipAndLog,
            ..ReadOptions::default()
        };
        let dataset = read_yolo_dir(temp.path(), &table, &options).expect("read");
        assert_eq!(dataset.images.len(), 1);
        assert_eq!(dataset.images[0].file_name, "a.jpg");
        assert_eq!(dataset.annotations.len(), 1);
    }

    #[test]
    fn writer_skips_empty_images_and_compacts_class_ids() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset {
            categories: vec![Category::new(7u64, "dog"), Category::new(3u64, "cat")],
            images: vec![
                Image::new(1u64, "a.jpg", 100, 200),
                Image::new(2u64, "empty.jpg", 10, 10),
            ],
            annotations: vec![Annotation::new(
                1u64,
                1u64,
                7u64,
                BBoxXYWH::new(10.0, 20.0, 30.0, 40.0),
            )],
        };

        write_yolo_dir(temp.path(), &dataset).expect("write yolo");

        let classes = fs::read_to_string(temp.path().join(CLASSES_FILE)).unwrap();
        assert_eq!(classes, "cat\ndog\n");

        let label = fs::read_to_string(temp.path().join("a.txt")).unwrap();
        assert_eq!(label, "1 0.25000 0.20000 0.30000 0.20000\n");
        assert!(!temp.path().join("empty.txt").exists());
    }

    #[test]
    fn writer_refuses_label_file_named_like_class_list() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset {
            categories: vec![Category::new(0u64, "dog"), Category::new(1u64, "cat")],
            images: vec![
                Image::new(1u64, "classes.jpg", 100, 100),
                Image::new(2u64, "b.jpg", 100, 100),
            ],
            annotations: vec![
                Annotation::new(1u64, 1u64, 0u64, BBoxXYWH::new(10.0, 10.0, 20.0, 20.0)),
                Annotation::new(2u64, 2u64, 1u64, BBoxXYWH::new(10.0, 10.0, 20.0, 20.0)),
            ],
        };

        let err = write_yolo_dir(temp.path(), &dataset).unwrap_err();
        assert!(matches!(err, DetconvError::FormatError { .. }));
        assert!(err.to_string().contains("classes.jpg"));
        assert!(!temp.path().join(CLASSES_FILE).exists());
    }

    #[test]
    fn unlabelled_image_named_like_class_list_is_harmless() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let dataset = Dataset {
            categories: vec![Category::new(0u64, "dog")],
            images: vec![
                Image::new(1u64, "classes.jpg", 100, 100),
                Image::new(2u64, "b.jpg", 100, 100),
            ],
            annotations: vec![Annotation::new(
                1u64,
                2u64,
                0u64,
                BBoxXYWH::new(10.0, 10.0, 20.0, 20.0),
            )],
        };

        write_yolo_dir(temp.path(), &dataset).expect("write yolo");
        let classes = fs::read_to_string(temp.path().join(CLASSES_FILE)).unwrap();
        assert_eq!(classes, "dog\n");
    }
}

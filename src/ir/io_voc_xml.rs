//! Pascal VOC XML reader and writer.
//!
//! VOC stores one XML document per image with absolute corner boxes. The
//! reader accepts a dataset root containing `Annotations/`, the
//! `Annotations/` directory itself, or any flat directory of `.xml` files.
//! The writer always produces a flat directory of `<stem>.xml` files, one per
//! image, including images without objects.
//!
//! VOC has no numeric category ids. The reader mints them through the
//! [`CategoryPolicy`](super::CategoryPolicy) in [`ReadOptions`], after every
//! file has been parsed, so ids do not depend on which file fails first.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use roxmltree::Node;
use walkdir::WalkDir;

use super::model::{Annotation, Dataset, DatasetBuilder, Image, ImageDraft, ObjectDraft};
use super::{BBoxXYXY, CategoryId, PixelRounding, ReadOptions};
use crate::error::DetconvError;

const VOC_XML_EXTENSION: &str = "xml";
const DEFAULT_DEPTH: u32 = 3;

/// Read a Pascal VOC dataset into IR.
///
/// When `split` is given, only the ids listed in
/// `ImageSets/Main/<split>.txt` under the dataset root are read, in file
/// order. Otherwise every `.xml` directly inside the annotation directory is
/// read, sorted by file name.
pub fn read_voc_dir(
    path: &Path,
    split: Option<&str>,
    options: &ReadOptions,
) -> Result<Dataset, DetconvError> {
    let layout = discover_layout(path)?;
    let xml_files = match split {
        Some(split) => split_xml_files(&layout, split)?,
        None => collect_xml_files(&layout.annotations_dir)?,
    };

    // Records are vetted before the registry sees their category names.
    let mut drafts = Vec::with_capacity(xml_files.len());
    let mut file_names: HashSet<String> = HashSet::with_capacity(xml_files.len());
    for xml_path in xml_files {
        let settled = parse_voc_xml(&xml_path)
            .and_then(|draft| draft.settle(&xml_path, options.box_policy))
            .and_then(|draft| {
                if file_names.insert(draft.file_name.clone()) {
                    Ok(draft)
                } else {
                    Err(DetconvError::DuplicateImage {
                        path: xml_path.clone(),
                        file_name: draft.file_name,
                    })
                }
            });
        match settled {
            Ok(draft) => drafts.push((xml_path, draft)),
            Err(err) => options.error_policy.absorb(err)?,
        }
    }

    let registry = options.category_policy.build_registry(
        drafts
            .iter()
            .flat_map(|(_, draft)| draft.objects.iter().map(|object| object.category.as_str())),
    )?;

    let mut builder = DatasetBuilder::new(registry, options.box_policy);
    for (xml_path, draft) in drafts {
        log::debug!("{}: {} object(s)", xml_path.display(), draft.objects.len());
        if let Err(err) = builder.commit_settled(&xml_path, draft) {
            options.error_policy.absorb(err)?;
        }
    }

    Ok(builder.finish())
}

/// Write an IR dataset as a flat directory of VOC XML files.
///
/// `path` is created if needed. Existing files are overwritten, but clearing
/// the directory beforehand is the caller's job.
pub fn write_voc_dir(
    path: &Path,
    dataset: &Dataset,
    rounding: PixelRounding,
) -> Result<(), DetconvError> {
    let mut annotations_by_image = dataset.annotations_by_image(path)?;
    let category_names: BTreeMap<CategoryId, &str> = dataset
        .categories
        .iter()
        .map(|category| (category.id, category.name.as_str()))
        .collect();

    let mut stems: HashMap<&str, &str> = HashMap::new();
    for image in &dataset.images {
        if stems.insert(image.stem(), &image.file_name).is_some() {
            return Err(DetconvError::DuplicateImage {
                path: path.join(format!("{}.{VOC_XML_EXTENSION}", image.stem())),
                file_name: image.file_name.clone(),
            });
        }
    }

    fs::create_dir_all(path).map_err(DetconvError::io(path))?;

    let jobs: Vec<(&Image, Vec<&Annotation>)> = dataset
        .images
        .iter()
        .map(|image| {
            let mut annotations = annotations_by_image.remove(&image.id).unwrap_or_default();
            annotations.sort_by_key(|annotation| annotation.id);
            (image, annotations)
        })
        .collect();

    jobs.par_iter().try_for_each(|(image, annotations)| {
        let xml_path = path.join(format!("{}.{VOC_XML_EXTENSION}", image.stem()));
        let xml = render_voc_xml(image, annotations, &category_names, rounding, &xml_path)?;
        fs::write(&xml_path, xml).map_err(DetconvError::io(&xml_path))
    })
}

/// Parse VOC XML from a UTF-8 string.
///
/// This helper is primarily useful for testing/fuzzing parse behavior in-memory.
pub fn from_voc_xml_str(xml: &str) -> Result<ImageDraft, DetconvError> {
    parse_voc_xml_str(xml, Path::new("<memory>"))
}

/// Parse VOC XML from bytes.
///
/// The input must be valid UTF-8.
pub fn from_voc_xml_slice(bytes: &[u8]) -> Result<ImageDraft, DetconvError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| {
        DetconvError::format(
            Path::new("<memory>"),
            format!("input is not valid UTF-8: {source}"),
        )
    })?;
    from_voc_xml_str(xml)
}

#[derive(Clone, Debug)]
struct VocLayout {
    root: PathBuf,
    annotations_dir: PathBuf,
}

fn discover_layout(input: &Path) -> Result<VocLayout, DetconvError> {
    if !input.exists() {
        return Err(DetconvError::PathNotFound {
            path: input.to_path_buf(),
        });
    }
    if !input.is_dir() {
        return Err(DetconvError::format(
            input,
            "expected a directory of VOC XML files",
        ));
    }

    if input.join("Annotations").is_dir() {
        return Ok(VocLayout {
            root: input.to_path_buf(),
            annotations_dir: input.join("Annotations"),
        });
    }

    let root = match input.parent() {
        Some(parent) if is_dir_named(input, "Annotations") => parent.to_path_buf(),
        _ => input.to_path_buf(),
    };
    Ok(VocLayout {
        root,
        annotations_dir: input.to_path_buf(),
    })
}

fn split_xml_files(layout: &VocLayout, split: &str) -> Result<Vec<PathBuf>, DetconvError> {
    let list_path = layout
        .root
        .join("ImageSets")
        .join("Main")
        .join(format!("{split}.txt"));
    if !list_path.is_file() {
        return Err(DetconvError::PathNotFound { path: list_path });
    }

    let list = fs::read_to_string(&list_path).map_err(DetconvError::io(&list_path))?;

    // Per-class lists carry a second column (`id  1`); only the id matters.
    Ok(list
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|id| {
            layout
                .annotations_dir
                .join(format!("{id}.{VOC_XML_EXTENSION}"))
        })
        .collect())
}

fn collect_xml_files(dir: &Path) -> Result<Vec<PathBuf>, DetconvError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir).map_err(DetconvError::io(dir))? {
        let entry = entry.map_err(DetconvError::io(dir))?;
        let path = entry.path();
        if path.is_file() && has_xml_extension(&path) {
            files.push(path);
        }
    }

    files.sort_by_cached_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_string(dir, path))
    });

    let mut nested_xml = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).min_depth(2) {
        let entry = entry.map_err(|source| {
            DetconvError::format(
                dir,
                format!("failed while traversing annotation directory: {source}"),
            )
        })?;

        if entry.file_type().is_file() && has_xml_extension(entry.path()) {
            nested_xml.push(entry.path().to_path_buf());
        }
    }

    if !nested_xml.is_empty() {
        nested_xml.sort_by_cached_key(|path| rel_string(dir, path));
        log::warn!(
            "VOC reader scans {} flat (non-recursive); skipping {} nested .xml file(s), e.g. {}",
            dir.display(),
            nested_xml.len(),
            rel_string(dir, &nested_xml[0])
        );
    }

    Ok(files)
}

fn parse_voc_xml(path: &Path) -> Result<ImageDraft, DetconvError> {
    if !path.is_file() {
        return Err(DetconvError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(DetconvError::io(path))?;
    let xml = std::str::from_utf8(&bytes).map_err(|source| {
        DetconvError::format(path, format!("file is not valid UTF-8: {source}"))
    })?;
    parse_voc_xml_str(xml, path)
}

fn parse_voc_xml_str(xml: &str, path: &Path) -> Result<ImageDraft, DetconvError> {
    let document = roxmltree::Document::parse(xml)
        .map_err(|source| DetconvError::format(path, source.to_string()))?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(DetconvError::format(
            path,
            "missing <annotation> root element",
        ));
    }

    let file_name = required_child_text(annotation, "filename", path, "<annotation>")?;

    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required_u32(size, "width", path, "<size>")?;
    let height = parse_required_u32(size, "height", path, "<size>")?;
    // Depth is informational; unparsable values are dropped, not rejected.
    let depth = optional_child_text(size, "depth").and_then(|raw| raw.parse::<u32>().ok());

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let category = required_child_text(object, "name", path, "<object>")?;
        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;

        let corners = BBoxXYXY::new(
            parse_required_f64(bndbox, "xmin", path, "<bndbox>")?,
            parse_required_f64(bndbox, "ymin", path, "<bndbox>")?,
            parse_required_f64(bndbox, "xmax", path, "<bndbox>")?,
            parse_required_f64(bndbox, "ymax", path, "<bndbox>")?,
        );

        objects.push(ObjectDraft {
            category,
            bbox: corners.to_xywh(),
        });
    }

    Ok(ImageDraft {
        file_name,
        width,
        height,
        depth,
        objects,
    })
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, DetconvError> {
    child_element(node, tag)
        .ok_or_else(|| DetconvError::format(path, format!("missing <{tag}> in {context}")))
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, DetconvError> {
    optional_child_text(node, tag)
        .ok_or_else(|| DetconvError::format(path, format!("missing <{tag}> in {context}")))
}

fn parse_required_u32(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<u32, DetconvError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<u32>().map_err(|_| {
        DetconvError::format(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected u32"),
        )
    })
}

fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<f64, DetconvError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<f64>().map_err(|_| {
        DetconvError::format(
            path,
            format!("invalid <{tag}> value '{raw}' in {context}; expected floating-point number"),
        )
    })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

/// Indenting element writer producing the two-space layout legacy VOC
/// tooling emitted.
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        self.out.push('<');
        self.out.push_str(tag);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    fn leaf(&mut self, tag: &str, value: impl std::fmt::Display) {
        self.indent();
        self.out
            .push_str(&format!("<{tag}>{}</{tag}>\n", xml_escape(&value.to_string())));
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn finish(self) -> String {
        self.out
    }
}

fn render_voc_xml(
    image: &Image,
    annotations: &[&Annotation],
    category_names: &BTreeMap<CategoryId, &str>,
    rounding: PixelRounding,
    xml_path: &Path,
) -> Result<String, DetconvError> {
    let mut xml = XmlWriter::new();

    xml.open("annotation");
    xml.leaf("folder", "DATA");
    xml.leaf("filename", &image.file_name);
    xml.open("source");
    xml.leaf("database", "The VOC Database");
    xml.leaf("annotation", "PASCAL VOC");
    xml.leaf("image", "flickr");
    xml.close("source");
    xml.open("size");
    xml.leaf("width", image.width);
    xml.leaf("height", image.height);
    xml.leaf("depth", image.depth.unwrap_or(DEFAULT_DEPTH));
    xml.close("size");
    xml.leaf("segmented", 0);

    for annotation in annotations {
        let name = category_names
            .get(&annotation.category_id)
            .ok_or_else(|| DetconvError::UnknownCategory {
                category: format!("#{}", annotation.category_id),
                path: Some(xml_path.to_path_buf()),
            })?;
        let [xmin, ymin, xmax, ymax] = annotation.bbox.to_xyxy().to_pixels(rounding);

        xml.open("object");
        xml.leaf("name", name);
        xml.leaf("pose", "Unspecified");
        xml.leaf("truncated", 0);
        xml.leaf("difficult", 0);
        xml.open("bndbox");
        xml.leaf("xmin", xmin);
        xml.leaf("ymin", ymin);
        xml.leaf("xmax", xmax);
        xml.leaf("ymax", ymax);
        xml.close("bndbox");
        xml.close("object");
    }

    xml.close("annotation");
    Ok(xml.finish())
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn has_xml_extension(path: &Path) -> bool {
    super::has_extension(path, &[VOC_XML_EXTENSION])
}

fn is_dir_named(path: &Path, dir_name: &str) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.eq_ignore_ascii_case(dir_name))
        .unwrap_or(false)
}

fn rel_string(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.to_string_lossy().replace('\\', "/")
}

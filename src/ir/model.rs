//! Canonical dataset model shared by every codec.
//!
//! Readers produce a [`Dataset`]; writers only ever borrow one. A dataset
//! owns three ordered sequences (categories, images, annotations) and
//! annotations refer to the other two by id.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::bbox::{BBoxXYWH, BoxPolicy};
use super::ids::{AnnotationId, CategoryId, ImageId};
use super::registry::CategoryRegistry;
use crate::error::DetconvError;

/// A complete object-detection dataset in canonical form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
}

/// An image record. `file_name` is a basename and is unique per dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub file_name: String,
    pub width: u32,
    pub height: u32,

    /// Channel count from VOC `<depth>`, when the source had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_captured: Option<String>,
}

impl Image {
    pub fn new(
        id: impl Into<ImageId>,
        file_name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            width,
            height,
            depth: None,
            date_captured: None,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// File name without its extension; the key VOC and YOLO outputs use.
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.file_name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

impl Category {
    pub fn new(id: impl Into<CategoryId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: None,
        }
    }

    pub fn with_supercategory(
        id: impl Into<CategoryId>,
        name: impl Into<String>,
        supercategory: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            supercategory: Some(supercategory.into()),
        }
    }
}

/// One labelled box.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub image_id: ImageId,
    pub category_id: CategoryId,

    /// Absolute top-left + size, in pixels.
    pub bbox: BBoxXYWH,

    /// Always false; crowd regions are not modelled.
    #[serde(default)]
    pub iscrowd: bool,

    /// COCO polygons carried through from a COCO source, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Vec<Vec<f64>>>,
}

impl Annotation {
    pub fn new(
        id: impl Into<AnnotationId>,
        image_id: impl Into<ImageId>,
        category_id: impl Into<CategoryId>,
        bbox: BBoxXYWH,
    ) -> Self {
        Self {
            id: id.into(),
            image_id: image_id.into(),
            category_id: category_id.into(),
            bbox,
            iscrowd: false,
            segmentation: None,
        }
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.bbox.area()
    }
}

impl Dataset {
    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.iter().find(|image| image.id == id)
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.name == name)
    }

    /// Groups annotations by image, keeping dataset order within each group.
    ///
    /// Fails if an annotation points at an image or category the dataset
    /// does not contain. `output` is the destination being written and is
    /// only used in error messages.
    pub(crate) fn annotations_by_image(
        &self,
        output: &Path,
    ) -> Result<BTreeMap<ImageId, Vec<&Annotation>>, DetconvError> {
        let image_ids: HashSet<ImageId> = self.images.iter().map(|image| image.id).collect();
        let category_ids: HashSet<CategoryId> =
            self.categories.iter().map(|category| category.id).collect();

        let mut grouped: BTreeMap<ImageId, Vec<&Annotation>> = BTreeMap::new();
        for annotation in &self.annotations {
            if !image_ids.contains(&annotation.image_id) {
                return Err(DetconvError::format(
                    output,
                    format!(
                        "annotation {} references missing image {}",
                        annotation.id, annotation.image_id
                    ),
                ));
            }
            if !category_ids.contains(&annotation.category_id) {
                return Err(DetconvError::UnknownCategory {
                    category: format!("#{}", annotation.category_id),
                    path: Some(output.to_path_buf()),
                });
            }
            grouped
                .entry(annotation.image_id)
                .or_default()
                .push(annotation);
        }
        Ok(grouped)
    }
}

/// An image record as a reader found it, before ids are assigned.
#[derive(Clone, Debug, Default)]
pub struct ImageDraft {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub depth: Option<u32>,
    pub objects: Vec<ObjectDraft>,
}

/// A box labelled by category name, before the name is resolved.
#[derive(Clone, Debug)]
pub struct ObjectDraft {
    pub category: String,
    pub bbox: BBoxXYWH,
}

impl ImageDraft {
    /// Checks the record on its own and applies `box_policy` to its boxes.
    ///
    /// Boxes the policy drops are removed with a warning. Nothing here
    /// depends on other records, so readers can run it before building the
    /// category registry.
    pub fn settle(mut self, source: &Path, box_policy: BoxPolicy) -> Result<Self, DetconvError> {
        if self.file_name.trim().is_empty() {
            return Err(DetconvError::format(source, "missing image file name"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DetconvError::format(
                source,
                format!(
                    "image '{}' has invalid size {}x{}",
                    self.file_name, self.width, self.height
                ),
            ));
        }

        let mut kept = Vec::with_capacity(self.objects.len());
        for object in self.objects {
            match box_policy.apply(object.bbox, self.width, self.height) {
                Ok(Some(bbox)) => kept.push(ObjectDraft { bbox, ..object }),
                Ok(None) => log::warn!(
                    "{}: dropping '{}' box outside image '{}'",
                    source.display(),
                    object.category,
                    self.file_name
                ),
                Err(message) => {
                    return Err(DetconvError::format(
                        source,
                        format!("{message} for '{}'", object.category),
                    ))
                }
            }
        }
        self.objects = kept;
        Ok(self)
    }
}

/// Append-only assembly of a [`Dataset`] for readers that mint ids.
///
/// Owns every counter and set one read needs, so nothing outlives the read.
/// Image ids and annotation ids start at 1, category ids at 0.
#[derive(Debug)]
pub struct DatasetBuilder {
    registry: CategoryRegistry,
    box_policy: BoxPolicy,
    images: Vec<Image>,
    annotations: Vec<Annotation>,
    file_names: HashSet<String>,
    next_image_id: u64,
    next_annotation_id: u64,
}

impl DatasetBuilder {
    pub fn new(registry: CategoryRegistry, box_policy: BoxPolicy) -> Self {
        Self {
            registry,
            box_policy,
            images: Vec::new(),
            annotations: Vec::new(),
            file_names: HashSet::new(),
            next_image_id: 1,
            next_annotation_id: 1,
        }
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Adds one image and its objects, or nothing at all.
    ///
    /// Every check (required fields, duplicate file name, category names,
    /// box policy) runs before the builder is touched, so a rejected image
    /// leaves no partial state behind. `source` is the file the draft came
    /// from and appears in any error.
    pub fn commit(&mut self, source: &Path, draft: ImageDraft) -> Result<ImageId, DetconvError> {
        let draft = draft.settle(source, self.box_policy)?;
        self.commit_settled(source, draft)
    }

    /// Like [`commit`](Self::commit) for a draft that already went through
    /// [`ImageDraft::settle`]; the box policy is not applied again.
    pub fn commit_settled(
        &mut self,
        source: &Path,
        draft: ImageDraft,
    ) -> Result<ImageId, DetconvError> {
        if self.file_names.contains(&draft.file_name) {
            return Err(DetconvError::DuplicateImage {
                path: source.to_path_buf(),
                file_name: draft.file_name,
            });
        }
        if let Some(object) = draft
            .objects
            .iter()
            .find(|object| !self.registry.accepts(&object.category))
        {
            return Err(DetconvError::UnknownCategory {
                category: object.category.clone(),
                path: Some(source.to_path_buf()),
            });
        }

        let image_id = ImageId::new(self.next_image_id);
        self.next_image_id += 1;

        for object in draft.objects {
            let category_id = self
                .registry
                .resolve(&object.category)
                .map_err(|err| err.at(source))?;
            self.annotations.push(Annotation::new(
                self.next_annotation_id,
                image_id,
                category_id,
                object.bbox,
            ));
            self.next_annotation_id += 1;
        }

        let mut image = Image::new(image_id, draft.file_name, draft.width, draft.height);
        image.depth = draft.depth;
        self.file_names.insert(image.file_name.clone());
        self.images.push(image);

        Ok(image_id)
    }

    pub fn finish(self) -> Dataset {
        Dataset {
            categories: self.registry.into_categories(),
            images: self.images,
            annotations: self.annotations,
        }
    }
}

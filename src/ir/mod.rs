//! Canonical annotation model and the per-format codecs.
//!
//! Every conversion goes through [`Dataset`]: a codec's reader builds one
//! and a codec's writer serialises it. Three box conventions meet here:
//!
//! - COCO stores absolute `(x, y, w, h)`, which is also what the model keeps
//!   on each [`Annotation`].
//! - Pascal VOC stores absolute corners `(xmin, ymin, xmax, ymax)`.
//! - YOLO stores `(xc, yc, w, h)` normalized by the image size.
//!
//! Category ids are minted by a [`CategoryRegistry`] whenever a source has
//! only names (VOC) or its ids come from a class list (YOLO).
//!
//! # Example
//!
//! ```
//! use detconv::ir::{Annotation, BBoxXYWH, Category, Dataset, Image};
//!
//! let dataset = Dataset {
//!     categories: vec![Category::new(0u64, "person")],
//!     images: vec![Image::new(1u64, "image.jpg", 640, 480)],
//!     annotations: vec![Annotation::new(
//!         1u64,
//!         1u64,
//!         0u64,
//!         BBoxXYWH::new(10.0, 20.0, 90.0, 180.0),
//!     )],
//! };
//! assert_eq!(dataset.annotations[0].area(), 16200.0);
//! ```

use std::path::Path;

use crate::error::DetconvError;

mod bbox;
mod ids;
pub mod io_coco_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;
mod registry;

pub use bbox::{BBoxXYWH, BBoxXYWHN, BBoxXYXY, BoxPolicy, PixelRounding};
pub use ids::{AnnotationId, CategoryId, ImageId};
pub use model::{Annotation, Category, Dataset, DatasetBuilder, Image, ImageDraft, ObjectDraft};
pub use registry::{CategoryPolicy, CategoryRegistry};

/// What a reader does with a record it cannot turn into an image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the whole read on the first bad record.
    #[default]
    FailFast,
    /// Log the bad record and continue without it.
    SkipAndLog,
}

impl ErrorPolicy {
    /// Returns `err` unless it concerns a single record and the policy says
    /// to skip such records, in which case it is logged and swallowed.
    pub(crate) fn absorb(self, err: DetconvError) -> Result<(), DetconvError> {
        match self {
            ErrorPolicy::SkipAndLog if err.is_per_record() => {
                log::warn!("skipping: {err}");
                Ok(())
            }
            _ => Err(err),
        }
    }
}

/// Options shared by the readers that mint ids (VOC and YOLO).
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    pub category_policy: CategoryPolicy,
    pub box_policy: BoxPolicy,
    pub error_policy: ErrorPolicy,
}

/// Extensions probed, in priority order, when pairing labels with images.
pub(crate) const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "png", "jpeg", "bmp", "webp"];

pub(crate) fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

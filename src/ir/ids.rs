//! Newtype ids for images, annotations and categories.
//!
//! Annotations point at images and categories by id only (soft references),
//! so distinct types keep an image id from ever being used as a category id.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[inline]
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            #[inline]
            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Dataset-scoped image id. Not tied to anything on disk.
    ImageId
);

define_id!(
    /// Annotation id, unique within a dataset.
    AnnotationId
);

define_id!(
    /// Category id. Registry-minted ids are dense over `[0, N)`.
    CategoryId
);

impl CategoryId {
    /// Position of this id in a dense `[0, N)` category table.
    #[inline]
    pub fn as_index(&self) -> usize {
        self.0 as usize
    }
}

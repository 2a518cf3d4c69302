//! Category registry: the single place category ids are minted.
//!
//! Ids are dense over `[0, N)` and assigned according to a
//! [`CategoryPolicy`]. Readers build one registry per read, resolve every
//! object's category name through it, and hand its final table to the
//! [`Dataset`](super::Dataset).

use std::collections::{BTreeSet, HashMap};

use super::ids::CategoryId;
use super::model::Category;
use crate::error::DetconvError;

/// Order in which category ids are assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CategoryPolicy {
    /// First-seen order while scanning the source.
    #[default]
    Insertion,
    /// Lexicographic order of all names found in the source.
    Sorted,
    /// Caller-supplied list; the id of a name is its index. Names outside
    /// the list fail with [`DetconvError::UnknownCategory`].
    Explicit(Vec<String>),
}

impl CategoryPolicy {
    /// Builds a registry for a source whose category names, in scan order,
    /// are `discovered`.
    ///
    /// `Insertion` and `Sorted` pre-register every discovered name so that
    /// ids do not depend on the order in which images are later resolved.
    /// `Explicit` ignores `discovered` entirely.
    pub fn build_registry<'a, I>(&self, discovered: I) -> Result<CategoryRegistry, DetconvError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            CategoryPolicy::Insertion => {
                let mut registry = CategoryRegistry::discovered();
                for name in discovered {
                    registry.resolve(name)?;
                }
                Ok(registry)
            }
            CategoryPolicy::Sorted => {
                let sorted: BTreeSet<&str> = discovered.into_iter().collect();
                let mut registry = CategoryRegistry::discovered();
                for name in sorted {
                    registry.resolve(name)?;
                }
                Ok(registry)
            }
            CategoryPolicy::Explicit(names) => CategoryRegistry::explicit(names.iter().cloned()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CategoryPolicy::Insertion => "insertion",
            CategoryPolicy::Sorted => "sorted",
            CategoryPolicy::Explicit(_) => "explicit",
        }
    }
}

/// Name <-> id table with dense ids.
#[derive(Clone, Debug)]
pub struct CategoryRegistry {
    names: Vec<String>,
    ids: HashMap<String, CategoryId>,
    closed: bool,
}

impl CategoryRegistry {
    /// An open registry: unseen names get the next free id.
    pub fn discovered() -> Self {
        Self {
            names: Vec::new(),
            ids: HashMap::new(),
            closed: false,
        }
    }

    /// A closed registry over a fixed, ordered list of names.
    pub fn explicit<I>(names: I) -> Result<Self, DetconvError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut registry = Self::discovered();
        for name in names {
            if registry.ids.contains_key(&name) {
                return Err(DetconvError::InvalidOption(format!(
                    "category '{name}' appears more than once in the category list"
                )));
            }
            registry.insert(name);
        }
        registry.closed = true;
        Ok(registry)
    }

    /// Returns the id for `name`, assigning the next id if the registry is
    /// open and the name is new. Repeated calls return the same id.
    pub fn resolve(&mut self, name: &str) -> Result<CategoryId, DetconvError> {
        if let Some(id) = self.ids.get(name) {
            return Ok(*id);
        }
        if self.closed {
            return Err(DetconvError::UnknownCategory {
                category: name.to_string(),
                path: None,
            });
        }
        Ok(self.insert(name.to_string()))
    }

    /// Looks up a name without assigning anything.
    pub fn get(&self, name: &str) -> Option<CategoryId> {
        self.ids.get(name).copied()
    }

    /// Returns the name registered under `id`.
    pub fn by_id(&self, id: CategoryId) -> Result<&str, DetconvError> {
        self.names
            .get(id.as_index())
            .map(String::as_str)
            .ok_or_else(|| DetconvError::UnknownCategory {
                category: format!("#{id}"),
                path: None,
            })
    }

    /// True when `resolve(name)` would succeed.
    pub fn accepts(&self, name: &str) -> bool {
        !self.closed || self.ids.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Consumes the registry into category records ordered by id.
    pub fn into_categories(self) -> Vec<Category> {
        self.names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Category::new(index as u64, name))
            .collect()
    }

    fn insert(&mut self, name: String) -> CategoryId {
        let id = CategoryId::new(self.names.len() as u64);
        self.ids.insert(name.clone(), id);
        self.names.push(name);
        id
    }
}

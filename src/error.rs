use std::path::{Path, PathBuf};
use thiserror::Error;

/// The main error type for detconv operations.
///
/// Conversions are fail-fast: the first error aborts the whole run. Every
/// variant tied to a file carries that file's path so the message points at
/// the offending input.
#[derive(Debug, Error)]
pub enum DetconvError {
    #[error("path not found: {}", path.display())]
    PathNotFound { path: PathBuf },

    #[error("format error in {}: {message}", path.display())]
    FormatError { path: PathBuf, message: String },

    #[error("duplicate image '{file_name}' in {}", path.display())]
    DuplicateImage { path: PathBuf, file_name: String },

    #[error("unknown category '{category}'{}", location(path.as_deref()))]
    UnknownCategory {
        category: String,
        path: Option<PathBuf>,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetconvError {
    pub(crate) fn format(path: &Path, message: impl Into<String>) -> Self {
        DetconvError::FormatError {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| DetconvError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for errors confined to one input record, which a skip-and-log
    /// read may step over.
    pub(crate) fn is_per_record(&self) -> bool {
        matches!(
            self,
            DetconvError::PathNotFound { .. }
                | DetconvError::FormatError { .. }
                | DetconvError::DuplicateImage { .. }
                | DetconvError::UnknownCategory { .. }
        )
    }

    /// Attaches a file path to an [`DetconvError::UnknownCategory`] raised
    /// by the category registry, which has no notion of files.
    pub(crate) fn at(self, source_path: &Path) -> Self {
        match self {
            DetconvError::UnknownCategory {
                category,
                path: None,
            } => DetconvError::UnknownCategory {
                category,
                path: Some(source_path.to_path_buf()),
            },
            other => other,
        }
    }
}

fn location(path: Option<&Path>) -> String {
    match path {
        Some(path) => format!(" referenced in {}", path.display()),
        None => String::new(),
    }
}

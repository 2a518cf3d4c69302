//! Conversion report types for tracking lossiness and policy decisions.
//!
//! A [`ConversionReport`] records what was read, what was written, and every
//! place where the target format could not hold something the source had.

use serde::Serialize;
use std::fmt;

/// A report generated during format conversion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub from: String,
    /// Target format name.
    pub to: String,
    /// Counts from the dataset as read.
    pub input: ConversionStats,
    /// Counts as written (may differ if images are dropped, etc.).
    pub output: ConversionStats,
    /// Issues discovered during conversion analysis.
    pub issues: Vec<ConversionIssue>,
}

impl ConversionReport {
    /// Create a new empty report for a conversion between formats.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    /// Count of warning-level issues (true lossiness).
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning)
            .count()
    }

    /// Count of info-level issues (policy decisions, notes).
    pub fn info_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Info)
            .count()
    }

    /// Returns true if this conversion lost information.
    pub fn is_lossy(&self) -> bool {
        self.warning_count() > 0
    }

    pub fn has(&self, code: ConversionIssueCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Converted {} -> {}", self.from, self.to)?;
        writeln!(f, "  input:  {}", self.input)?;
        writeln!(f, "  output: {}", self.output)?;

        let warnings = self.warning_count();
        if warnings > 0 {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", warnings)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Warning)
            {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        let infos = self.info_count();
        if infos > 0 {
            writeln!(f)?;
            writeln!(f, "Notes ({}):", infos)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Info)
            {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        Ok(())
    }
}

/// Image, category and box counts for one side of a conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    pub images: usize,
    pub categories: usize,
    pub bboxes: usize,
}

impl fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images, {} categories, {} bboxes",
            self.images, self.categories, self.bboxes
        )
    }
}

/// A single issue discovered during conversion analysis.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
}

impl ConversionIssue {
    /// Create a warning-level issue (indicates lossiness).
    pub fn warning(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code,
            message: message.into(),
        }
    }

    /// Create an info-level issue (policy note).
    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Info,
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// Information present in the source is absent from the output.
    Warning,
    /// A policy decision worth knowing about; nothing was lost.
    Info,
}

/// Stable issue codes for programmatic consumption.
///
/// These codes are part of the JSON report and should remain stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    /// YOLO writes no label file for an image without annotations.
    DropImagesWithoutAnnotations,
    /// VOC has no id slot; only category names survive.
    DropCategoryIds,
    /// Supercategories have no VOC or YOLO equivalent.
    DropCategorySupercategory,
    /// COCO polygons cannot be expressed as VOC or YOLO boxes.
    DropSegmentation,
    /// Category ids were minted by the registry because the source had none.
    CategoryIdsReminted,
    /// Sparse category ids were renumbered into YOLO class indices.
    YoloClassCompaction,
    /// Absolute coordinates are written as integers.
    PixelQuantization,
    /// The destination directory was removed before writing.
    DestinationPurged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_is_not_lossy() {
        let report = ConversionReport::new("coco", "voc");
        assert!(!report.is_lossy());
        assert_eq!(report.warning_count(), 0);
        assert_eq!(report.info_count(), 0);
    }

    #[test]
    fn warning_makes_report_lossy() {
        let mut report = ConversionReport::new("coco", "yolo");
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropImagesWithoutAnnotations,
            "2 image(s) have no annotations and get no label file",
        ));
        assert!(report.is_lossy());
        assert!(report.has(ConversionIssueCode::DropImagesWithoutAnnotations));
    }

    #[test]
    fn info_does_not_make_report_lossy() {
        let mut report = ConversionReport::new("voc", "coco");
        report.add(ConversionIssue::info(
            ConversionIssueCode::CategoryIdsReminted,
            "category ids assigned in first-seen order",
        ));
        assert!(!report.is_lossy());
        assert_eq!(report.info_count(), 1);
    }

    #[test]
    fn report_serializes_to_json() {
        let mut report = ConversionReport::new("coco", "voc");
        report.input = ConversionStats {
            images: 10,
            categories: 3,
            bboxes: 50,
        };
        report.add(ConversionIssue::info(
            ConversionIssueCode::DropCategoryIds,
            "VOC keeps category names only",
        ));

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"from\":\"coco\""));
        assert!(json.contains("\"bboxes\":50"));
        assert!(json.contains("\"severity\":\"info\""));
        assert!(json.contains("\"code\":\"drop_category_ids\""));
    }

    #[test]
    fn display_lists_counts_and_notes() {
        let mut report = ConversionReport::new("yolo", "coco");
        report.output = ConversionStats {
            images: 1,
            categories: 2,
            bboxes: 3,
        };
        report.add(ConversionIssue::info(
            ConversionIssueCode::PixelQuantization,
            "boxes truncated to whole pixels",
        ));

        let text = report.to_string();
        assert!(text.contains("output: 1 images, 2 categories, 3 bboxes"));
        assert!(text.contains("Notes (1):"));
        assert!(text.contains("boxes truncated to whole pixels"));
    }
}

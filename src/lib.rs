//! Detconv: object-detection annotation converter.
//!
//! Detconv converts bounding-box annotations between COCO JSON, Pascal VOC
//! XML and YOLO text labels. Every conversion reads the source into one
//! canonical [`ir::Dataset`] and writes that dataset back out, so each format
//! needs only a reader and a writer.
//!
//! # Modules
//!
//! - [`ir`]: Canonical model, box transforms, category registry and codecs
//! - [`conversion`]: Read/write pipeline and conversion reports
//! - [`error`]: Error types for detconv operations

pub mod conversion;
pub mod error;
pub mod ir;

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use conversion::{ConvertOptions, ErrorPolicy, Format, ImageSizes};
pub use error::DetconvError;
use ir::{BoxPolicy, CategoryPolicy, PixelRounding};

/// The detconv CLI application.
#[derive(Parser)]
#[command(name = "detconv")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a dataset from one annotation format to another.
    Convert(ConvertArgs),
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Source format.
    #[arg(long, value_enum)]
    from: ConvertFormat,

    /// Target format.
    #[arg(long, value_enum)]
    to: ConvertFormat,

    /// Input: a COCO JSON file, or a VOC/YOLO annotation directory.
    #[arg(short, long)]
    input: PathBuf,

    /// Output: a COCO JSON file, or a VOC/YOLO directory.
    /// A VOC/YOLO output directory is deleted and recreated.
    #[arg(short, long)]
    output: PathBuf,

    /// Directory of images used to size YOLO labels (required for YOLO input).
    #[arg(long, env = "DETCONV_IMAGE_PATH")]
    image_path: Option<PathBuf>,

    /// Ordered category list; id = position. Implies the explicit policy.
    #[arg(long, value_delimiter = ',')]
    categories: Vec<String>,

    /// How category ids are assigned when the source has none.
    #[arg(long, value_enum)]
    category_policy: Option<CategoryPolicyArg>,

    /// Treatment of boxes with no positive width or height.
    #[arg(long, value_enum, default_value = "passthrough")]
    box_policy: BoxPolicyArg,

    /// How absolute coordinates become whole pixels.
    #[arg(long, value_enum, default_value = "truncate")]
    rounding: RoundingArg,

    /// Skip and log bad input records instead of failing.
    #[arg(long)]
    skip_invalid: bool,

    /// Only read the VOC images listed in ImageSets/Main/<SPLIT>.txt.
    #[arg(long)]
    voc_split: Option<String>,

    /// Report format printed after a successful conversion.
    #[arg(long, value_enum, default_value = "text")]
    report: ReportFormat,
}

/// CLI-facing format names; mapped onto [`conversion::Format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ConvertFormat {
    Coco,
    Voc,
    Yolo,
}

impl From<ConvertFormat> for Format {
    fn from(value: ConvertFormat) -> Self {
        match value {
            ConvertFormat::Coco => Format::Coco,
            ConvertFormat::Voc => Format::Voc,
            ConvertFormat::Yolo => Format::Yolo,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CategoryPolicyArg {
    /// First-seen order while scanning the source.
    Insertion,
    /// Alphabetical order of category names.
    Sorted,
    /// The order given by --categories.
    Explicit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BoxPolicyArg {
    Passthrough,
    Reject,
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RoundingArg {
    Truncate,
    Round,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

/// Run the detconv CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), DetconvError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        None => {
            println!("detconv {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert object-detection annotations between COCO, VOC and YOLO.");
            println!();
            println!("Run 'detconv --help' for usage information.");
            Ok(())
        }
    }
}

fn run_convert(args: ConvertArgs) -> Result<(), DetconvError> {
    let options = convert_options(&args)?;
    let report = conversion::convert(
        args.from.into(),
        &args.input,
        args.to.into(),
        &args.output,
        &options,
    )?;

    let stdout_path = Path::new("<stdout>");
    let mut stdout = std::io::stdout().lock();
    match args.report {
        ReportFormat::Text => write!(stdout, "{report}").map_err(DetconvError::io(stdout_path))?,
        ReportFormat::Json => {
            serde_json::to_writer_pretty(&mut stdout, &report)
                .map_err(|source| DetconvError::io(stdout_path)(source.into()))?;
            writeln!(stdout).map_err(DetconvError::io(stdout_path))?;
        }
    }

    Ok(())
}

fn convert_options(args: &ConvertArgs) -> Result<ConvertOptions, DetconvError> {
    let category_policy = match (args.category_policy, args.categories.is_empty()) {
        (None | Some(CategoryPolicyArg::Explicit), false) => {
            CategoryPolicy::Explicit(args.categories.clone())
        }
        (Some(CategoryPolicyArg::Explicit), true) => {
            return Err(DetconvError::InvalidOption(
                "--category-policy explicit needs --categories".to_string(),
            ))
        }
        (Some(policy), false) => {
            return Err(DetconvError::InvalidOption(format!(
                "--categories implies the explicit policy, not {policy:?}"
            )))
        }
        (None | Some(CategoryPolicyArg::Insertion), true) => CategoryPolicy::Insertion,
        (Some(CategoryPolicyArg::Sorted), true) => CategoryPolicy::Sorted,
    };

    Ok(ConvertOptions {
        category_policy,
        image_sizes: args.image_path.clone().map(ImageSizes::Probe),
        box_policy: match args.box_policy {
            BoxPolicyArg::Passthrough => BoxPolicy::Passthrough,
            BoxPolicyArg::Reject => BoxPolicy::Reject,
            BoxPolicyArg::Clamp => BoxPolicy::Clamp,
        },
        pixel_rounding: match args.rounding {
            RoundingArg::Truncate => PixelRounding::Truncate,
            RoundingArg::Round => PixelRounding::Round,
        },
        error_policy: if args.skip_invalid {
            ErrorPolicy::SkipAndLog
        } else {
            ErrorPolicy::FailFast
        },
        voc_split: args.voc_split.clone(),
    })
}

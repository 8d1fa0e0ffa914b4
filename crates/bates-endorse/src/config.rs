use anyhow::bail;
use bates::{
    BatesNumber, DEFAULT_EXTENSION, DispatchConfig, EndorseOptions, FailurePolicy, PageLayout, PoolConfig,
};
use clap::{Parser, ValueEnum};
use core::time::Duration;
use std::path::PathBuf;

/// Command-line and environment settings for `bates-endorse`.
///
/// Every option can also be supplied through the environment variable named
/// in its help text, including from a `.env` file in the working directory.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bates-endorse",
    version,
    about = "Stamps a label and sequential Bates numbers onto every page of a directory of images"
)]
pub struct CliArgs {
    /// Directory searched recursively for input images.
    pub input_dir: PathBuf,

    /// Directory the endorsed output is written to. Created if missing.
    pub output_dir: PathBuf,

    /// Maximum number of worker processes running at once on the async path.
    ///
    /// Environment variable: `BATES_WORKERS`
    #[arg(long, env = "BATES_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// Text placed before the zero-padded number.
    ///
    /// Environment variable: `BATES_PREFIX`
    #[arg(long, env = "BATES_PREFIX", default_value_t = String::from("TEST_"))]
    pub prefix: String,

    /// Number stamped on the first page of each file. Must be at least 1.
    ///
    /// Environment variable: `BATES_START`
    #[arg(long, env = "BATES_START", default_value_t = 1)]
    pub start: u64,

    /// Minimum number of digits; shorter numbers are zero-padded.
    ///
    /// Environment variable: `BATES_PADDING`
    #[arg(long, env = "BATES_PADDING", default_value_t = BatesNumber::DEFAULT_PADDING)]
    pub padding: usize,

    /// Label stamped next to the Bates number.
    ///
    /// Environment variable: `BATES_LABEL`
    #[arg(long, env = "BATES_LABEL", default_value_t = String::from("CONFIDENTIAL"))]
    pub label: String,

    /// File extension to endorse, matched case-insensitively.
    ///
    /// Environment variable: `BATES_EXTENSION`
    #[arg(long, env = "BATES_EXTENSION", default_value_t = String::from(DEFAULT_EXTENSION))]
    pub extension: String,

    /// Write one output per page instead of one per file.
    #[arg(long, default_value_t = false)]
    pub single_page: bool,

    /// Record failed files and keep going instead of stopping at the first.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Kill a worker that has not answered after this many seconds.
    ///
    /// Environment variable: `BATES_TASK_TIMEOUT_SECS`
    #[arg(long, env = "BATES_TASK_TIMEOUT_SECS")]
    pub task_timeout_secs: Option<u64>,

    /// Which dispatch paths to run and time.
    ///
    /// Environment variable: `BATES_MODE`
    #[arg(long, env = "BATES_MODE", value_enum, default_value_t = Mode::Both)]
    pub mode: Mode,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Async pool first, then the sync path.
    Both,
    Async,
    Sync,
}

impl Mode {
    pub const fn runs_async(self) -> bool {
        matches!(self, Self::Both | Self::Async)
    }

    pub const fn runs_sync(self) -> bool {
        matches!(self, Self::Both | Self::Sync)
    }
}

#[derive(Debug, Clone)]
pub struct EndorseConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extension: String,
    pub mode: Mode,
    pub pool: PoolConfig,
    pub dispatch: DispatchConfig,
    pub options: EndorseOptions,
}

impl TryFrom<CliArgs> for EndorseConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("BATES_WORKERS must be greater than 0");
        }

        if args.task_timeout_secs == Some(0) {
            bail!("BATES_TASK_TIMEOUT_SECS must be greater than 0 when set");
        }

        if args.extension.trim_start_matches('.').is_empty() {
            bail!("BATES_EXTENSION must not be empty");
        }

        if !args.input_dir.is_dir() {
            bail!("Input directory {} does not exist", args.input_dir.display());
        }

        let starting_bates = BatesNumber::new(args.prefix, args.start, args.padding)?;

        let failure_policy = if args.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Stop
        };

        let page_layout = if args.single_page {
            PageLayout::SinglePage
        } else {
            PageLayout::MultiPage
        };

        Ok(Self {
            pool: PoolConfig {
                capacity: args.workers,
                receive_timeout: args.task_timeout_secs.map(Duration::from_secs),
            },
            dispatch: DispatchConfig::new(&args.output_dir, starting_bates)
                .with_failure_policy(failure_policy),
            options: EndorseOptions {
                page_layout,
                ..EndorseOptions::with_label(args.label)
            },
            input_dir: args.input_dir,
            output_dir: args.output_dir,
            extension: args.extension,
            mode: args.mode,
        })
    }
}

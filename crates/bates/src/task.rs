use crate::BatesNumber;
use std::path::{Path, PathBuf};

/// Number of pages an annotator endorsed for one task.
pub type PageCount = u64;

/// One unit of endorsement work.
///
/// Built by the [`Dispatcher`](crate::Dispatcher) for a single input file
/// and consumed exactly once, either by a direct annotator call or by one
/// isolated worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnvelope {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub starting_bates: BatesNumber,
}

impl TaskEnvelope {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        starting_bates: BatesNumber,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            starting_bates,
        }
    }

    /// Builds an envelope that writes `source` under `output_dir` with the
    /// same file name.
    pub fn into_dir(source: impl Into<PathBuf>, output_dir: &Path, starting_bates: BatesNumber) -> Self {
        let source = source.into();
        let destination = match source.file_name() {
            Some(name) => output_dir.join(name),
            None => output_dir.to_path_buf(),
        };
        Self {
            source,
            destination,
            starting_bates,
        }
    }
}

//! The annotation seam.
//!
//! An [`Annotator`] stamps a label and consecutive Bates numbers onto every
//! page of one source document and writes the result. The dispatch layer
//! never depends on how that happens; it only needs a [`MakeAnnotator`] so
//! each isolated worker can build a fresh instance after it has forked.

mod manifest;
mod options;
mod tiff;

pub use manifest::{MANIFEST_SUFFIX, ManifestAnnotator, manifest_path};
pub use options::{Artifact, EndorseOptions, FontWeight, Gravity, PageLayout, page_path};
pub use tiff::{blank_tiff, count_pages};

use crate::{AnnotationError, BatesNumber, PageCount};
use std::path::Path;

/// Stamps one document.
pub trait Annotator {
    /// Endorses every page of `source` starting at `starting`, writes the
    /// result to `destination`, and returns the number of pages written.
    ///
    /// # Errors
    ///
    /// Returns an [`AnnotationError`] when the source cannot be read or the
    /// output cannot be written.
    fn endorse(
        &self,
        source: &Path,
        destination: &Path,
        starting: &BatesNumber,
    ) -> Result<PageCount, AnnotationError>;
}

/// Builds annotators.
///
/// The worker pool holds one factory and calls it inside each forked child,
/// so no annotator state is ever shared between tasks. Any
/// `Fn() -> impl Annotator` closure qualifies.
pub trait MakeAnnotator: Send + Sync + 'static {
    type Annotator: Annotator;

    fn make_annotator(&self) -> Self::Annotator;
}

impl<F, A> MakeAnnotator for F
where
    F: Fn() -> A + Send + Sync + 'static,
    A: Annotator,
{
    type Annotator = A;

    fn make_annotator(&self) -> A {
        self()
    }
}

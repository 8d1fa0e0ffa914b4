use super::{Annotator, EndorseOptions, FontWeight, Gravity, tiff};
use crate::{AnnotationError, BatesNumber, PageCount};
use serde::Serialize;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// Suffix appended to each artifact path for its manifest.
pub const MANIFEST_SUFFIX: &str = ".bates.json";

/// Records endorsements as JSON manifests instead of rasterizing them.
///
/// For every artifact the configured [`PageLayout`](super::PageLayout)
/// derives, writes `<artifact>.bates.json` listing the label and Bates
/// number stamped on each page along with the placement and font settings a
/// renderer would use.
#[derive(Debug, Clone, Default)]
pub struct ManifestAnnotator {
    options: EndorseOptions,
}

#[derive(Serialize)]
struct Manifest<'a> {
    source: &'a str,
    label: &'a str,
    label_position: Gravity,
    bates_position: Gravity,
    font_family: &'a str,
    point_size: u32,
    font_weight: FontWeight,
    margin: (u32, u32),
    pages: &'a [PageStamp],
}

#[derive(Serialize)]
struct PageStamp {
    /// 1-based page index within the source.
    page: PageCount,
    bates: String,
}

impl ManifestAnnotator {
    pub const fn new(options: EndorseOptions) -> Self {
        Self { options }
    }

    pub const fn options(&self) -> &EndorseOptions {
        &self.options
    }
}

impl Annotator for ManifestAnnotator {
    fn endorse(
        &self,
        source: &Path,
        destination: &Path,
        starting: &BatesNumber,
    ) -> Result<PageCount, AnnotationError> {
        let bytes = fs::read(source).map_err(|e| AnnotationError::Unreadable {
            path: source.display().to_string(),
            reason: e.to_string(),
        })?;
        let pages = tiff::count_pages(&bytes).map_err(|reason| AnnotationError::Malformed {
            path: source.display().to_string(),
            reason,
        })?;

        let stamps: Vec<PageStamp> = (1..=pages)
            .zip(starting.sequence())
            .map(|(page, bates)| PageStamp {
                page,
                bates: bates.to_string(),
            })
            .collect();

        let source_name = source.to_string_lossy();
        for artifact in self.options.page_layout.artifacts(destination, pages) {
            let manifest = Manifest {
                source: &source_name,
                label: &self.options.label,
                label_position: self.options.label_position,
                bates_position: self.options.bates_position,
                font_family: &self.options.font_family,
                point_size: self.options.point_size,
                font_weight: self.options.font_weight,
                margin: self.options.margin,
                pages: &stamps[artifact.pages.start as usize..artifact.pages.end as usize],
            };
            let path = manifest_path(&artifact.path);
            let json = serde_json::to_vec_pretty(&manifest)
                .map_err(|e| AnnotationError::Other(e.to_string()))?;
            fs::write(&path, json).map_err(|e| AnnotationError::Unwritable {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        Ok(pages)
    }
}

/// `out/doc.tif` becomes `out/doc.tif.bates.json`.
pub fn manifest_path(artifact: &Path) -> PathBuf {
    let mut path = OsString::from(artifact.as_os_str());
    path.push(MANIFEST_SUFFIX);
    PathBuf::from(path)
}

use crate::PageCount;
use core::ops::Range;
use serde::Serialize;
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Anchor of a stamp on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gravity {
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    Light,
    Normal,
    Bold,
}

impl FontWeight {
    /// CSS-style numeric weight.
    pub const fn numeric(self) -> u16 {
        match self {
            Self::Light => 300,
            Self::Normal => 400,
            Self::Bold => 700,
        }
    }
}

/// How endorsed pages are written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    /// All pages go to the destination as one artifact.
    MultiPage,
    /// Each page becomes its own artifact, named by inserting `_<n>`
    /// (1-based) before the destination's extension.
    SinglePage,
}

/// An output file and the zero-based page range it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub pages: Range<PageCount>,
}

impl PageLayout {
    /// Lists the artifacts an endorsement of `pages` pages produces.
    pub fn artifacts(self, destination: &Path, pages: PageCount) -> Vec<Artifact> {
        match self {
            Self::MultiPage => vec![Artifact {
                path: destination.to_path_buf(),
                pages: 0..pages,
            }],
            Self::SinglePage => (0..pages)
                .map(|page| Artifact {
                    path: page_path(destination, page + 1),
                    pages: page..page + 1,
                })
                .collect(),
        }
    }
}

/// `out/doc.tif` with page 2 becomes `out/doc_2.tif`.
pub fn page_path(destination: &Path, page: PageCount) -> PathBuf {
    let mut name = OsString::from(destination.file_stem().unwrap_or_default());
    name.push(format!("_{page}"));
    if let Some(ext) = destination.extension() {
        name.push(".");
        name.push(ext);
    }
    destination.with_file_name(name)
}

/// Immutable configuration handed to an annotator at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndorseOptions {
    /// Fixed text stamped on every page.
    pub label: String,
    pub font_family: String,
    pub point_size: u32,
    pub font_weight: FontWeight,
    pub label_position: Gravity,
    pub bates_position: Gravity,
    /// Horizontal and vertical distance from the anchored edges.
    pub margin: (u32, u32),
    pub page_layout: PageLayout,
}

impl Default for EndorseOptions {
    fn default() -> Self {
        Self {
            label: String::from("CONFIDENTIAL"),
            font_family: String::from("helvetica"),
            point_size: 10,
            font_weight: FontWeight::Bold,
            label_position: Gravity::SouthWest,
            bates_position: Gravity::SouthEast,
            margin: (10, 10),
            page_layout: PageLayout::MultiPage,
        }
    }
}

impl EndorseOptions {
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

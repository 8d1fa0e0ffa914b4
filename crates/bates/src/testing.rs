//! Annotators with scripted behavior for exercising the dispatch layer.

use crate::{AnnotationError, Annotator, BatesNumber, PageCount};
use core::time::Duration;
use std::path::Path;

/// Returns a fixed page count without touching the filesystem.
pub struct Fixed(pub PageCount);

impl Annotator for Fixed {
    fn endorse(&self, _: &Path, _: &Path, _: &BatesNumber) -> Result<PageCount, AnnotationError> {
        Ok(self.0)
    }
}

/// Reports the starting Bates number it was handed as the page count.
pub struct EchoStart;

impl Annotator for EchoStart {
    fn endorse(&self, _: &Path, _: &Path, starting: &BatesNumber) -> Result<PageCount, AnnotationError> {
        Ok(starting.number())
    }
}

pub struct Failing;

impl Annotator for Failing {
    fn endorse(&self, source: &Path, _: &Path, _: &BatesNumber) -> Result<PageCount, AnnotationError> {
        Err(AnnotationError::Unreadable {
            path: source.display().to_string(),
            reason: "scripted failure".to_string(),
        })
    }
}

pub struct Panicking;

impl Annotator for Panicking {
    fn endorse(&self, _: &Path, _: &Path, _: &BatesNumber) -> Result<PageCount, AnnotationError> {
        panic!("boom");
    }
}

/// Terminates the worker without answering.
pub struct Exiting(pub i32);

impl Annotator for Exiting {
    fn endorse(&self, _: &Path, _: &Path, _: &BatesNumber) -> Result<PageCount, AnnotationError> {
        // SAFETY: only ever called inside a forked worker, which may skip
        // destructors and atexit handlers.
        unsafe { nix::libc::_exit(self.0) }
    }
}

/// Sleeps before answering; a source path containing `hang` sleeps for an
/// hour instead.
pub struct Sleeping(pub Duration);

impl Annotator for Sleeping {
    fn endorse(&self, source: &Path, _: &Path, _: &BatesNumber) -> Result<PageCount, AnnotationError> {
        if source.to_string_lossy().contains("hang") {
            std::thread::sleep(Duration::from_secs(3600));
        } else {
            std::thread::sleep(self.0);
        }
        Ok(1)
    }
}

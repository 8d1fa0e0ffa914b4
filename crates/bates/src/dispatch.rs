//! Synchronous and asynchronous endorsement of a file batch.
//!
//! Both paths build one [`TaskEnvelope`] per file the same way and summarize
//! the batch in a [`BatchReport`], so their results can be compared
//! directly:
//!
//! - [`Dispatcher::run_sync`] calls one annotator in the caller's thread, file
//!   after file. No process is forked.
//! - [`Dispatcher::run_async`] submits every envelope to a [`WorkerPool`] and
//!   then resolves all the futures. A failing task never cancels its
//!   siblings.

use crate::{Annotator, BatesNumber, Error, MakeAnnotator, PageCount, Result, TaskEnvelope, TaskFuture, WorkerPool};
use futures::future::join_all;
use std::path::{Path, PathBuf};

/// What a batch does when one of its tasks fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report the first failure as the batch's error.
    #[default]
    Stop,
    /// Record the failure in the report and carry on.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub output_dir: PathBuf,
    /// Bates number each file starts from.
    pub starting_bates: BatesNumber,
    pub failure_policy: FailurePolicy,
}

impl DispatchConfig {
    pub fn new(output_dir: impl Into<PathBuf>, starting_bates: BatesNumber) -> Self {
        Self {
            output_dir: output_dir.into(),
            starting_bates,
            failure_policy: FailurePolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub source: PathBuf,
    pub error: Error,
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files attempted.
    pub files: usize,
    /// Pages endorsed across all successful files.
    pub pages: PageCount,
    pub failures: Vec<TaskFailure>,
}

impl BatchReport {
    fn record(&mut self, source: &Path, result: Result<PageCount>) {
        self.files += 1;
        match result {
            Ok(pages) => self.pages += pages,
            Err(error) => self.failures.push(TaskFailure {
                source: source.to_path_buf(),
                error,
            }),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.files - self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub const fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Envelope for `source`: written to the output directory under its own
    /// file name, numbered from the configured starting value.
    pub fn envelope(&self, source: &Path) -> TaskEnvelope {
        TaskEnvelope::into_dir(
            source,
            &self.config.output_dir,
            self.config.starting_bates.clone(),
        )
    }

    /// Endorses `files` one at a time with `annotator`.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::Stop`], returns the first task's error and
    /// leaves the remaining files untouched.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(files = files.len())))]
    pub fn run_sync<A: Annotator>(&self, annotator: &A, files: &[PathBuf]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for source in files {
            let task = self.envelope(source);
            let result = annotator
                .endorse(&task.source, &task.destination, &task.starting_bates)
                .map_err(Error::from);
            self.settle(&mut report, source, result)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(pages = report.pages, failures = report.failures.len(), "Sync batch done");

        Ok(report)
    }

    /// Submits one envelope per file and returns the futures in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolClosed`] if the pool stops admitting work part
    /// way through. Tasks submitted before that keep running.
    pub fn submit_all<M: MakeAnnotator>(
        &self,
        pool: &WorkerPool<M>,
        files: &[PathBuf],
    ) -> Result<Vec<(PathBuf, TaskFuture)>> {
        files
            .iter()
            .map(|source| Ok((source.clone(), pool.submit(self.envelope(source))?)))
            .collect()
    }

    /// Endorses `files` through `pool` and waits for every task.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] if the pool refuses a submission.
    /// - Under [`FailurePolicy::Stop`], the error of the first failed file in
    ///   file order, reported only after every task has resolved.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(files = files.len())))]
    pub async fn run_async<M: MakeAnnotator>(
        &self,
        pool: &WorkerPool<M>,
        files: &[PathBuf],
    ) -> Result<BatchReport> {
        let (sources, futures): (Vec<_>, Vec<_>) = self.submit_all(pool, files)?.into_iter().unzip();
        let results = join_all(futures).await;

        let mut report = BatchReport::default();
        for (source, result) in sources.iter().zip(results) {
            self.settle(&mut report, source, result)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(pages = report.pages, failures = report.failures.len(), "Async batch done");

        Ok(report)
    }

    fn settle(&self, report: &mut BatchReport, source: &Path, result: Result<PageCount>) -> Result<()> {
        match (result, self.config.failure_policy) {
            (Err(error), FailurePolicy::Stop) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(source = %source.display(), "Stopping batch: {error}");
                Err(error)
            }
            (result, _) => {
                report.record(source, result);
                Ok(())
            }
        }
    }
}

//! One task, one process.
//!
//! [`run_isolated`] forks a child for a single [`TaskEnvelope`], hands it the
//! request over a fresh [`Channel`], and blocks until the child answers or
//! goes away. The annotator only ever runs in the child, so native or global
//! state it touches is never shared between concurrent tasks.
//!
//! ## Descriptor hygiene
//!
//! The parent must be the only holder of the child's end of the channel
//! once the child exists, otherwise a crashed child never reads as
//! end-of-stream. Two things guarantee that:
//!
//! - Each side drops the end it does not use right after the fork.
//! - Opening the pair, forking, and dropping the parent's copy of the child
//!   end all happen under one process-wide lock, so a sibling task forking on
//!   another thread never inherits this task's child end.

use crate::{
    AnnotationError, BatesNumber, Error, PageCount, Result, TaskEnvelope,
    annotator::{Annotator, MakeAnnotator},
    ipc::{Channel, Endpoint, Request, Response, codec},
};
use core::time::Duration;
use nix::{
    errno::Errno,
    sys::{
        signal::{Signal, kill},
        wait::{WaitStatus, waitpid},
    },
    unistd::{ForkResult, Pid, fork},
};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};

static SPAWN_LOCK: Mutex<()> = parking_lot::const_mutex(());

// Longest failure text sent back, in bytes, keeping every response well
// inside one frame. Structured failures give a quarter each to path and
// reason, since the message repeats both.
const MAX_ERROR_LEN: usize = 4096;

/// Runs `task` in a forked child and returns its page count.
///
/// Blocks the calling thread for the whole round-trip. The child is always
/// reaped before this returns, on success and on every error path.
///
/// # Errors
///
/// - [`Error::Codec`] or [`Error::FrameTooLarge`] if the request cannot be
///   encoded. Nothing is forked in that case.
/// - [`Error::ProcessSpawn`] if `fork` fails.
/// - [`Error::ChannelTransport`] if the exchange fails.
/// - [`Error::ChildCrashed`] if the child exits without answering.
/// - [`Error::Timeout`] if `receive_timeout` elapses; the child is killed.
/// - [`Error::Annotation`] if the annotator reported a failure.
pub fn run_isolated<M: MakeAnnotator>(
    task: &TaskEnvelope,
    factory: &M,
    receive_timeout: Option<Duration>,
) -> Result<PageCount> {
    let request = codec::encode_request(&Request::new(&task.source, &task.destination)?)?;
    let (mut endpoint, child) = spawn(&task.starting_bates, factory)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        pid = child.pid.as_raw(),
        source = %task.source.display(),
        "Spawned worker"
    );

    endpoint.set_receive_timeout(receive_timeout)?;
    endpoint.send(&request)?;

    match endpoint.recv()? {
        Some(frame) => {
            child.wait();
            match codec::decode_response(&frame)? {
                Response::Pages(pages) => Ok(pages),
                Response::Failed(err) => Err(err.into()),
            }
        }
        None => {
            let status = child.wait();
            #[cfg(feature = "tracing")]
            tracing::warn!(?status, source = %task.source.display(), "Worker exited without a response");
            Err(Error::ChildCrashed {
                context: describe(status),
            })
        }
    }
}

fn spawn<M: MakeAnnotator>(starting: &BatesNumber, factory: &M) -> Result<(Endpoint, ChildProcess)> {
    let _guard = SPAWN_LOCK.lock();
    let channel = Channel::open()?;

    // SAFETY: after the fork the child only uses memory it inherited and
    // leaves through `_exit`, never returning into the caller's stack.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok((channel.into_parent(), ChildProcess::new(child))),
        Ok(ForkResult::Child) => child_main(channel.into_child(), starting, factory),
        Err(errno) => Err(Error::ProcessSpawn {
            context: format!("fork failed: {}", errno.desc()),
        }),
    }
}

/// Entry point of the forked child. No logging here: another thread of the
/// parent may have held the subscriber's locks at fork time.
fn child_main<M: MakeAnnotator>(endpoint: Endpoint, starting: &BatesNumber, factory: &M) -> ! {
    let code = match serve(&endpoint, starting, factory) {
        Ok(()) => 0,
        Err(_) => 1,
    };
    drop(endpoint);
    // SAFETY: `_exit` skips atexit handlers and stdio flushes that belong to
    // the parent's copy of the process.
    unsafe { nix::libc::_exit(code) }
}

fn serve<M: MakeAnnotator>(endpoint: &Endpoint, starting: &BatesNumber, factory: &M) -> Result<()> {
    let frame = endpoint.recv()?.ok_or_else(|| Error::ChannelTransport {
        context: "parent closed the channel before sending a request".to_string(),
    })?;
    let (source, destination) = codec::decode_request(&frame)?.into_paths();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        factory
            .make_annotator()
            .endorse(&source, &destination, starting)
    }));
    let response = match outcome {
        Ok(Ok(pages)) => Response::Pages(pages),
        Ok(Err(err)) => failure(err),
        Err(payload) => failure(AnnotationError::Other(panic_message(payload.as_ref()))),
    };

    endpoint.send(&codec::encode_response(&response)?)
}

fn failure(mut err: AnnotationError) -> Response {
    match &mut err {
        AnnotationError::Unreadable { path, reason }
        | AnnotationError::Unwritable { path, reason }
        | AnnotationError::Malformed { path, reason } => {
            clip(path, MAX_ERROR_LEN / 4);
            clip(reason, MAX_ERROR_LEN / 4);
        }
        AnnotationError::Other(reason) => clip(reason, MAX_ERROR_LEN),
    }
    Response::Failed(err)
}

fn clip(text: &mut String, max: usize) {
    if text.len() > max {
        let cut = (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
        text.truncate(cut);
    }
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string payload".to_string());
    format!("annotator panicked: {detail}")
}

/// A forked child that is killed and reaped if dropped unwaited.
struct ChildProcess {
    pid: Pid,
    reaped: bool,
}

impl ChildProcess {
    const fn new(pid: Pid) -> Self {
        Self { pid, reaped: false }
    }

    /// Waits for the child to exit. `None` if its status was unavailable.
    fn wait(mut self) -> Option<WaitStatus> {
        self.reaped = true;
        reap(self.pid)
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = kill(self.pid, Signal::SIGKILL);
            let _status = reap(self.pid);
            #[cfg(feature = "tracing")]
            tracing::debug!(pid = self.pid.as_raw(), status = ?_status, "Killed worker");
        }
    }
}

fn reap(pid: Pid) -> Option<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => return Some(status),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(_) => return None,
        }
    }
}

fn describe(status: Option<WaitStatus>) -> String {
    match status {
        Some(WaitStatus::Exited(pid, code)) => {
            format!("worker {pid} exited with status {code} before responding")
        }
        Some(WaitStatus::Signaled(pid, signal, _)) => {
            format!("worker {pid} was killed by {signal} before responding")
        }
        _ => "worker closed the channel before responding".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BatesNumber, ManifestAnnotator, blank_tiff,
        testing::{EchoStart, Exiting, Failing, Fixed, Panicking, Sleeping},
    };
    use std::{fs, path::Path, time::Instant};

    fn task(source: &str) -> TaskEnvelope {
        TaskEnvelope::new(source, "/nonexistent/out.tif", BatesNumber::with_prefix("T_"))
    }

    #[test]
    fn returns_page_count() {
        assert_eq!(run_isolated(&task("/in/a.tif"), &|| Fixed(4), None), Ok(4));
    }

    #[test]
    fn zero_pages_is_distinct_from_failure() {
        assert_eq!(run_isolated(&task("/in/a.tif"), &|| Fixed(0), None), Ok(0));
        let err = run_isolated(&task("/in/a.tif"), &|| Failing, None).unwrap_err();
        assert_eq!(
            err,
            Error::Annotation(AnnotationError::Unreadable {
                path: "/in/a.tif".to_string(),
                reason: "scripted failure".to_string(),
            })
        );
    }

    #[test]
    fn zero_timeout_waits_like_none() {
        assert_eq!(
            run_isolated(&task("/in/a.tif"), &|| Fixed(2), Some(Duration::ZERO)),
            Ok(2)
        );
    }

    #[test]
    fn long_failures_are_clipped_to_fit_a_frame() {
        let clipped = failure(AnnotationError::Unreadable {
            path: format!("/in/{}", "é".repeat(crate::MAX_FRAME_LEN)),
            reason: "gone".to_string(),
        });
        let Response::Failed(AnnotationError::Unreadable { path, reason }) = clipped else {
            panic!("kind was lost");
        };
        assert!(path.len() <= MAX_ERROR_LEN / 4);
        assert!(path.starts_with("/in/é"));
        assert_eq!(reason, "gone");

        let response = failure(AnnotationError::Unreadable {
            path: "x".repeat(crate::MAX_FRAME_LEN),
            reason: "y".repeat(crate::MAX_FRAME_LEN),
        });
        assert!(codec::encode_response(&response).is_ok());
    }

    #[test]
    fn child_sees_submitted_starting_number() {
        let mut envelope = task("/in/a.tif");
        envelope.starting_bates = BatesNumber::new("T_", 42, 8).unwrap();
        assert_eq!(run_isolated(&envelope, &|| EchoStart, None), Ok(42));
    }

    #[test]
    fn endorses_real_file_in_child() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.tif");
        fs::write(&source, blank_tiff(3)).unwrap();
        let destination = dir.path().join("doc_out.tif");
        let envelope = TaskEnvelope::new(&source, &destination, BatesNumber::with_prefix("T_"));

        let pages = run_isolated(&envelope, &ManifestAnnotator::default, None).unwrap();
        assert_eq!(pages, 3);
        assert!(crate::manifest_path(&destination).exists());
    }

    #[test]
    fn panic_becomes_annotation_failure() {
        let err = run_isolated(&task("/in/a.tif"), &|| Panicking, None).unwrap_err();
        assert!(
            matches!(&err, Error::Annotation(AnnotationError::Other(reason)) if reason.contains("boom")),
            "{err:?}"
        );
    }

    #[test]
    fn silent_exit_is_a_crash() {
        let err = run_isolated(&task("/in/a.tif"), &|| Exiting(3), None).unwrap_err();
        match err {
            Error::ChildCrashed { context } => assert!(context.contains("status 3"), "{context}"),
            other => panic!("expected crash, got {other:?}"),
        }
    }

    #[test]
    fn hung_child_times_out_and_is_killed() {
        let start = Instant::now();
        let err = run_isolated(
            &task("/in/hang.tif"),
            &|| Sleeping(Duration::ZERO),
            Some(Duration::from_millis(200)),
        )
        .unwrap_err();
        assert_eq!(err, Error::Timeout { millis: 200 });
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn oversized_request_never_forks() {
        let long = format!("/{}", "x".repeat(crate::MAX_FRAME_LEN));
        let err = run_isolated(&task(&long), &|| Exiting(9), None).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { .. }));
    }

    #[test]
    fn non_utf8_path_is_rejected() {
        use std::os::unix::ffi::OsStrExt;
        let source = Path::new(std::ffi::OsStr::from_bytes(b"/in/\xff.tif"));
        let envelope = TaskEnvelope::new(source, "/out/x.tif", BatesNumber::with_prefix("T"));
        let err = run_isolated(&envelope, &|| Fixed(1), None).unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
    }
}

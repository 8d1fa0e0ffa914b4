//! Console logging for the binary.
//!
//! Events from this crate and from `bates` go to stderr through
//! `tracing_subscriber::fmt`, leaving stdout for the timing report. The
//! filter comes from `RUST_LOG` and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=bates=debug bates-endorse ./in ./out
//! ```
//!
//! Forked workers never log, so every line comes from the parent process.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;

    Ok(())
}

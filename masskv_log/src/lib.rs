//! Logging setup for processes embedding MassKV.

use std::path::Path;

use anyhow::Result;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Installed logger. Keep it alive: dropping it flushes and stops the file
/// writer.
pub struct LogHandle {
    _guard: WorkerGuard,
    filter: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    /// Replace the active filter with `level`.
    pub fn set_level(&self, level: Level) -> Result<()> {
        self.filter.reload(EnvFilter::default().add_directive(level.into()))?;
        Ok(())
    }
}

/// Initialize structured JSON logging into hourly-rolling `masskv.log` files
/// under `dir`. `RUST_LOG` overrides `level` when set.
pub fn init(dir: impl AsRef<Path>, level: Level) -> Result<LogHandle> {
    let file_appender = RollingFileAppender::new(Rotation::HOURLY, dir.as_ref(), "masskv.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));
    let (filter, handle) = reload::Layer::new(filter);
    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .json()
        .with_current_span(false)
        .with_span_list(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(LogHandle { _guard: guard, filter: handle })
}

/// Compact stderr logging for tests. Safe to call more than once.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_test_is_idempotent() {
        init_test();
        init_test();
        tracing::info!("still fine");
    }
}

//! Console logging through `tracing-subscriber`.
//!
//! The level comes from `RUST_LOG` (default `info`). ANSI colors are used only
//! when stdout is a terminal. Initialization is idempotent.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing(format: LogFormat) {
    TRACING_INITIALIZED.get_or_init(|| {
        let use_ansi = std::io::stdout().is_terminal();
        let layer = match format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_ansi(use_ansi)
                .with_filter(env_filter())
                .boxed(),
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_filter(env_filter())
                .boxed(),
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("global tracing subscriber already installed");
        } else {
            tracing::debug!(?format, ansi_colors = use_ansi, "logging initialized");
        }
    });
}

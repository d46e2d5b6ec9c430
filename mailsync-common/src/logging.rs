//! Workspace logging.
//!
//! Every event goes through one of three spans: `outgoing` for calls to the
//! provider, `incoming` for provider traffic we receive and `internal` for
//! everything else.

use std::str::FromStr;

use tracing::{Subscriber, metadata::LevelFilter};
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan, util::SubscriberInitExt,
};

/// Environment variable holding the maximum level, e.g. `debug`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Traffic towards the provider (sends, MIME fetches, event queries)
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Traffic from the provider (webhooks, polled events)
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

/// `TRACE` in debug builds, `INFO` otherwise.
pub fn default_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    }
}

/// Parse a configured level, case-insensitively.
///
/// Unset or unrecognised values yield `default`.
pub fn parse_level(configured: Option<&str>, default: LevelFilter) -> LevelFilter {
    let Some(configured) = configured.map(str::trim).filter(|level| !level.is_empty()) else {
        return default;
    };

    LevelFilter::from_str(configured).unwrap_or_else(|_| {
        eprintln!("Invalid log level specified {configured}, defaulting to {default}");
        default
    })
}

/// Whether `target` belongs to one of the workspace crates.
///
/// Dependencies (the HTTP client, the runtime) log under their own crate
/// names and are dropped.
pub fn is_mailsync_target(target: &str) -> bool {
    let krate = target.split("::").next().unwrap_or_default();
    krate == "mailsync" || krate.starts_with("mailsync_")
}

/// The formatting layer installed by [`init`].
pub fn layer<S>(level: LevelFilter) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
        .with_filter(level)
        .with_filter(FilterFn::new(|metadata| {
            is_mailsync_target(metadata.target())
        }))
}

/// Install the global subscriber.
///
/// The level comes from [`LOG_LEVEL_ENV`], see [`parse_level`]. Calling this
/// more than once is harmless; later calls are ignored.
pub fn init() {
    let configured = std::env::var(LOG_LEVEL_ENV).ok();
    let level = parse_level(configured.as_deref(), default_level());

    let _ = tracing_subscriber::Registry::default()
        .with(layer(level))
        .try_init();
}

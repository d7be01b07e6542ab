use std::borrow::Cow;

use sentry::integrations::tracing::EventFilter;
use sentry::{ClientInitGuard, ClientOptions};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::opts::Opts;
use crate::prelude::*;

/// Initialises tracing: the status lines go to stderr, warnings and errors to Sentry.
///
/// Stdout is left to the subcommand output.
pub fn init(opts: &Opts) -> Result<ClientInitGuard> {
    let guard = sentry::init((
        opts.sentry_dsn.clone(),
        ClientOptions {
            release: Some(Cow::Borrowed(env!("CARGO_PKG_VERSION"))),
            environment: opts.sentry_environment.clone().map(Cow::Owned),
            traces_sample_rate: opts.traces_sample_rate,
            ..Default::default()
        },
    ));

    let sentry_layer = sentry::integrations::tracing::layer()
        .event_filter(|metadata| match metadata.level() {
            &Level::ERROR | &Level::WARN => EventFilter::Event,
            &Level::INFO | &Level::DEBUG | &Level::TRACE => EventFilter::Breadcrumb,
        })
        // Per-iteration debug spans would flood the transaction.
        .span_filter(|metadata| matches!(metadata.level(), &Level::ERROR | &Level::WARN | &Level::INFO))
        .with_filter(env_filter("CHECKIN_MODEL_SENTRY_LOG", Level::DEBUG)?);

    let format_layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(env_filter("CHECKIN_MODEL_LOG", Level::INFO)?);

    tracing_subscriber::Registry::default()
        .with(sentry_layer)
        .with(format_layer)
        .init();

    Ok(guard)
}

/// Tags the Sentry scope with the running subcommand.
pub fn set_app(app: &'static str) {
    sentry::configure_scope(|scope| scope.set_tag("app", app));
}

/// Logs the failed run and sends it to Sentry with the whole error chain.
pub fn report_error(error: &anyhow::Error) {
    tracing::error!("{:#}", error);
    sentry::integrations::anyhow::capture_anyhow(error);
}

/// Filter from the environment variable, or this crate's events at `default_level`.
fn env_filter(variable: &str, default_level: Level) -> Result<EnvFilter> {
    EnvFilter::try_from_env(variable)
        .or_else(|_| EnvFilter::try_new(default_directive(default_level)))
        .with_context(|| format!("invalid `{}`", variable))
}

fn default_directive(level: Level) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.to_string().to_lowercase())
}

pub fn format_duration(duration: StdDuration) -> String {
    humantime::format_duration(duration).to_string()
}

pub fn format_elapsed(instant: Instant) -> String {
    format_duration(instant.elapsed())
}

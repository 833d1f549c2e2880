//! Structured logging setup and latency helpers.

use std::fmt::Display;
use std::future::Future;
use std::str::FromStr;
use std::time::Instant;

use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line on stdout.
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let json = format == LogFormat::Json;
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

/// Maps a `LOG_LEVEL` value onto a tracing level. Accepts the Python-style
/// names `warning` and `critical`; anything unrecognised means `info`.
pub fn parse_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => Level::WARN,
        "critical" | "fatal" => Level::ERROR,
        other => Level::from_str(other).unwrap_or(Level::INFO),
    }
}

fn default_directive(level: &str) -> String {
    format!(
        "{}={}",
        env!("CARGO_PKG_NAME"),
        parse_level(level).as_str().to_ascii_lowercase()
    )
}

/// Awaits `fut` and logs one event named `event` with its status and duration.
/// Context (provider, role, ...) is expected to come from the enclosing span.
pub async fn log_latency<F, T, E>(event: &'static str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let result = fut.await;
    let duration_ms = (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;

    match &result {
        Ok(_) => info!(event, status = "ok", duration_ms, "{event}"),
        Err(e) => error!(event, status = "error", duration_ms, error = %e, "{event}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" TEXT "), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[tokio::test]
    async fn test_log_latency_passes_result_through() {
        let ok: Result<u32, String> = log_latency("test.ok", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> =
            log_latency("test.err", async { Err("boom".to_string()) }).await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[test]
    fn test_parse_level_accepts_python_names() {
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level("critical"), Level::ERROR);
        assert_eq!(parse_level(" Debug "), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_directive_is_valid_filter() {
        assert_eq!(default_directive("WARNING"), "jobfinder=warn");
        assert_eq!(default_directive("nonsense"), "jobfinder=info");
        let filter = EnvFilter::try_new(default_directive("CRITICAL")).unwrap();
        assert_eq!(filter.max_level_hint(), Some(tracing::level_filters::LevelFilter::ERROR));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging("debug", LogFormat::Pretty);
        init_logging("info", LogFormat::Json);
    }
}
